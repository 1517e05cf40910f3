//! # DICOM-fusion library
//!
//! This crate aligns a second ("moving") DICOM volume against a reference
//! ("fixed") volume with a rigid transform that a user adjusts interactively,
//! renders blended slices of both, and stores the alignment in a DICOM
//! Spatial Registration Object.
//!
//! It builds on the dicom-rs ecosystem for reading and writing DICOM and on
//! nalgebra for the geometry. The moving volume is resampled onto the grid of
//! the fixed volume, so every slice request reads both layers voxel by voxel.
//! Fused slices can be taken along the three medical axes:
//!  - Axial
//!  - Coronal
//!  - Sagittal
//!
//! ## Coordinates
//!
//! Volume geometry is kept in DICOM's patient coordinate system
//! (Left-Posterior-Superior). The persisted display matrix uses the
//! Right-Anterior-Superior basis; [`CoordinateConverter`] converts between the
//! two.
//!
//! ## Lifecycle
//!
//! A [`FusionEngine`] stages each series into a temporary directory, loads it
//! and hands out a [`FusionSession`]. The session owns both volumes and the
//! slider values. Setters only mark derived state stale; the next slice
//! request recomputes the transforms and the resliced moving volume. All work
//! happens on the calling thread.
//!
//! # Examples
//!
//! ```no_run
//! # use dicom_fusion::{EngineConfig, FusionEngine, Orientation};
//! # use std::path::PathBuf;
//! let engine = FusionEngine::new(EngineConfig::default());
//! let fixed: Vec<PathBuf> = vec!["ct/1.dcm".into(), "ct/2.dcm".into()];
//! let moving: Vec<PathBuf> = vec!["mr/1.dcm".into(), "mr/2.dcm".into()];
//! let mut session = engine
//!     .open_session(fixed.as_slice(), Some(moving.as_slice()))
//!     .expect("should have loaded both series");
//! session.set_translation([-5.0, 0.0, 0.0]);
//! session.set_rotation([0.0, 0.0, 12.5]);
//! session.set_opacity(0.5);
//! let image = session
//!     .render_slice(Orientation::Axial, 0)
//!     .expect("should have rendered a fused slice");
//! image.save("fused.png").expect("should have written png");
//! ```

pub mod composer;
pub mod compositor;
pub mod config;
pub mod coordinates;
pub mod engine;
pub mod enums;
pub mod error;
pub mod frame;
mod interpolator;
pub mod persistence;
pub mod preregistration;
pub mod reslice;
pub mod session;
pub mod staging;
pub mod volume;
pub mod volume_loader;

pub use composer::{ManualParameters, ManualTransformComposer};
pub use compositor::SliceCompositor;
pub use config::{DisplaySettings, EngineConfig, LayerStyle, WindowLevel};
pub use coordinates::CoordinateConverter;
pub use engine::FusionEngine;
pub use enums::{Interpolation, LayerColor, Orientation, SortBy};
pub use error::{FusionError, Result};
pub use frame::VolumeFrame;
pub use persistence::{RestoredTransform, TransformPersistence};
pub use preregistration::PreRegistrationCalculator;
pub use reslice::ReslicePipeline;
pub use session::FusionSession;
pub use staging::{StagedSeries, TempVolumeStaging};
pub use volume::Volume;
pub use volume_loader::VolumeLoader;
