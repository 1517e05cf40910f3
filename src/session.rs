//! One open fusion view.
//!
//! A [`FusionSession`] owns both volumes, the interactive parameters and the
//! derived state. Setters only mark the derived state stale; the transforms
//! and the resliced moving volume are rebuilt on the next read.

use dicom::object::InMemDicomObject;
use image::DynamicImage;
use nalgebra::Matrix4;
use tracing::{debug, info};

use crate::composer::{ManualParameters, ManualTransformComposer};
use crate::compositor::SliceCompositor;
use crate::config::{DisplaySettings, LayerStyle};
use crate::enums::{Interpolation, Orientation};
use crate::error::Result;
use crate::persistence::{RestoredTransform, TransformPersistence};
use crate::preregistration::PreRegistrationCalculator;
use crate::reslice::ReslicePipeline;
use crate::staging::StagedSeries;
use crate::volume::Volume;

#[derive(Debug)]
pub struct FusionSession {
    fixed: Volume,
    moving: Option<Volume>,
    composer: Option<ManualTransformComposer>,
    parameters: ManualParameters,
    settings: DisplaySettings,
    cache: Option<FusedState>,
    staged: Vec<StagedSeries>,
}

#[derive(Debug)]
struct FusedState {
    resample: Matrix4<f64>,
    display: Matrix4<f64>,
    resliced: Volume,
}

impl FusionSession {
    pub fn new(fixed: Volume) -> Self {
        Self {
            fixed,
            moving: None,
            composer: None,
            parameters: ManualParameters::default(),
            settings: DisplaySettings::default(),
            cache: None,
            staged: Vec::new(),
        }
    }

    pub fn with_moving(mut self, moving: Volume) -> Self {
        self.set_moving(moving);
        self
    }

    pub fn with_settings(mut self, settings: DisplaySettings) -> Self {
        self.set_display_settings(settings);
        self
    }

    /// Keep a staging directory alive for as long as the session.
    pub(crate) fn attach_staging(&mut self, staged: StagedSeries) {
        self.staged.push(staged);
    }

    pub fn fixed(&self) -> &Volume {
        &self.fixed
    }

    pub fn moving(&self) -> Option<&Volume> {
        self.moving.as_ref()
    }

    pub fn parameters(&self) -> &ManualParameters {
        &self.parameters
    }

    pub fn settings(&self) -> &DisplaySettings {
        &self.settings
    }

    /// Voxel counts of the fixed volume along (x, y, z).
    pub fn fixed_extent(&self) -> [usize; 3] {
        self.fixed.frame().extent()
    }

    pub fn pre_registration(&self) -> Option<&Matrix4<f64>> {
        self.composer.as_ref().map(|c| c.pre_registration())
    }

    pub fn is_stale(&self) -> bool {
        self.moving.is_some() && self.cache.is_none()
    }

    pub fn set_fixed(&mut self, fixed: Volume) {
        self.fixed = fixed;
        self.rebuild_composer();
    }

    pub fn set_moving(&mut self, moving: Volume) {
        self.moving = Some(moving);
        self.rebuild_composer();
    }

    pub fn clear_moving(&mut self) {
        self.moving = None;
        self.rebuild_composer();
    }

    pub fn set_translation(&mut self, translation: [f64; 3]) {
        self.parameters.translation = translation;
        self.invalidate();
    }

    pub fn set_rotation(&mut self, rotation: [f64; 3]) {
        self.parameters.rotation = rotation;
        self.invalidate();
    }

    pub fn set_parameters(&mut self, parameters: ManualParameters) {
        self.parameters = parameters;
        self.invalidate();
    }

    pub fn set_opacity(&mut self, opacity: f64) {
        self.settings.opacity = opacity.clamp(0.0, 1.0);
        self.invalidate();
    }

    pub fn set_interpolation(&mut self, interpolation: Interpolation) {
        if self.settings.interpolation != interpolation {
            self.settings.interpolation = interpolation;
            self.invalidate();
        }
    }

    pub fn set_fixed_style(&mut self, style: LayerStyle) {
        self.settings.fixed = style;
    }

    pub fn set_moving_style(&mut self, style: LayerStyle) {
        self.settings.moving = style;
    }

    pub fn set_display_settings(&mut self, settings: DisplaySettings) {
        self.settings = DisplaySettings {
            opacity: settings.opacity.clamp(0.0, 1.0),
            ..settings
        };
        self.invalidate();
    }

    /// Current resample transform, or `None` without a moving volume.
    pub fn resample_matrix(&mut self) -> Result<Option<Matrix4<f64>>> {
        Ok(self.refresh()?.map(|state| state.resample))
    }

    /// Current display transform, or `None` without a moving volume.
    pub fn display_matrix(&mut self) -> Result<Option<Matrix4<f64>>> {
        Ok(self.refresh()?.map(|state| state.display))
    }

    /// Fused slice for a view. Out-of-range indices are clamped to the last
    /// slice.
    pub fn render_slice(&mut self, orientation: Orientation, index: usize) -> Result<DynamicImage> {
        let index = self.fixed.clamp_index(index, orientation);
        let spacing = self.fixed.slice_spacing(orientation);
        let settings = self.settings;

        self.refresh()?;
        let fixed_slice = self.fixed.get_slice_from_axis(index, orientation);
        let moving_slice = self
            .cache
            .as_ref()
            .map(|state| state.resliced.get_slice_from_axis(index, orientation));

        Ok(SliceCompositor::compose(
            &fixed_slice,
            moving_slice.as_ref(),
            spacing,
            &settings,
        ))
    }

    /// SRO payload for the current alignment, or `None` without a moving
    /// volume.
    pub fn to_sro(&mut self) -> Result<Option<InMemDicomObject>> {
        let parameters = self.parameters;
        Ok(self
            .display_matrix()?
            .map(|display| TransformPersistence::build_sro(&display, &parameters)))
    }

    /// Take over the slider values stored in an SRO.
    pub fn restore_from_sro(&mut self, sro: &InMemDicomObject) -> Result<RestoredTransform> {
        let restored = TransformPersistence::parse_sro(sro)?;
        self.set_parameters(restored.parameters);
        info!(exact = restored.exact, "restored alignment");
        Ok(restored)
    }

    /// Close the view and remove its staging directories.
    pub fn close(mut self) {
        for staged in self.staged.drain(..) {
            staged.release();
        }
    }

    fn rebuild_composer(&mut self) {
        self.composer = self.moving.as_ref().map(|moving| {
            let pre_registration = PreRegistrationCalculator::compute(self.fixed.frame(), moving.frame());
            ManualTransformComposer::new(pre_registration, moving.frame())
        });
        self.invalidate();
    }

    fn invalidate(&mut self) {
        if self.cache.take().is_some() {
            debug!("fusion state marked stale");
        }
    }

    fn refresh(&mut self) -> Result<Option<&FusedState>> {
        let (Some(moving), Some(composer)) = (self.moving.as_ref(), self.composer.as_ref()) else {
            return Ok(None);
        };

        if self.cache.is_none() {
            let resample = composer.resample_transform(&self.parameters);
            let display = composer.display_transform(&self.parameters);
            let resliced = ReslicePipeline::resample(&self.fixed, moving, &resample, self.settings.interpolation)?;
            debug!(parameters = ?self.parameters, "recomputed fusion state");
            self.cache = Some(FusedState {
                resample,
                display,
                resliced,
            });
        }

        Ok(self.cache.as_ref())
    }
}
