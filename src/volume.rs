use crate::enums::Orientation;
use crate::error::{FusionError, Result};
use crate::frame::VolumeFrame;

use ndarray::Array3;
use ndarray::ArrayView2;
use ndarray::s;

/// A raster in (depth, height, width) order together with its frame.
#[derive(Debug, Clone)]
pub struct Volume {
    data: Array3<f32>,
    frame: VolumeFrame,
}

impl Volume {
    /// # Errors
    ///
    /// [`FusionError::VolumeConstruction`] if the raster shape disagrees with
    /// the frame extent.
    pub fn new(data: Array3<f32>, frame: VolumeFrame) -> Result<Self> {
        if data.dim() != frame.dim() {
            return Err(FusionError::VolumeConstruction(format!(
                "raster shape {:?} does not match frame extent {:?}",
                data.dim(),
                frame.dim()
            )));
        }
        Ok(Self { data, frame })
    }

    /// Get the dimensions of the volume (depth, height, width)
    pub fn dim(&self) -> (usize, usize, usize) {
        self.data.dim()
    }

    pub fn data(&self) -> &Array3<f32> {
        &self.data
    }

    pub fn frame(&self) -> &VolumeFrame {
        &self.frame
    }

    pub fn min_value(&self) -> f32 {
        self.data.iter().copied().fold(f32::INFINITY, f32::min)
    }

    /// Number of slices available along an orientation.
    pub fn slice_count(&self, orientation: Orientation) -> usize {
        let (depth, height, width) = self.dim();
        match orientation {
            Orientation::Axial => depth,
            Orientation::Coronal => height,
            Orientation::Sagittal => width,
        }
    }

    pub fn clamp_index(&self, index: usize, orientation: Orientation) -> usize {
        index.min(self.slice_count(orientation) - 1)
    }

    /// Slice at `index` (clamped to the last valid slice).
    ///
    /// Coronal and sagittal slices are flipped vertically so that the last
    /// acquired slice is on top.
    pub fn get_slice_from_axis(&self, index: usize, orientation: Orientation) -> ArrayView2<'_, f32> {
        let index = self.clamp_index(index, orientation);
        match orientation {
            Orientation::Axial => self.data.slice(s![index, .., ..]),
            Orientation::Coronal => self.data.slice(s![..;-1, index, ..]),
            Orientation::Sagittal => self.data.slice(s![..;-1, .., index]),
        }
    }

    /// Physical (column, row) pixel spacing of a slice.
    pub fn slice_spacing(&self, orientation: Orientation) -> (f64, f64) {
        let spacing = self.frame.spacing();
        match orientation {
            Orientation::Axial => (spacing.x, spacing.y),
            Orientation::Coronal => (spacing.x, spacing.z),
            Orientation::Sagittal => (spacing.y, spacing.z),
        }
    }
}
