//! Resampling of the moving raster onto the fixed grid.
//!
//! Both volumes are addressed in their *local* physical space: voxel index
//! times spacing, with the first voxel at the origin. The resample transform
//! maps moving-local points into fixed-local points; for every fixed voxel
//! the inverse is used to pull a value out of the moving raster.

use nalgebra::{Matrix4, Point3, Vector3, Vector4};
use ndarray::Array3;
use tracing::{debug, warn};

use crate::enums::Interpolation;
use crate::error::Result;
use crate::interpolator::Interpolator;
use crate::volume::Volume;

pub struct ReslicePipeline;

impl ReslicePipeline {
    /// Resample `moving` into the grid of `fixed`.
    ///
    /// The result shares the fixed frame. Voxels that fall outside the moving
    /// volume take the moving raster's minimum value.
    pub fn resample(
        fixed: &Volume,
        moving: &Volume,
        transform: &Matrix4<f64>,
        interpolation: Interpolation,
    ) -> Result<Volume> {
        let index_map = Self::fixed_index_to_moving_index(fixed, moving, transform);
        let background = moving.min_value();
        let source = moving.data().view();

        let data = Array3::from_shape_fn(fixed.dim(), |(z, y, x)| {
            let p = index_map.transform_point(&Point3::new(x as f64, y as f64, z as f64));
            Interpolator::sample(&source, [p.x, p.y, p.z], interpolation).unwrap_or(background)
        });

        debug!(dim = ?fixed.dim(), ?interpolation, "resampled moving volume");
        Volume::new(data, fixed.frame().clone())
    }

    /// Fixed voxel index → moving continuous voxel index.
    fn fixed_index_to_moving_index(fixed: &Volume, moving: &Volume, transform: &Matrix4<f64>) -> Matrix4<f64> {
        let fixed_scale = Matrix4::from_diagonal(&scale(fixed.frame().spacing()));
        let moving_inv_scale = Matrix4::from_diagonal(&scale(&moving.frame().spacing().map(|s| 1.0 / s)));
        moving_inv_scale * invert(transform) * fixed_scale
    }
}

fn scale(v: &Vector3<f64>) -> Vector4<f64> {
    Vector4::new(v.x, v.y, v.z, 1.0)
}

/// General inverse, falling back to the rigid-body inverse `[Rᵀ | −Rᵀt]` for
/// a singular matrix.
pub(crate) fn invert(transform: &Matrix4<f64>) -> Matrix4<f64> {
    transform.try_inverse().unwrap_or_else(|| {
        warn!("singular resample transform, using rigid inverse");
        let rotation_t = transform.fixed_view::<3, 3>(0, 0).transpose();
        let translation = transform.fixed_view::<3, 1>(0, 3).into_owned();
        let mut inv = Matrix4::identity();
        inv.fixed_view_mut::<3, 3>(0, 0).copy_from(&rotation_t);
        inv.fixed_view_mut::<3, 1>(0, 3).copy_from(&(-(rotation_t * translation)));
        inv
    })
}
