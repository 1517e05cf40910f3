use nalgebra::{Matrix3, Matrix4};

use crate::frame::VolumeFrame;

/// Static alignment derived from the stored acquisition geometry of both
/// series.
pub struct PreRegistrationCalculator;

impl PreRegistrationCalculator {
    /// `[R_fixedᵀ · R_moving | origin_moving − origin_fixed]`
    ///
    /// The translation is not rotated; both origins are already in the same
    /// patient coordinate system.
    pub fn compute(fixed: &VolumeFrame, moving: &VolumeFrame) -> Matrix4<f64> {
        let r_fixed = normalize_columns(fixed.direction());
        let r_moving = normalize_columns(moving.direction());
        let rotation = r_fixed.transpose() * r_moving;
        let translation = moving.origin() - fixed.origin();

        let mut m = Matrix4::identity();
        m.fixed_view_mut::<3, 3>(0, 0).copy_from(&rotation);
        m.fixed_view_mut::<3, 1>(0, 3).copy_from(&translation);
        m
    }
}

fn normalize_columns(direction: &Matrix3<f64>) -> Matrix3<f64> {
    let mut out = *direction;
    for mut column in out.column_iter_mut() {
        let norm = column.norm();
        if norm > 0.0 {
            column /= norm;
        }
    }
    out
}
