//! Composition of the pre-registration with the interactive adjustment.
//!
//! Two matrices are derived from the same [`ManualParameters`]:
//!
//! - the *resample transform* drives the reslicer. It maps moving-volume
//!   local space into fixed-volume local space (see [`crate::reslice`]) and
//!   rotates about the center of the moving volume.
//! - the *display transform* is what gets persisted. It carries the user
//!   rotation in the RAS basis and the raw user translation, without the
//!   pivot shifts, which only make sense inside the reslicer.

use nalgebra::{Matrix3, Matrix4, Point3, Translation3, Vector3};
use serde::{Deserialize, Serialize};

use crate::coordinates::CoordinateConverter;
use crate::frame::VolumeFrame;

/// Interactive translation (mm) and rotation (degrees about X, then Y, then Z).
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct ManualParameters {
    pub translation: [f64; 3],
    pub rotation: [f64; 3],
}

impl ManualParameters {
    pub fn new(translation: [f64; 3], rotation: [f64; 3]) -> Self {
        Self {
            translation,
            rotation,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ManualTransformComposer {
    pre_registration: Matrix4<f64>,
    pivot: Point3<f64>,
}

impl ManualTransformComposer {
    /// The pivot is the center of the moving volume as placed by the
    /// pre-registration.
    pub fn new(pre_registration: Matrix4<f64>, moving: &VolumeFrame) -> Self {
        let pivot = pre_registration.transform_point(&moving.local_center());
        Self {
            pre_registration,
            pivot,
        }
    }

    pub fn pre_registration(&self) -> &Matrix4<f64> {
        &self.pre_registration
    }

    pub fn pivot(&self) -> &Point3<f64> {
        &self.pivot
    }

    /// `T(c) · Rz · Ry · Rx · T(t) · T(−c)`, with every angle negated.
    pub fn user_transform(&self, params: &ManualParameters) -> Matrix4<f64> {
        let [tx, ty, tz] = params.translation;
        let to_origin = Translation3::from(-self.pivot.coords).to_homogeneous();
        let translate = Translation3::new(tx, ty, tz).to_homogeneous();
        let rotate = user_rotation(params.rotation).to_homogeneous();
        let back = Translation3::from(self.pivot.coords).to_homogeneous();

        back * rotate * translate * to_origin
    }

    /// Pre-registration applied first, user adjustment second.
    pub fn resample_transform(&self, params: &ManualParameters) -> Matrix4<f64> {
        self.user_transform(params) * self.pre_registration
    }

    pub fn display_transform(&self, params: &ManualParameters) -> Matrix4<f64> {
        let user = self.user_transform(params);
        let r_lps = user.fixed_view::<3, 3>(0, 0).into_owned();
        let flip = CoordinateConverter::flip3();
        let r_ras = correct_display_yaw_sign(&(flip * r_lps * flip.transpose()));

        let mut m = Matrix4::identity();
        m.fixed_view_mut::<3, 3>(0, 0).copy_from(&r_ras);
        m.fixed_view_mut::<3, 1>(0, 3)
            .copy_from(&Vector3::from(params.translation));
        m
    }
}

/// `Rz(−rz) · Ry(−ry) · Rx(−rx)`; the reslicer's screen mapping needs the
/// negated angles.
pub fn user_rotation(rotation_deg: [f64; 3]) -> Matrix3<f64> {
    let [rx, ry, rz] = rotation_deg.map(|deg| -deg.to_radians());
    rot_z(rz) * rot_y(ry) * rot_x(rx)
}

/// Flip the sign of the Z (yaw) component of a display rotation.
///
/// Downstream consumers of the RAS display matrix expect the Z rotation with
/// the opposite sign. For a pure Z rotation this is the same as negating
/// entries `[0,1]` and `[1,0]`. For compound rotations the yaw is extracted
/// (Z·Y·X order) and negated so the result stays a proper rotation. With the
/// Y angle at exactly ±90° the yaw is undefined and the matrix is returned
/// unchanged.
pub fn correct_display_yaw_sign(rotation: &Matrix3<f64>) -> Matrix3<f64> {
    let yaw = rotation[(1, 0)].atan2(rotation[(0, 0)]);
    rot_z(-2.0 * yaw) * rotation
}

fn rot_x(angle: f64) -> Matrix3<f64> {
    let (s, c) = angle.sin_cos();
    Matrix3::new(1.0, 0.0, 0.0, 0.0, c, -s, 0.0, s, c)
}

fn rot_y(angle: f64) -> Matrix3<f64> {
    let (s, c) = angle.sin_cos();
    Matrix3::new(c, 0.0, s, 0.0, 1.0, 0.0, -s, 0.0, c)
}

fn rot_z(angle: f64) -> Matrix3<f64> {
    let (s, c) = angle.sin_cos();
    Matrix3::new(c, -s, 0.0, s, c, 0.0, 0.0, 0.0, 1.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::preregistration::PreRegistrationCalculator;

    fn frames() -> (VolumeFrame, VolumeFrame) {
        let fixed = VolumeFrame::axis_aligned(Point3::origin(), Vector3::repeat(1.0), [10, 10, 10]).unwrap();
        let moving =
            VolumeFrame::axis_aligned(Point3::new(5.0, 0.0, 0.0), Vector3::new(1.0, 1.0, 2.0), [8, 6, 5]).unwrap();
        (fixed, moving)
    }

    fn composer() -> ManualTransformComposer {
        let (fixed, moving) = frames();
        ManualTransformComposer::new(PreRegistrationCalculator::compute(&fixed, &moving), &moving)
    }

    #[test]
    fn zero_parameters_reproduce_pre_registration() {
        let composer = composer();
        let m = composer.resample_transform(&ManualParameters::default());
        assert_eq!(m, *composer.pre_registration());
    }

    #[test]
    fn user_translation_cancels_pre_registration_offset() {
        let composer = composer();
        let params = ManualParameters::new([-5.0, 0.0, 0.0], [0.0; 3]);
        let m = composer.resample_transform(&params);
        let translation = m.fixed_view::<3, 1>(0, 3).into_owned();
        assert!(translation.norm() < 1e-12);
    }

    #[test]
    fn rotation_keeps_pivot_fixed() {
        let composer = composer();
        let params = ManualParameters::new([0.0; 3], [10.0, -25.0, 40.0]);
        let user = composer.user_transform(&params);
        let moved = user.transform_point(composer.pivot());
        assert!((moved - composer.pivot()).norm() < 1e-9);
    }

    #[test]
    fn rotation_angles_are_negated() {
        // +90° about Z maps +x onto −y under the negated convention
        let r = user_rotation([0.0, 0.0, 90.0]);
        let v = r * Vector3::x();
        assert!((v - Vector3::new(0.0, -1.0, 0.0)).norm() < 1e-12);
    }

    #[test]
    fn display_rotation_is_orthonormal() {
        let composer = composer();
        for rotation in [[0.0, 0.0, 30.0], [12.0, -48.0, 73.0], [170.0, 95.0, -130.0], [0.0, 90.0, 45.0]] {
            let params = ManualParameters::new([1.0, 2.0, 3.0], rotation);
            let m = composer.display_transform(&params);
            let r = m.fixed_view::<3, 3>(0, 0).into_owned();
            assert!((r.transpose() * r - Matrix3::identity()).norm() < 1e-9, "{rotation:?}");
            assert!((r.determinant() - 1.0).abs() < 1e-9);
            assert_eq!(m.fixed_view::<3, 1>(0, 3).into_owned(), Vector3::new(1.0, 2.0, 3.0));
        }
    }

    #[test]
    fn yaw_correction_matches_entry_negation_for_z_rotation() {
        let composer = composer();
        let params = ManualParameters::new([0.0; 3], [0.0, 0.0, 33.0]);
        let flip = CoordinateConverter::flip3();
        let r_lps = composer.user_transform(&params).fixed_view::<3, 3>(0, 0).into_owned();
        let mut expected = flip * r_lps * flip.transpose();
        expected[(0, 1)] = -expected[(0, 1)];
        expected[(1, 0)] = -expected[(1, 0)];

        let display = composer.display_transform(&params);
        let r = display.fixed_view::<3, 3>(0, 0).into_owned();
        assert!((r - expected).norm() < 1e-12);
    }
}
