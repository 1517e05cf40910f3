//! LPS ↔ RAS conversion.
//!
//! DICOM stores patient coordinates as Left-Posterior-Superior while the
//! display side expects Right-Anterior-Superior. Both directions use the same
//! reflection `F = diag(-1, -1, 1, 1)`, which is its own inverse.

use nalgebra::{DMatrix, Matrix3, Matrix4, Point3};

use crate::error::{FusionError, Result};

pub struct CoordinateConverter;

impl CoordinateConverter {
    pub fn flip() -> Matrix4<f64> {
        Matrix4::from_diagonal(&nalgebra::Vector4::new(-1.0, -1.0, 1.0, 1.0))
    }

    pub fn flip3() -> Matrix3<f64> {
        Matrix3::from_diagonal(&nalgebra::Vector3::new(-1.0, -1.0, 1.0))
    }

    /// `F · M`
    pub fn convert_matrix(matrix: &Matrix4<f64>) -> Matrix4<f64> {
        Self::flip() * matrix
    }

    /// `F · p`
    pub fn convert_point(point: &Point3<f64>) -> Point3<f64> {
        Point3::new(-point.x, -point.y, point.z)
    }

    /// Untyped variant for values coming from outside the crate. Accepts a
    /// 3-vector (either orientation) or a 4×4 matrix.
    ///
    /// # Errors
    ///
    /// [`FusionError::InvalidDimension`] for any other shape.
    pub fn convert_dynamic(input: &DMatrix<f64>) -> Result<DMatrix<f64>> {
        match input.shape() {
            (4, 4) => {
                let fixed = Matrix4::from_iterator(input.iter().copied());
                let converted = Self::convert_matrix(&fixed);
                Ok(DMatrix::from_iterator(4, 4, converted.iter().copied()))
            }
            (3, 1) | (1, 3) => {
                let mut out = input.clone();
                out[0] = -out[0];
                out[1] = -out[1];
                Ok(out)
            }
            (rows, cols) => Err(FusionError::InvalidDimension {
                expected: "3-vector or 4x4 matrix",
                got: format!("{rows}x{cols}"),
            }),
        }
    }
}
