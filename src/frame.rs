use nalgebra::{Matrix3, Matrix4, Point3, Vector3};

use crate::error::{FusionError, Result};

/// Sampling grid and world placement of one volume.
///
/// Axis order is (x, y, z) = (column, row, slice). The direction columns are
/// unit length and mutually orthogonal once constructed.
#[derive(Debug, Clone, PartialEq)]
pub struct VolumeFrame {
    origin: Point3<f64>,
    spacing: Vector3<f64>,
    direction: Matrix3<f64>,
    extent: [usize; 3],
}

impl VolumeFrame {
    /// Build a frame, re-orthonormalizing the direction cosines.
    ///
    /// # Errors
    ///
    /// Returns [`FusionError::VolumeConstruction`] if a spacing is not a
    /// positive finite number, an extent is zero or the direction columns are
    /// degenerate.
    pub fn new(
        origin: Point3<f64>,
        spacing: Vector3<f64>,
        direction: Matrix3<f64>,
        extent: [usize; 3],
    ) -> Result<Self> {
        if spacing.iter().any(|s| !s.is_finite() || *s <= 0.0) {
            return Err(FusionError::VolumeConstruction(format!(
                "spacing must be positive, got {:?}",
                spacing.as_slice()
            )));
        }
        if extent.contains(&0) {
            return Err(FusionError::VolumeConstruction(format!(
                "empty extent {extent:?}"
            )));
        }
        if origin.iter().any(|v| !v.is_finite()) {
            return Err(FusionError::VolumeConstruction(
                "origin is not finite".to_string(),
            ));
        }
        let direction = orthonormalize(&direction).ok_or_else(|| {
            FusionError::VolumeConstruction("degenerate direction cosines".to_string())
        })?;

        Ok(Self {
            origin,
            spacing,
            direction,
            extent,
        })
    }

    /// Axis-aligned frame with identity direction.
    pub fn axis_aligned(origin: Point3<f64>, spacing: Vector3<f64>, extent: [usize; 3]) -> Result<Self> {
        Self::new(origin, spacing, Matrix3::identity(), extent)
    }

    pub fn origin(&self) -> &Point3<f64> {
        &self.origin
    }

    pub fn spacing(&self) -> &Vector3<f64> {
        &self.spacing
    }

    pub fn direction(&self) -> &Matrix3<f64> {
        &self.direction
    }

    /// Voxel counts along (x, y, z).
    pub fn extent(&self) -> [usize; 3] {
        self.extent
    }

    /// Raster dimensions in array order (depth, height, width).
    pub fn dim(&self) -> (usize, usize, usize) {
        (self.extent[2], self.extent[1], self.extent[0])
    }

    /// `[direction · diag(spacing) | origin]`
    pub fn voxel_to_world(&self) -> Matrix4<f64> {
        let mut m = Matrix4::identity();
        let linear = self.direction * Matrix3::from_diagonal(&self.spacing);
        m.fixed_view_mut::<3, 3>(0, 0).copy_from(&linear);
        m.fixed_view_mut::<3, 1>(0, 3).copy_from(&self.origin.coords);
        m
    }

    pub fn index_to_world(&self, index: &Vector3<f64>) -> Point3<f64> {
        self.origin + self.direction * index.component_mul(&self.spacing)
    }

    /// Continuous voxel index of the center of the grid.
    pub fn center_index(&self) -> Vector3<f64> {
        Vector3::new(
            (self.extent[0] - 1) as f64 / 2.0,
            (self.extent[1] - 1) as f64 / 2.0,
            (self.extent[2] - 1) as f64 / 2.0,
        )
    }

    pub fn world_center(&self) -> Point3<f64> {
        self.index_to_world(&self.center_index())
    }

    /// Grid center in volume-local physical space (index scaled by spacing,
    /// origin at the first voxel, axes along the grid).
    pub fn local_center(&self) -> Point3<f64> {
        Point3::from(self.center_index().component_mul(&self.spacing))
    }
}

fn orthonormalize(direction: &Matrix3<f64>) -> Option<Matrix3<f64>> {
    const EPS: f64 = 1e-9;

    let x = direction.column(0).into_owned();
    let y = direction.column(1).into_owned();
    let z = direction.column(2).into_owned();

    let x = x.try_normalize(EPS)?;
    let y = (y - x * x.dot(&y)).try_normalize(EPS)?;
    let mut normal = x.cross(&y);
    // Keep the handedness of the given slice axis when there is one.
    if z.norm() > EPS && normal.dot(&z) < 0.0 {
        normal = -normal;
    }

    Some(Matrix3::from_columns(&[x, y, normal]))
}
