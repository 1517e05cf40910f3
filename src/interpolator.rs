use ndarray::{Array2, ArrayView2, ArrayView3};

use crate::enums::Interpolation;

pub(crate) struct Interpolator;

impl Interpolator {
    /// Output (width, height) that makes one pixel square in physical units.
    ///
    /// `spacing` is (column spacing, row spacing) of the slice. The finer axis
    /// keeps its pixel count, the coarser one is stretched.
    pub(crate) fn get_isotropic_dimensions(spacing: (f64, f64), original_dim: (usize, usize)) -> (usize, usize) {
        let (col_spacing, row_spacing) = spacing;
        let (height, width) = original_dim;
        let min_spacing = col_spacing.min(row_spacing);
        let inv_min_spacing = 1.0 / min_spacing;

        let new_width = (width as f64 * col_spacing * inv_min_spacing).round().max(1.0) as usize;
        let new_height = (height as f64 * row_spacing * inv_min_spacing).round().max(1.0) as usize;

        (new_width, new_height)
    }

    #[inline]
    pub(crate) fn bilinear_interpolate(slice: &ArrayView2<f32>, y: f32, x: f32) -> f32 {
        let (height, width) = slice.dim();

        let y0 = y.floor() as usize;
        let x0 = x.floor() as usize;
        let y1 = (y0 + 1).min(height - 1);
        let x1 = (x0 + 1).min(width - 1);

        let dy = y - y0 as f32;
        let dx = x - x0 as f32;
        let one_minus_dx = 1.0 - dx;
        let one_minus_dy = 1.0 - dy;

        let v00 = slice[[y0, x0]];
        let v01 = slice[[y0, x1]];
        let v10 = slice[[y1, x0]];
        let v11 = slice[[y1, x1]];

        let v0 = v00.mul_add(one_minus_dx, v01 * dx);
        let v1 = v10.mul_add(one_minus_dx, v11 * dx);

        v0.mul_add(one_minus_dy, v1 * dy)
    }

    /// Resize a plane to (width, height) with pixel-center alignment.
    pub(crate) fn resize_plane(plane: &ArrayView2<f32>, width: usize, height: usize) -> Array2<f32> {
        let (plane_height, plane_width) = plane.dim();
        if (plane_height, plane_width) == (height, width) {
            return plane.to_owned();
        }

        Array2::from_shape_fn((height, width), |(y, x)| {
            let norm_x = (x as f32 + 0.5) / width as f32;
            let norm_y = (y as f32 + 0.5) / height as f32;

            let src_x = norm_x * plane_width as f32 - 0.5;
            let src_y = norm_y * plane_height as f32 - 0.5;

            let src_x = src_x.max(0.0).min((plane_width - 1) as f32);
            let src_y = src_y.max(0.0).min((plane_height - 1) as f32);

            Self::bilinear_interpolate(plane, src_y, src_x)
        })
    }

    /// Sample a (z, y, x) raster at a continuous (x, y, z) voxel index.
    ///
    /// Returns `None` outside the grid. Points within half a voxel of the
    /// border are clamped onto it.
    pub(crate) fn sample(
        volume: &ArrayView3<f32>,
        index: [f64; 3],
        interpolation: Interpolation,
    ) -> Option<f32> {
        let (depth, height, width) = volume.dim();
        let limits = [width, height, depth];
        let mut clamped = [0.0_f64; 3];
        for axis in 0..3 {
            let max = (limits[axis] - 1) as f64;
            let value = index[axis];
            if !value.is_finite() || value < -0.5 || value > max + 0.5 {
                return None;
            }
            clamped[axis] = value.clamp(0.0, max);
        }

        match interpolation {
            Interpolation::Nearest => {
                let [x, y, z] = clamped.map(|v| v.round() as usize);
                Some(volume[[z, y, x]])
            }
            Interpolation::Linear => Some(Self::trilinear_interpolate(volume, clamped)),
        }
    }

    fn trilinear_interpolate(volume: &ArrayView3<f32>, index: [f64; 3]) -> f32 {
        let (depth, height, width) = volume.dim();
        let [x, y, z] = index;

        let x0 = x.floor() as usize;
        let y0 = y.floor() as usize;
        let z0 = z.floor() as usize;
        let x1 = (x0 + 1).min(width - 1);
        let y1 = (y0 + 1).min(height - 1);
        let z1 = (z0 + 1).min(depth - 1);

        let dx = (x - x0 as f64) as f32;
        let dy = (y - y0 as f64) as f32;
        let dz = (z - z0 as f64) as f32;

        let lerp = |a: f32, b: f32, t: f32| a.mul_add(1.0 - t, b * t);

        let c00 = lerp(volume[[z0, y0, x0]], volume[[z0, y0, x1]], dx);
        let c01 = lerp(volume[[z0, y1, x0]], volume[[z0, y1, x1]], dx);
        let c10 = lerp(volume[[z1, y0, x0]], volume[[z1, y0, x1]], dx);
        let c11 = lerp(volume[[z1, y1, x0]], volume[[z1, y1, x1]], dx);

        let c0 = lerp(c00, c01, dy);
        let c1 = lerp(c10, c11, dy);

        lerp(c0, c1, dz)
    }
}
