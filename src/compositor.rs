use image::{DynamicImage, ImageBuffer, Luma, Rgb};
use ndarray::{Array2, ArrayView2};
use tracing::warn;

use crate::config::{DisplaySettings, LayerStyle};
use crate::interpolator::Interpolator;

/// Turns a pair of co-registered slices into one display image.
pub struct SliceCompositor;

impl SliceCompositor {
    /// Layer weights `(fixed, moving)` for an opacity in [0, 1].
    ///
    /// Up to 0.5 the fixed layer stays at full strength while the moving
    /// layer fades in; above 0.5 the moving layer is at full strength and the
    /// fixed layer fades out.
    pub fn blend_weights(opacity: f64) -> (f32, f32) {
        let o = opacity.clamp(0.0, 1.0) as f32;
        if o <= 0.5 { (1.0, 2.0 * o) } else { (2.0 * (1.0 - o), 1.0) }
    }

    /// Window, colorize, blend and aspect-correct.
    ///
    /// `spacing` is the physical (column, row) spacing of the fixed slice.
    /// The result is single channel when every visible layer is grayscale and
    /// RGB otherwise. Layers with zero weight are not visible. Without a moving slice the fixed layer is rendered
    /// alone.
    pub fn compose(
        fixed: &ArrayView2<f32>,
        moving: Option<&ArrayView2<f32>>,
        spacing: (f64, f64),
        settings: &DisplaySettings,
    ) -> DynamicImage {
        let moving = moving.filter(|m| {
            let same = m.dim() == fixed.dim();
            if !same {
                warn!(fixed = ?fixed.dim(), moving = ?m.dim(), "moving slice shape differs, ignoring it");
            }
            same
        });

        let fixed_plane = Self::window(fixed, &settings.fixed);
        let mut layers = vec![(fixed_plane, settings.fixed, 1.0_f32)];
        if let Some(moving) = moving {
            let (fixed_weight, moving_weight) = Self::blend_weights(settings.opacity);
            layers[0].2 = fixed_weight;
            layers.push((Self::window(moving, &settings.moving), settings.moving, moving_weight));
        }
        // a fully faded layer must not change the output format
        layers.retain(|(_, _, weight)| *weight > 0.0);

        let grayscale = layers.iter().all(|(_, style, _)| style.color.is_grayscale());
        let (width, height) = Interpolator::get_isotropic_dimensions(spacing, fixed.dim());

        if grayscale {
            let plane = Self::accumulate(&layers, None);
            let plane = Interpolator::resize_plane(&plane.view(), width, height);
            DynamicImage::ImageLuma8(ImageBuffer::from_fn(width as u32, height as u32, |x, y| {
                Luma([quantize(plane[[y as usize, x as usize]])])
            }))
        } else {
            let planes: Vec<Array2<f32>> = (0..3)
                .map(|channel| {
                    let plane = Self::accumulate(&layers, Some(channel));
                    Interpolator::resize_plane(&plane.view(), width, height)
                })
                .collect();
            DynamicImage::ImageRgb8(ImageBuffer::from_fn(width as u32, height as u32, |x, y| {
                let (x, y) = (x as usize, y as usize);
                Rgb([
                    quantize(planes[0][[y, x]]),
                    quantize(planes[1][[y, x]]),
                    quantize(planes[2][[y, x]]),
                ])
            }))
        }
    }

    fn window(slice: &ArrayView2<f32>, style: &LayerStyle) -> Array2<f32> {
        slice.mapv(|v| style.window.apply(v))
    }

    fn accumulate(layers: &[(Array2<f32>, LayerStyle, f32)], channel: Option<usize>) -> Array2<f32> {
        let mut out = Array2::<f32>::zeros(layers[0].0.dim());
        for (plane, style, weight) in layers {
            let gain = channel.map_or(1.0, |c| style.color.rgb_gain()[c]);
            out.zip_mut_with(plane, |acc, v| *acc += weight * gain * v);
        }
        out.mapv_inplace(|v| v.min(255.0));
        out
    }
}

#[inline]
fn quantize(value: f32) -> u8 {
    value.round().clamp(0.0, 255.0) as u8
}
