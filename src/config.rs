use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::enums::{Interpolation, LayerColor, SortBy};
use crate::staging::DEFAULT_ORPHAN_MIN_AGE;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct WindowLevel {
    pub width: f64,
    pub center: f64,
}

impl Default for WindowLevel {
    fn default() -> Self {
        Self {
            width: 400.0,
            center: 40.0,
        }
    }
}

impl WindowLevel {
    pub fn new(width: f64, center: f64) -> Self {
        Self { width, center }
    }

    /// `clip((v − (c − 0.5)) / (w − 1) + 0.5, 0, 1) · 255`
    ///
    /// A width of one or less is a hard threshold at `c − 0.5`.
    #[inline]
    pub fn apply(&self, value: f32) -> f32 {
        let value = f64::from(value);
        let lower = self.center - 0.5;
        let normalized = if self.width <= 1.0 {
            if value > lower { 1.0 } else { 0.0 }
        } else {
            ((value - lower) / (self.width - 1.0) + 0.5).clamp(0.0, 1.0)
        };
        (normalized * 255.0) as f32
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LayerStyle {
    pub window: WindowLevel,
    pub color: LayerColor,
}

impl LayerStyle {
    pub fn new(window: WindowLevel, color: LayerColor) -> Self {
        Self { window, color }
    }
}

/// How the fused slices are rendered.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DisplaySettings {
    pub fixed: LayerStyle,
    pub moving: LayerStyle,
    /// 0 shows only the fixed layer, 1 only the moving layer.
    pub opacity: f64,
    pub interpolation: Interpolation,
}

impl Default for DisplaySettings {
    fn default() -> Self {
        Self {
            fixed: LayerStyle::default(),
            moving: LayerStyle::default(),
            opacity: 0.5,
            interpolation: Interpolation::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub staging_root: PathBuf,
    pub staging_prefix: String,
    /// Only consulted where the owning process of a leftover staging
    /// directory cannot be checked.
    pub orphan_min_age: Duration,
    pub sort_by: SortBy,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            staging_root: std::env::temp_dir(),
            staging_prefix: "dicom-fusion-".to_string(),
            orphan_min_age: DEFAULT_ORPHAN_MIN_AGE,
            sort_by: SortBy::default(),
        }
    }
}

impl EngineConfig {
    pub fn with_staging_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.staging_root = root.into();
        self
    }

    pub fn with_staging_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.staging_prefix = prefix.into();
        self
    }

    pub fn with_orphan_min_age(mut self, age: Duration) -> Self {
        self.orphan_min_age = age;
        self
    }

    pub fn with_sort_by(mut self, sort_by: SortBy) -> Self {
        self.sort_by = sort_by;
        self
    }
}
