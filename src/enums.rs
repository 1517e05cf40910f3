use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Orientation {
    Axial,
    Coronal,
    Sagittal,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum Interpolation {
    #[default]
    Linear,
    Nearest,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum SortBy {
    /// Position along the slice normal, ascending.
    #[default]
    ImagePositionPatient,
    InstanceNumber,
    None,
}

/// Tint applied to one display layer.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum LayerColor {
    #[default]
    Grayscale,
    Red,
    Green,
    Blue,
    Yellow,
    Cyan,
    Purple,
}

impl LayerColor {
    /// Per-channel (r, g, b) gain in [0, 1].
    pub fn rgb_gain(self) -> [f32; 3] {
        match self {
            LayerColor::Grayscale => [1.0, 1.0, 1.0],
            LayerColor::Red => [1.0, 0.0, 0.0],
            LayerColor::Green => [0.0, 1.0, 0.0],
            LayerColor::Blue => [0.0, 0.0, 1.0],
            LayerColor::Yellow => [1.0, 1.0, 0.0],
            LayerColor::Cyan => [0.0, 1.0, 1.0],
            LayerColor::Purple => [0.5, 0.0, 0.5],
        }
    }

    pub fn is_grayscale(self) -> bool {
        matches!(self, LayerColor::Grayscale)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownColor(pub String);

impl fmt::Display for UnknownColor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unknown layer color '{}'", self.0)
    }
}

impl std::error::Error for UnknownColor {}

impl FromStr for LayerColor {
    type Err = UnknownColor;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "grayscale" | "greyscale" | "gray" | "grey" => Ok(LayerColor::Grayscale),
            "red" => Ok(LayerColor::Red),
            "green" => Ok(LayerColor::Green),
            "blue" => Ok(LayerColor::Blue),
            "yellow" => Ok(LayerColor::Yellow),
            "cyan" => Ok(LayerColor::Cyan),
            "purple" => Ok(LayerColor::Purple),
            _ => Err(UnknownColor(s.to_string())),
        }
    }
}
