use thiserror::Error;

pub type Result<T> = std::result::Result<T, FusionError>;

#[derive(Debug, Error)]
pub enum FusionError {
    #[error("No volumetric image slices found")]
    NoVolumetricSlices,

    #[error("Volume construction failed: {0}")]
    VolumeConstruction(String),

    #[error("Registration matrix could not be parsed: {0}")]
    TransformParse(String),

    #[error("Invalid dimension: expected {expected}, got {got}")]
    InvalidDimension { expected: &'static str, got: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("DICOM error: {0}")]
    Dicom(#[from] dicom::object::ReadError),

    #[error("DICOM write error: {0}")]
    DicomWrite(String),
}
