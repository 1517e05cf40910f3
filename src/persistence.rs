//! Round trip of the fusion transform through a Spatial Registration Object.
//!
//! The display matrix goes into the standard Frame of Reference
//! Transformation Matrix (row-major, 16 values) nested in
//! Registration → Matrix Registration → Matrix sequences. The raw
//! [`ManualParameters`] are written to a private block as well; the matrix
//! alone does not determine which slider values produced it.

use std::path::Path;

use dicom::core::value::DataSetSequence;
use dicom::core::{DataElement, PrimitiveValue, Tag, VR};
use dicom::object::{FileMetaTableBuilder, InMemDicomObject, open_file};
use dicom_dictionary_std::{tags, uids};
use nalgebra::Matrix4;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::composer::ManualParameters;
use crate::error::{FusionError, Result};

pub const PRIVATE_CREATOR: &str = "DICOM_FUSION_MANUAL";
/// Reserves elements (0071,10xx).
pub const PRIVATE_CREATOR_TAG: Tag = Tag(0x0071, 0x0010);
/// "tx,ty,tz" in mm, stored as LT so any finite values fit.
pub const TRANSLATION_TAG: Tag = Tag(0x0071, 0x1001);
/// "rx,ry,rz" in degrees.
pub const ROTATION_TAG: Tag = Tag(0x0071, 0x1002);

/// DS values are limited to 16 characters.
const DS_MAX_LEN: usize = 16;

/// Transform recovered from an SRO.
#[derive(Debug, Clone, PartialEq)]
pub struct RestoredTransform {
    pub matrix: Matrix4<f64>,
    pub parameters: ManualParameters,
    /// Both private elements were present and well formed.
    pub exact: bool,
}

pub struct TransformPersistence;

impl TransformPersistence {
    pub fn build_sro(display: &Matrix4<f64>, parameters: &ManualParameters) -> InMemDicomObject {
        let matrix_item = InMemDicomObject::from_element_iter([
            DataElement::new(
                tags::FRAME_OF_REFERENCE_TRANSFORMATION_MATRIX,
                VR::DS,
                PrimitiveValue::Strs(row_major(display).iter().map(|v| format_ds(*v)).collect()),
            ),
            DataElement::new(
                tags::FRAME_OF_REFERENCE_TRANSFORMATION_MATRIX_TYPE,
                VR::CS,
                PrimitiveValue::from("RIGID"),
            ),
        ]);
        let matrix_registration = InMemDicomObject::from_element_iter([DataElement::new(
            tags::MATRIX_SEQUENCE,
            VR::SQ,
            DataSetSequence::from(vec![matrix_item]),
        )]);
        let registration = InMemDicomObject::from_element_iter([DataElement::new(
            tags::MATRIX_REGISTRATION_SEQUENCE,
            VR::SQ,
            DataSetSequence::from(vec![matrix_registration]),
        )]);

        let mut sro = InMemDicomObject::new_empty();
        sro.put(DataElement::new(
            tags::SOP_CLASS_UID,
            VR::UI,
            PrimitiveValue::from(uids::SPATIAL_REGISTRATION_STORAGE),
        ));
        sro.put(DataElement::new(
            tags::SOP_INSTANCE_UID,
            VR::UI,
            PrimitiveValue::from(generate_uid()),
        ));
        sro.put(DataElement::new(tags::MODALITY, VR::CS, PrimitiveValue::from("REG")));
        sro.put(DataElement::new(
            tags::REGISTRATION_SEQUENCE,
            VR::SQ,
            DataSetSequence::from(vec![registration]),
        ));
        sro.put(DataElement::new(
            PRIVATE_CREATOR_TAG,
            VR::LO,
            PrimitiveValue::from(PRIVATE_CREATOR),
        ));
        sro.put(DataElement::new(
            TRANSLATION_TAG,
            VR::LT,
            PrimitiveValue::from(format_triplet(&parameters.translation)),
        ));
        sro.put(DataElement::new(
            ROTATION_TAG,
            VR::LT,
            PrimitiveValue::from(format_triplet(&parameters.rotation)),
        ));
        sro
    }

    /// # Errors
    ///
    /// [`FusionError::TransformParse`] if no well-formed registration matrix
    /// is present. Missing or malformed private elements only downgrade the
    /// result: translation then comes from the matrix and rotation is zero.
    pub fn parse_sro(sro: &InMemDicomObject) -> Result<RestoredTransform> {
        let values = find_matrix_values(sro)
            .ok_or_else(|| FusionError::TransformParse("no registration matrix".to_string()))?;
        if values.len() != 16 {
            return Err(FusionError::TransformParse(format!(
                "expected 16 matrix values, got {}",
                values.len()
            )));
        }
        if values.iter().any(|v| !v.is_finite()) {
            return Err(FusionError::TransformParse("non-finite matrix value".to_string()));
        }
        let matrix = Matrix4::from_row_slice(&values);

        let has_private_block = sro
            .element(PRIVATE_CREATOR_TAG)
            .ok()
            .and_then(|e| e.to_str().ok().map(|s| s.trim() == PRIVATE_CREATOR))
            .unwrap_or(false);
        let private = |tag| has_private_block.then(|| read_triplet(sro, tag)).flatten();

        let translation = private(TRANSLATION_TAG);
        let rotation = private(ROTATION_TAG);
        let exact = translation.is_some() && rotation.is_some();
        if !exact {
            warn!("registration carries no usable slider values, deriving translation from the matrix");
        }

        let parameters = ManualParameters {
            translation: translation.unwrap_or([matrix[(0, 3)], matrix[(1, 3)], matrix[(2, 3)]]),
            rotation: rotation.unwrap_or([0.0; 3]),
        };
        debug!(?parameters, exact, "parsed registration");

        Ok(RestoredTransform {
            matrix,
            parameters,
            exact,
        })
    }

    pub fn save_to_file(sro: InMemDicomObject, path: impl AsRef<Path>) -> Result<()> {
        let instance_uid = sro
            .element(tags::SOP_INSTANCE_UID)
            .ok()
            .and_then(|e| e.to_str().ok().map(|s| s.trim_end_matches('\0').to_string()))
            .unwrap_or_else(generate_uid);
        let file = sro
            .with_meta(
                FileMetaTableBuilder::new()
                    .transfer_syntax(uids::EXPLICIT_VR_LITTLE_ENDIAN)
                    .media_storage_sop_class_uid(uids::SPATIAL_REGISTRATION_STORAGE)
                    .media_storage_sop_instance_uid(instance_uid),
            )
            .map_err(|e| FusionError::DicomWrite(e.to_string()))?;
        file.write_to_file(path.as_ref())
            .map_err(|e| FusionError::DicomWrite(e.to_string()))?;
        info!(path = %path.as_ref().display(), "saved registration");
        Ok(())
    }

    pub fn load_from_file(path: impl AsRef<Path>) -> Result<RestoredTransform> {
        let file = open_file(path.as_ref())?;
        Self::parse_sro(&file)
    }
}

fn row_major(matrix: &Matrix4<f64>) -> Vec<f64> {
    (0..4)
        .flat_map(|r| (0..4).map(move |c| matrix[(r, c)]))
        .collect()
}

/// Matrix locations in order of preference: the last one nested in the
/// registration sequence, then a top-level element.
fn find_matrix_values(sro: &InMemDicomObject) -> Option<Vec<f64>> {
    let nested = sro
        .element(tags::REGISTRATION_SEQUENCE)
        .ok()
        .and_then(|e| e.items())
        .into_iter()
        .flatten()
        .flat_map(|registration| nested_items(registration, tags::MATRIX_REGISTRATION_SEQUENCE))
        .flat_map(|matrix_registration| nested_items(matrix_registration, tags::MATRIX_SEQUENCE))
        .filter_map(matrix_values)
        .last();

    nested.or_else(|| matrix_values(sro))
}

fn nested_items(obj: &InMemDicomObject, tag: Tag) -> &[InMemDicomObject] {
    obj.element(tag)
        .ok()
        .and_then(|e| e.items())
        .unwrap_or(&[])
}

fn matrix_values(obj: &InMemDicomObject) -> Option<Vec<f64>> {
    obj.element(tags::FRAME_OF_REFERENCE_TRANSFORMATION_MATRIX)
        .ok()?
        .to_multi_float64()
        .ok()
}

fn read_triplet(obj: &InMemDicomObject, tag: Tag) -> Option<[f64; 3]> {
    let text = obj.element(tag).ok()?.to_str().ok()?;
    let values: Vec<f64> = text
        .trim_end_matches('\0')
        .split(',')
        .map(|part| part.trim().parse::<f64>())
        .collect::<std::result::Result<_, _>>()
        .ok()?;
    match values.as_slice() {
        [a, b, c] if values.iter().all(|v| v.is_finite()) => Some([*a, *b, *c]),
        _ => {
            warn!(%tag, %text, "malformed private slider element");
            None
        }
    }
}

fn format_triplet(values: &[f64; 3]) -> String {
    values
        .iter()
        .map(|v| trim_decimal(format!("{v:.9}")))
        .collect::<Vec<_>>()
        .join(",")
}

/// Shortest rendering with at most ten decimals that fits a DS value.
fn format_ds(value: f64) -> String {
    (0..=10)
        .rev()
        .map(|precision| trim_decimal(format!("{value:.precision$}")))
        .find(|s| s.len() <= DS_MAX_LEN)
        .unwrap_or_else(|| format!("{value:.6e}"))
}

fn trim_decimal(s: String) -> String {
    if s.contains('.') {
        let trimmed = s.trim_end_matches('0').trim_end_matches('.');
        if trimmed == "-0" { "0".to_string() } else { trimmed.to_string() }
    } else {
        s
    }
}

fn generate_uid() -> String {
    format!("2.25.{}", Uuid::new_v4().as_u128())
}
