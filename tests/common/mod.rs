#![allow(dead_code)]

use std::path::{Path, PathBuf};

use dicom::core::{DataElement, PrimitiveValue, VR};
use dicom::object::{FileDicomObject, FileMetaTableBuilder, InMemDicomObject};
use dicom_dictionary_std::{tags, uids};
use dicom_fusion::{Volume, VolumeFrame};
use nalgebra::{Point3, Vector3};
use ndarray::Array3;

pub const AXIAL: [f64; 6] = [1.0, 0.0, 0.0, 0.0, 1.0, 0.0];

/// Geometry and content of a synthetic single-frame slice.
#[derive(Clone, Debug)]
pub struct SliceSpec {
    pub modality: &'static str,
    pub instance: i32,
    pub rows: u16,
    pub columns: u16,
    pub position: [f64; 3],
    pub orientation: [f64; 6],
    pub pixel_spacing: [f64; 2],
    pub thickness: f64,
    pub value: u16,
}

impl SliceSpec {
    pub fn ct(instance: i32, z: f64, value: u16) -> Self {
        Self {
            modality: "CT",
            instance,
            rows: 4,
            columns: 6,
            position: [-10.0, 20.0, z],
            orientation: AXIAL,
            pixel_spacing: [0.5, 0.75],
            thickness: 2.0,
            value,
        }
    }
}

fn ds(values: &[f64]) -> PrimitiveValue {
    PrimitiveValue::Strs(values.iter().map(|v| v.to_string()).collect())
}

fn uid() -> String {
    format!("2.25.{}", uuid::Uuid::new_v4().as_u128())
}

pub fn slice_object(spec: &SliceSpec) -> FileDicomObject<InMemDicomObject> {
    slice_object_with(spec, |_| {})
}

/// Build a slice and let the caller tweak the dataset before the file meta
/// table is attached.
pub fn slice_object_with(
    spec: &SliceSpec,
    tweak: impl FnOnce(&mut InMemDicomObject),
) -> FileDicomObject<InMemDicomObject> {
    let instance_uid = uid();
    let pixels = vec![spec.value; spec.rows as usize * spec.columns as usize];
    let mut obj = InMemDicomObject::from_element_iter([
        DataElement::new(tags::SOP_CLASS_UID, VR::UI, PrimitiveValue::from(uids::CT_IMAGE_STORAGE)),
        DataElement::new(tags::SOP_INSTANCE_UID, VR::UI, PrimitiveValue::from(instance_uid.clone())),
        DataElement::new(tags::MODALITY, VR::CS, PrimitiveValue::from(spec.modality)),
        DataElement::new(tags::INSTANCE_NUMBER, VR::IS, PrimitiveValue::from(spec.instance.to_string())),
        DataElement::new(tags::IMAGE_POSITION_PATIENT, VR::DS, ds(&spec.position)),
        DataElement::new(tags::IMAGE_ORIENTATION_PATIENT, VR::DS, ds(&spec.orientation)),
        DataElement::new(tags::PIXEL_SPACING, VR::DS, ds(&spec.pixel_spacing)),
        DataElement::new(tags::SLICE_THICKNESS, VR::DS, ds(&[spec.thickness])),
        DataElement::new(tags::SAMPLES_PER_PIXEL, VR::US, PrimitiveValue::from(1_u16)),
        DataElement::new(tags::PHOTOMETRIC_INTERPRETATION, VR::CS, PrimitiveValue::from("MONOCHROME2")),
        DataElement::new(tags::ROWS, VR::US, PrimitiveValue::from(spec.rows)),
        DataElement::new(tags::COLUMNS, VR::US, PrimitiveValue::from(spec.columns)),
        DataElement::new(tags::BITS_ALLOCATED, VR::US, PrimitiveValue::from(16_u16)),
        DataElement::new(tags::BITS_STORED, VR::US, PrimitiveValue::from(16_u16)),
        DataElement::new(tags::HIGH_BIT, VR::US, PrimitiveValue::from(15_u16)),
        DataElement::new(tags::PIXEL_REPRESENTATION, VR::US, PrimitiveValue::from(0_u16)),
        DataElement::new(tags::PIXEL_DATA, VR::OW, PrimitiveValue::U16(pixels.into_iter().collect())),
    ]);
    tweak(&mut obj);

    obj.with_meta(
        FileMetaTableBuilder::new()
            .transfer_syntax(uids::EXPLICIT_VR_LITTLE_ENDIAN)
            .media_storage_sop_class_uid(uids::CT_IMAGE_STORAGE)
            .media_storage_sop_instance_uid(instance_uid),
    )
    .expect("should have attached file meta")
}

/// Write each slice as `<name>_<i>.dcm` under `dir`.
pub fn write_series(dir: &Path, name: &str, specs: &[SliceSpec]) -> Vec<PathBuf> {
    specs
        .iter()
        .enumerate()
        .map(|(i, spec)| {
            let path = dir.join(format!("{name}_{i}.dcm"));
            slice_object(spec)
                .write_to_file(&path)
                .expect("should have written slice");
            path
        })
        .collect()
}

/// Three axial CT slices, 2mm apart, values 100/200/300 from bottom to top.
pub fn ct_series() -> Vec<SliceSpec> {
    vec![
        SliceSpec::ct(1, 0.0, 100),
        SliceSpec::ct(2, 2.0, 200),
        SliceSpec::ct(3, 4.0, 300),
    ]
}

/// Axis-aligned in-memory volume with a value ramp.
pub fn ramp_volume(origin: [f64; 3], spacing: [f64; 3], extent: [usize; 3]) -> Volume {
    let frame = VolumeFrame::axis_aligned(Point3::from(origin), Vector3::from(spacing), extent)
        .expect("should have built frame");
    let data = Array3::from_shape_fn(frame.dim(), |(z, y, x)| (x + 4 * y + 16 * z) as f32);
    Volume::new(data, frame).expect("should have built volume")
}

/// Entries currently under a staging root.
pub fn staging_entries(root: &Path) -> Vec<PathBuf> {
    std::fs::read_dir(root)
        .map(|entries| entries.filter_map(Result::ok).map(|e| e.path()).collect())
        .unwrap_or_default()
}
