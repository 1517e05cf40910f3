use crate::{
    enums::SortBy,
    error::{FusionError, Result},
    frame::VolumeFrame,
    staging::{StagedSeries, TempVolumeStaging, is_volumetric_modality},
    volume::Volume,
};

use dicom::{
    core::Tag,
    object::{FileDicomObject, InMemDicomObject, open_file},
    pixeldata::{ConvertOptions, PixelDecoder, VoiLutOption},
};
use dicom_dictionary_std::tags;
use nalgebra::{Matrix3, Point3, Vector3};
use ndarray::{Array2, Array3, s};
use std::{fs, path::Path};
use tracing::{debug, info};

type DicomFile = FileDicomObject<InMemDicomObject>;

/// Slices closer than this along the normal count as coincident.
const MIN_SLICE_GAP: f64 = 1e-6;

pub struct VolumeLoader;

struct SliceHeader<'a> {
    object: &'a DicomFile,
    position: Point3<f64>,
    order: f64,
}

impl VolumeLoader {
    /// Load a volume from DICOM objects
    ///
    /// Objects whose modality is not a tomographic image modality are dropped
    /// before anything else is inspected.
    ///
    /// # Errors
    ///
    /// [`FusionError::NoVolumetricSlices`] if nothing is left after filtering,
    /// [`FusionError::VolumeConstruction`] if geometry tags are missing or
    /// malformed or the pixel data cannot be decoded.
    pub fn load_from_dicom_objects(dicom_objects: &[DicomFile], sort_by: SortBy) -> Result<Volume> {
        let images: Vec<&DicomFile> = dicom_objects
            .iter()
            .filter(|object| {
                get_string(object, tags::MODALITY).is_some_and(|m| is_volumetric_modality(&m))
            })
            .collect();

        if images.is_empty() {
            return Err(FusionError::NoVolumetricSlices);
        }

        let (row_dir, col_dir) = Self::get_orientation(images[0])?;
        let normal = row_dir.cross(&col_dir);

        let mut headers = images
            .iter()
            .enumerate()
            .map(|(i, object)| {
                let position = get_position(object)?;
                let order = match sort_by {
                    SortBy::ImagePositionPatient => position.coords.dot(&normal),
                    SortBy::InstanceNumber => get_int(object, tags::INSTANCE_NUMBER).unwrap_or(0) as f64,
                    SortBy::None => i as f64,
                };
                Ok(SliceHeader {
                    object: *object,
                    position,
                    order,
                })
            })
            .collect::<Result<Vec<_>>>()?;

        if !matches!(sort_by, SortBy::None) {
            headers.sort_by(|a, b| a.order.partial_cmp(&b.order).unwrap_or(std::cmp::Ordering::Equal));
        }

        let slices = headers
            .iter()
            .map(|header| Self::decode_image(header.object))
            .collect::<Result<Vec<_>>>()?;
        Self::validate_dimensions(&slices)?;

        let first = &headers[0];
        let last = &headers[headers.len() - 1];
        let travel = (last.position - first.position).dot(&normal);
        let slice_dir = if travel < 0.0 { -normal } else { normal };

        let (row_spacing, col_spacing) = Self::get_pixel_spacing(first.object)?;
        let slice_spacing = if headers.len() > 1 && travel.abs() / ((headers.len() - 1) as f64) > MIN_SLICE_GAP {
            travel.abs() / (headers.len() - 1) as f64
        } else {
            Self::get_fallback_slice_spacing(first.object)
        };

        let (height, width) = slices[0].dim();
        let frame = VolumeFrame::new(
            first.position,
            Vector3::new(col_spacing, row_spacing, slice_spacing),
            Matrix3::from_columns(&[row_dir, col_dir, slice_dir]),
            [width, height, slices.len()],
        )?;

        info!(
            slices = slices.len(),
            rows = height,
            columns = width,
            spacing = ?frame.spacing().as_slice(),
            "loaded volume"
        );

        Volume::new(Self::build_volume_array(&slices), frame)
    }

    /// Load a volume from file paths
    pub fn load_from_file_paths(paths: &[impl AsRef<Path>], sort_by: SortBy) -> Result<Volume> {
        let objects: std::result::Result<Vec<_>, _> =
            paths.iter().map(|path| open_file(path.as_ref())).collect();

        Self::load_from_dicom_objects(&objects?, sort_by)
    }

    /// Load a volume from a directory containing .dcm files
    pub fn load_from_directory(path: impl AsRef<Path>, sort_by: SortBy) -> Result<Volume> {
        let mut paths: Vec<_> = fs::read_dir(path.as_ref())?
            .filter_map(std::result::Result::ok)
            .map(|entry| entry.path())
            .filter(|path| {
                path.extension()
                    .and_then(|s| s.to_str())
                    .is_some_and(|ext| ext.eq_ignore_ascii_case("dcm"))
            })
            .collect();

        if paths.is_empty() {
            return Err(FusionError::NoVolumetricSlices);
        }
        paths.sort();

        Self::load_from_file_paths(&paths, sort_by)
    }

    /// Stage the series and read it back from the staging directory.
    ///
    /// The staged directory is handed back to the caller, who decides how
    /// long it lives. On failure it has already been removed.
    pub fn load_staged(
        staging: &TempVolumeStaging,
        paths: &[impl AsRef<Path>],
        sort_by: SortBy,
    ) -> Result<(Volume, StagedSeries)> {
        let staged = staging.stage(paths)?;
        match Self::load_from_directory(staged.path(), sort_by) {
            Ok(volume) => Ok((volume, staged)),
            Err(err) => {
                debug!(error = %err, "load failed, releasing staging directory");
                staged.release();
                Err(err)
            }
        }
    }

    fn get_orientation(dicom_object: &DicomFile) -> Result<(Vector3<f64>, Vector3<f64>)> {
        let iop = get_f64_vec(dicom_object, tags::IMAGE_ORIENTATION_PATIENT)
            .ok_or_else(|| missing("ImageOrientationPatient"))?;
        if iop.len() != 6 {
            return Err(FusionError::VolumeConstruction(format!(
                "ImageOrientationPatient has {} values, expected 6",
                iop.len()
            )));
        }
        let row = Vector3::new(iop[0], iop[1], iop[2]);
        let col = Vector3::new(iop[3], iop[4], iop[5]);
        let degenerate = || FusionError::VolumeConstruction("degenerate ImageOrientationPatient".to_string());
        let row = row.try_normalize(1e-9).ok_or_else(degenerate)?;
        let col = (col - row * row.dot(&col)).try_normalize(1e-9).ok_or_else(degenerate)?;
        Ok((row, col))
    }

    fn get_pixel_spacing(dicom_object: &DicomFile) -> Result<(f64, f64)> {
        let spacing = get_f64_vec(dicom_object, tags::PIXEL_SPACING).ok_or_else(|| missing("PixelSpacing"))?;
        match spacing.as_slice() {
            [row, col, ..] => Ok((*row, *col)),
            _ => Err(FusionError::VolumeConstruction(
                "PixelSpacing needs two values".to_string(),
            )),
        }
    }

    fn get_fallback_slice_spacing(dicom_object: &DicomFile) -> f64 {
        let positive = |v: f64| (v.is_finite() && v > 0.0).then_some(v);
        get_f64(dicom_object, tags::SPACING_BETWEEN_SLICES)
            .and_then(positive)
            .or_else(|| get_f64(dicom_object, tags::SLICE_THICKNESS).and_then(positive))
            .or_else(|| {
                get_f64_vec(dicom_object, tags::GRID_FRAME_OFFSET_VECTOR)
                    .filter(|offsets| offsets.len() > 1)
                    .and_then(|offsets| positive((offsets[1] - offsets[0]).abs()))
            })
            .unwrap_or(1.0)
    }

    fn decode_image(dicom_object: &DicomFile) -> Result<Array2<f32>> {
        let pixel_data = dicom_object
            .decode_pixel_data()
            .map_err(|e| FusionError::VolumeConstruction(format!("pixel data: {e}")))?;
        let options = ConvertOptions::new().with_voi_lut(VoiLutOption::Identity);
        pixel_data
            .to_ndarray_with_options::<f32>(&options)
            .map(|arr| arr.slice_move(s![0, .., .., 0]))
            .map_err(|e| FusionError::VolumeConstruction(format!("pixel data: {e}")))
    }

    fn validate_dimensions(images: &[Array2<f32>]) -> Result<()> {
        let first_dim = images[0].dim();
        if images.iter().any(|img| img.dim() != first_dim) {
            return Err(FusionError::VolumeConstruction(
                "inconsistent image dimensions".to_string(),
            ));
        }
        Ok(())
    }

    fn build_volume_array(images: &[Array2<f32>]) -> Array3<f32> {
        let (height, width) = images[0].dim();
        let depth = images.len();
        let mut volume = Array3::<f32>::zeros((depth, height, width));

        for (i, image) in images.iter().enumerate() {
            volume.slice_mut(s![i, .., ..]).assign(image);
        }

        volume
    }
}

fn missing(name: &str) -> FusionError {
    FusionError::VolumeConstruction(format!("missing or malformed {name}"))
}

fn get_string(obj: &InMemDicomObject, tag: Tag) -> Option<String> {
    obj.element(tag).ok()?.to_str().ok().map(|s| s.trim().to_string())
}

fn get_int(obj: &InMemDicomObject, tag: Tag) -> Option<i64> {
    obj.element(tag).ok()?.to_int::<i64>().ok()
}

fn get_f64(obj: &InMemDicomObject, tag: Tag) -> Option<f64> {
    obj.element(tag).ok()?.to_float64().ok()
}

fn get_f64_vec(obj: &InMemDicomObject, tag: Tag) -> Option<Vec<f64>> {
    obj.element(tag).ok()?.to_multi_float64().ok()
}

fn get_position(obj: &InMemDicomObject) -> Result<Point3<f64>> {
    match get_f64_vec(obj, tags::IMAGE_POSITION_PATIENT).as_deref() {
        Some([x, y, z]) => Ok(Point3::new(*x, *y, *z)),
        _ => Err(missing("ImagePositionPatient")),
    }
}
