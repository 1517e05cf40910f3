mod common;

use std::time::Duration;

use common::{SliceSpec, ct_series, slice_object, slice_object_with, staging_entries, write_series};
use dicom_dictionary_std::tags;
use dicom_fusion::{EngineConfig, FusionEngine, FusionError, SortBy, VolumeLoader};

#[test]
fn builds_frame_from_slice_geometry() {
    let objects: Vec<_> = ct_series().iter().map(slice_object).collect();
    let volume = VolumeLoader::load_from_dicom_objects(&objects, SortBy::ImagePositionPatient).unwrap();

    let frame = volume.frame();
    assert_eq!(volume.dim(), (3, 4, 6));
    assert_eq!(frame.extent(), [6, 4, 3]);
    assert_eq!(frame.origin().coords.as_slice(), &[-10.0, 20.0, 0.0]);
    // x follows columns (second PixelSpacing value), y follows rows
    assert_eq!(frame.spacing().as_slice(), &[0.75, 0.5, 2.0]);
    assert_eq!(*frame.direction(), nalgebra::Matrix3::identity());
    assert_eq!(volume.data()[[0, 0, 0]], 100.0);
    assert_eq!(volume.data()[[2, 3, 5]], 300.0);
}

#[test]
fn slices_are_sorted_along_the_normal() {
    let series = ct_series();
    let shuffled = [&series[2], &series[0], &series[1]];
    let objects: Vec<_> = shuffled.into_iter().map(slice_object).collect();

    let volume = VolumeLoader::load_from_dicom_objects(&objects, SortBy::ImagePositionPatient).unwrap();
    let firsts: Vec<f32> = (0..3).map(|z| volume.data()[[z, 0, 0]]).collect();
    assert_eq!(firsts, vec![100.0, 200.0, 300.0]);
    assert_eq!(volume.frame().origin().z, 0.0);
}

#[test]
fn descending_instance_order_flips_slice_axis() {
    let mut series = ct_series();
    for (spec, instance) in series.iter_mut().zip([3, 2, 1]) {
        spec.instance = instance;
    }
    let objects: Vec<_> = series.iter().map(slice_object).collect();

    let volume = VolumeLoader::load_from_dicom_objects(&objects, SortBy::InstanceNumber).unwrap();
    assert_eq!(volume.data()[[0, 0, 0]], 300.0);
    assert_eq!(volume.frame().origin().z, 4.0);
    assert_eq!(volume.frame().direction()[(2, 2)], -1.0);
    assert_eq!(volume.frame().spacing().z, 2.0);
}

#[test]
fn non_image_objects_are_filtered_out() {
    let mut specs = ct_series();
    let mut dose = SliceSpec::ct(9, 8.0, 5);
    dose.modality = "RTDOSE";
    specs.push(dose);
    let objects: Vec<_> = specs.iter().map(slice_object).collect();

    let volume = VolumeLoader::load_from_dicom_objects(&objects, SortBy::ImagePositionPatient).unwrap();
    assert_eq!(volume.dim().0, 3);
}

#[test]
fn only_non_image_objects_is_an_error() {
    let mut dose = SliceSpec::ct(1, 0.0, 5);
    dose.modality = "RTDOSE";
    let mut reg = SliceSpec::ct(2, 0.0, 5);
    reg.modality = "REG";
    let objects = vec![slice_object(&dose), slice_object(&reg)];

    let err = VolumeLoader::load_from_dicom_objects(&objects, SortBy::ImagePositionPatient).unwrap_err();
    assert!(matches!(err, FusionError::NoVolumetricSlices));
}

#[test]
fn missing_orientation_is_a_construction_error() {
    let objects: Vec<_> = ct_series()
        .iter()
        .map(|spec| {
            slice_object_with(spec, |obj| {
                obj.remove_element(tags::IMAGE_ORIENTATION_PATIENT);
            })
        })
        .collect();

    let err = VolumeLoader::load_from_dicom_objects(&objects, SortBy::ImagePositionPatient).unwrap_err();
    assert!(matches!(err, FusionError::VolumeConstruction(_)));
}

#[test]
fn single_slice_uses_slice_thickness() {
    let objects = vec![slice_object(&SliceSpec::ct(1, 0.0, 7))];
    let volume = VolumeLoader::load_from_dicom_objects(&objects, SortBy::ImagePositionPatient).unwrap();
    assert_eq!(volume.frame().spacing().z, 2.0);
}

#[test]
fn staged_load_keeps_directory_until_session_closes() {
    let data = tempfile::tempdir().unwrap();
    let root = tempfile::tempdir().unwrap();
    let mut specs = ct_series();
    let mut dose = SliceSpec::ct(9, 8.0, 5);
    dose.modality = "RTDOSE";
    specs.push(dose);
    let paths = write_series(data.path(), "ct", &specs);
    std::fs::write(data.path().join("notes.txt"), b"not dicom").unwrap();
    let mut offered = paths.clone();
    offered.push(data.path().join("notes.txt"));

    let engine = FusionEngine::new(EngineConfig::default().with_staging_root(root.path()));
    let session = engine.open_session(offered.as_slice(), None).unwrap();
    assert_eq!(session.fixed().dim().0, 3);

    let staged = staging_entries(root.path());
    assert_eq!(staged.len(), 1);
    assert_eq!(std::fs::read_dir(&staged[0]).unwrap().count(), 3);

    session.close();
    assert!(staging_entries(root.path()).is_empty());
}

#[test]
fn failed_load_leaves_no_staging_directory() {
    let data = tempfile::tempdir().unwrap();
    let root = tempfile::tempdir().unwrap();
    let fixed = write_series(data.path(), "fixed", &ct_series());

    // moving series whose slices have no position
    let moving: Vec<_> = ct_series()
        .iter()
        .enumerate()
        .map(|(i, spec)| {
            let path = data.path().join(format!("broken_{i}.dcm"));
            slice_object_with(spec, |obj| {
                obj.remove_element(tags::IMAGE_POSITION_PATIENT);
            })
            .write_to_file(&path)
            .unwrap();
            path
        })
        .collect();

    let engine = FusionEngine::new(EngineConfig::default().with_staging_root(root.path()));
    let err = engine.open_session(fixed.as_slice(), Some(moving.as_slice())).unwrap_err();
    assert!(matches!(err, FusionError::VolumeConstruction(_)));
    assert!(staging_entries(root.path()).is_empty());
}

#[test]
fn engine_drop_removes_directories_held_by_sessions() {
    let data = tempfile::tempdir().unwrap();
    let root = tempfile::tempdir().unwrap();
    let paths = write_series(data.path(), "ct", &ct_series());

    let engine = FusionEngine::new(EngineConfig::default().with_staging_root(root.path()));
    let session = engine.open_session(paths.as_slice(), None).unwrap();
    assert_eq!(staging_entries(root.path()).len(), 1);

    drop(engine);
    assert!(staging_entries(root.path()).is_empty());
    drop(session);
}

#[test]
fn engine_construction_sweeps_orphans() {
    let root = tempfile::tempdir().unwrap();
    let orphan = root.path().join("dicom-fusion-4294967295-deadbeef-leftover");
    std::fs::create_dir_all(orphan.join("nested")).unwrap();

    let _engine = FusionEngine::new(
        EngineConfig::default()
            .with_staging_root(root.path())
            .with_orphan_min_age(Duration::ZERO),
    );
    assert!(!orphan.exists());
}

#[cfg(target_os = "linux")]
#[test]
fn engine_construction_keeps_directories_of_running_processes() {
    let root = tempfile::tempdir().unwrap();
    // pid 1 never exits
    let live = root.path().join("dicom-fusion-1-abcdef12-xyz");
    std::fs::create_dir_all(&live).unwrap();

    let _engine = FusionEngine::new(
        EngineConfig::default()
            .with_staging_root(root.path())
            .with_orphan_min_age(Duration::ZERO),
    );
    assert!(live.exists());
}
