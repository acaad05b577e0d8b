use std::fs;
use std::path::Path;

use nalgebra::Point3;

use volprep::dataset::{count_cases, DatasetDescriptor};
use volprep::pipeline::{prepare_dataset, PrepareConfig};
use volprep::voxelize::TriangleMesh;
use volprep::{load, LoadOptions, PixelKind};

/// 30^3 CT at 1 mm in LPS with origin (0, 0, 20).
fn write_ct(path: &Path) {
    let mut bytes = b"NRRD0004\n\
        type: short\n\
        dimension: 3\n\
        space: left-posterior-superior\n\
        sizes: 30 30 30\n\
        space directions: (1,0,0) (0,1,0) (0,0,1)\n\
        kinds: domain domain domain\n\
        endian: little\n\
        encoding: raw\n\
        space origin: (0,0,20)\n\
        \n"
    .to_vec();
    for _ in 0..30 * 30 * 30 {
        bytes.extend_from_slice(&40i16.to_le_bytes());
    }
    fs::write(path, bytes).unwrap();
}

fn write_subject(root: &Path, name: &str, with_mesh: bool) {
    let dir = root.join(name);
    fs::create_dir_all(&dir).unwrap();
    write_ct(&dir.join(format!("{name}.nrrd")));
    if with_mesh {
        TriangleMesh::cuboid(Point3::new(10.0, 10.0, 30.0), Point3::new(16.0, 16.0, 36.0))
            .write_stl(dir.join(format!("{name}.stl")))
            .unwrap();
    }
}

#[test]
fn batch_builds_dataset_and_skips_broken_subjects() {
    let root = tempfile::tempdir().unwrap();
    let subjects = root.path().join("Subjects");
    for name in ["Pat001", "Pat002"] {
        write_subject(&subjects, name, true);
    }
    // no mesh, so this subject fails
    write_subject(&subjects, "Pat003", false);
    fs::create_dir_all(subjects.join("Notes")).unwrap();

    let train_root = root.path().join("raw");
    let valid_root = root.path().join("test");
    let config = PrepareConfig {
        dataset_id: 103,
        ..PrepareConfig::default()
    };
    let summary = prepare_dataset(&subjects, &train_root, &valid_root, &config).unwrap();

    // 3 subjects: 2 train, 1 validation
    assert_eq!(summary.train.total(), 2);
    assert_eq!(summary.validation.total(), 1);
    let mut all = summary.train.clone();
    all.merge(summary.validation.clone());
    assert_eq!(all.succeeded.len(), 2);
    assert_eq!(all.failed.len(), 1);
    assert_eq!(all.failed[0].0, "Pat003");

    let dataset_dir = train_root.join("Dataset103_FemurRefine");
    let labels = dataset_dir.join("labelsTr");
    assert_eq!(count_cases(&labels).unwrap(), summary.train.succeeded.len());
    assert_eq!(summary.num_training, summary.train.succeeded.len());
    assert_eq!(summary.dataset_json, dataset_dir.join("dataset.json"));
    let descriptor = DatasetDescriptor::read(&summary.dataset_json).unwrap();
    assert_eq!(descriptor.num_training, summary.num_training);
    assert_eq!(descriptor.file_ending, ".nii.gz");

    // every written case has both channels on the label grid
    for entry in fs::read_dir(&labels).unwrap() {
        let label_path = entry.unwrap().path();
        let file = label_path.file_name().unwrap().to_string_lossy().into_owned();
        let sample = file.trim_end_matches(".nii.gz");
        assert!(sample.ends_with("_15_20"));
        let label = load(&label_path, &LoadOptions::new(PixelKind::Label)).unwrap();
        assert!(label.count_nonzero() > 0);
        for channel in ["0000", "0001"] {
            let image = dataset_dir.join("imagesTr").join(format!("{sample}_{channel}.nii.gz"));
            let image = load(&image, &LoadOptions::new(PixelKind::Float)).unwrap();
            assert_eq!(image.size(), label.size());
            assert!((image.origin() - label.origin()).amax() < 1e-4);
        }
        let ct = dataset_dir.join("imagesTr").join(format!("{sample}_0000.nii.gz"));
        let ct = load(&ct, &LoadOptions::new(PixelKind::Float)).unwrap();
        assert!(ct.samples().iter().all(|v| (*v - 40.0).abs() < 1e-3));
    }
}

#[test]
fn skipping_validation_leaves_the_test_root_alone() {
    let root = tempfile::tempdir().unwrap();
    let subjects = root.path().join("Subjects");
    for name in ["Pat001", "Pat002", "Pat003"] {
        write_subject(&subjects, name, true);
    }
    let valid_root = root.path().join("test");
    let config = PrepareConfig {
        dataset_id: 7,
        skip_validation: true,
        crop_padding: Some(2),
        ..PrepareConfig::default()
    };
    let summary = prepare_dataset(&subjects, &root.path().join("raw"), &valid_root, &config).unwrap();
    assert_eq!(summary.train.succeeded.len(), 2);
    assert_eq!(summary.validation.total(), 0);
    assert!(!valid_root.exists());
    assert_eq!(summary.num_training, 2);
}

#[test]
fn empty_subject_directory_is_an_error() {
    let root = tempfile::tempdir().unwrap();
    let result = prepare_dataset(
        root.path(),
        &root.path().join("raw"),
        &root.path().join("test"),
        &PrepareConfig::default(),
    );
    assert!(result.is_err());
}
