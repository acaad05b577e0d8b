use nalgebra::{Matrix3, Point3, Vector3};
use ndarray::Array3;

use volprep::voxelize::TriangleMesh;
use volprep::{compare, load, save, CompareOptions, LoadOptions, PixelKind, Volume};

fn flipped(samples: Array3<f64>, origin: [f64; 3], spacing: f64, kind: PixelKind) -> Volume {
    Volume::new(
        samples,
        Point3::from(origin),
        Vector3::repeat(spacing),
        Matrix3::from_diagonal(&Vector3::new(-1.0, -1.0, 1.0)),
        kind,
    )
    .unwrap()
}

fn cube_mask(size: usize, lo: [usize; 3], edge: usize) -> Array3<f64> {
    Array3::from_shape_fn((size, size, size), |(i, j, k)| {
        let inside = [i, j, k]
            .iter()
            .zip(lo)
            .all(|(c, l)| *c >= l && *c < l + edge);
        if inside {
            1.0
        } else {
            0.0
        }
    })
}

#[test]
fn nifti_round_trip_keeps_geometry_and_samples() {
    let dir = tempfile::tempdir().unwrap();
    let samples = Array3::from_shape_fn((4, 5, 6), |(i, j, k)| (i * 100 + j * 10 + k) as f64 - 250.5);
    let volume = flipped(samples, [12.0, -7.5, 3.25], 0.75, PixelKind::Float);

    let path = dir.path().join("nested").join("ct.nii.gz");
    save(&volume, &path).unwrap();
    let back = load(&path, &LoadOptions::new(PixelKind::Float)).unwrap();

    assert_eq!(back.size(), [4, 5, 6]);
    assert!((back.origin() - volume.origin()).amax() < 1e-4);
    assert!((back.spacing() - volume.spacing()).amax() < 1e-6);
    assert!((back.direction() - volume.direction()).amax() < 1e-6);
    assert_eq!(back.samples()[[3, 4, 5]], 345.0 - 250.5);
    assert_eq!(back.samples()[[0, 0, 0]], -250.5);
}

#[test]
fn labels_are_stored_as_integers() {
    let dir = tempfile::tempdir().unwrap();
    let volume = flipped(cube_mask(6, [1; 3], 3), [0.0; 3], 1.0, PixelKind::Label);
    let path = dir.path().join("mask.nii");
    save(&volume, &path).unwrap();
    let back = load(&path, &LoadOptions::new(PixelKind::Label)).unwrap();
    assert_eq!(back.samples(), volume.samples());
    assert_eq!(back.count_nonzero(), 27);
}

#[test]
fn stl_is_voxelized_in_ras() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("femur.stl");
    TriangleMesh::cuboid(Point3::new(3.0, 6.0, 9.0), Point3::new(9.0, 12.0, 15.0))
        .write_stl(&path)
        .unwrap();
    let volume = load(&path, &LoadOptions::new(PixelKind::Label).with_voxel_size(1.5)).unwrap();

    assert_eq!(volume.kind(), PixelKind::Label);
    assert_eq!(volume.spacing(), &Vector3::repeat(1.5));
    // LPS mesh coordinates become RAS by flipping x and y
    let (lo, hi) = volume.grid().physical_bounds();
    assert!(lo.x <= -9.0 + 1e-4 && hi.x >= -3.0 - 1e-4);
    assert!(lo.y <= -12.0 + 1e-4 && hi.y >= -6.0 - 1e-4);
    assert!(lo.z <= 9.0 + 1e-4 && hi.z >= 15.0 - 1e-4);
    // the centre of the mesh is foreground
    let centre = volume.grid().physical_to_index(&Point3::new(-6.0, -9.0, 12.0));
    let idx = centre.map(|c| c.round() as usize);
    assert_eq!(volume.samples()[[idx.x, idx.y, idx.z]], 1.0);
}

#[test]
fn unknown_extension_is_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("scan.mha");
    std::fs::write(&path, b"").unwrap();
    assert!(matches!(
        load(&path, &LoadOptions::default()),
        Err(volprep::Error::UnsupportedFormat(_))
    ));
}

#[test]
fn saved_shifted_cube_scores_as_expected() {
    let dir = tempfile::tempdir().unwrap();
    let gt = flipped(cube_mask(14, [2, 2, 2], 10), [0.0; 3], 1.0, PixelKind::Label);
    let pred = flipped(cube_mask(14, [3, 2, 2], 10), [0.0; 3], 1.0, PixelKind::Label);
    let gt_path = dir.path().join("gt.nii.gz");
    let pred_path = dir.path().join("pred.nii.gz");
    save(&gt, &gt_path).unwrap();
    save(&pred, &pred_path).unwrap();

    let gt = load(&gt_path, &LoadOptions::new(PixelKind::Label)).unwrap();
    let pred = load(&pred_path, &LoadOptions::new(PixelKind::Float)).unwrap();
    let result = compare(&gt, &pred, &CompareOptions::default()).unwrap();
    assert!((result.dice - 0.9).abs() < 1e-9);
    assert!((result.hausdorff.unwrap() - 1.0).abs() < 1e-6);
}
