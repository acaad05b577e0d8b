use nalgebra::{Matrix3, Point3, Vector3};
use ndarray::Array3;
use proptest::prelude::*;

use volprep::{dice, resample, Grid, Interpolation, PixelKind, ResampleOptions, Volume};

fn sign(flip: bool) -> f64 {
    if flip {
        -1.0
    } else {
        1.0
    }
}

fn interpolation() -> impl Strategy<Value = Interpolation> {
    prop_oneof![
        Just(Interpolation::Nearest),
        Just(Interpolation::Linear),
        Just(Interpolation::Bspline),
    ]
}

proptest! {
    #[test]
    fn index_and_physical_round_trip(
        origin in prop::array::uniform3(-500.0f64..500.0),
        spacing in prop::array::uniform3(0.1f64..5.0),
        flips in prop::array::uniform3(any::<bool>()),
        index in prop::array::uniform3(-10.0f64..100.0),
    ) {
        let direction = Matrix3::from_diagonal(&Vector3::new(sign(flips[0]), sign(flips[1]), sign(flips[2])));
        let grid = Grid::new([8, 8, 8], Point3::from(origin), Vector3::from(spacing), direction).unwrap();
        let index = Point3::from(index);
        let back = grid.physical_to_index(&grid.index_to_physical(&index));
        prop_assert!((back - index).amax() < 1e-9);
    }

    #[test]
    fn dice_of_a_mask_with_itself_is_one(bits in prop::collection::vec(any::<bool>(), 64)) {
        let samples = Array3::from_shape_vec((4, 4, 4), bits.iter().map(|b| *b as u8 as f64).collect()).unwrap();
        let grid = Grid::axis_aligned([4, 4, 4], [0.0; 3], [1.0; 3]).unwrap();
        let mask = Volume::from_grid(grid, samples, PixelKind::Label).unwrap();
        prop_assert_eq!(dice(&mask, &mask).unwrap(), 1.0);
    }

    #[test]
    fn resampling_onto_the_own_grid_is_identity(
        values in prop::collection::vec(-1000.0f64..1000.0, 60),
        interpolation in interpolation(),
    ) {
        let samples = Array3::from_shape_vec((3, 4, 5), values).unwrap();
        let volume = Volume::new(
            samples,
            Point3::new(1.0, 2.0, 3.0),
            Vector3::new(0.5, 1.0, 2.0),
            Matrix3::from_diagonal(&Vector3::new(-1.0, -1.0, 1.0)),
            PixelKind::Float,
        )
        .unwrap();
        let out = resample(&volume, volume.grid(), &ResampleOptions::new(interpolation)).unwrap();
        prop_assert_eq!(out.samples(), volume.samples());
        let again = resample(&out, volume.grid(), &ResampleOptions::new(interpolation)).unwrap();
        prop_assert_eq!(again, out);
    }
}
