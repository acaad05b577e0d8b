//! Volumes and the grids they are sampled on.
//!
//! A [`Grid`] describes where samples live in physical space: the number of
//! samples per axis, the physical position of sample `[0, 0, 0]`, the distance
//! between neighbouring samples and the orientation of the index axes. A
//! [`Volume`] pairs a grid with a dense sample array of the same shape.
//!
//! Physical coordinates are right-handed (RAS), the convention NIfTI uses:
//!
//! ```text
//! point = origin + direction * (spacing ⊙ index)
//! ```

use clap::ValueEnum;
use nalgebra::{Matrix3, Matrix4, Point3, Vector3};
use ndarray::{s, Array3};

use crate::error::{Error, Result};

const GRID_TOLERANCE: f64 = 1e-6;

/// How samples are interpreted downstream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum PixelKind {
    /// Integer label codes, stored on disk as `uint8`.
    Label,
    /// Continuous intensities or probabilities, stored on disk as `float32`.
    Float,
}

impl PixelKind {
    /// Brings a raw value into the domain of this kind.
    #[inline]
    pub fn quantize(self, value: f64) -> f64 {
        match self {
            PixelKind::Label => value.round().clamp(0.0, u8::MAX as f64),
            PixelKind::Float => value,
        }
    }
}

/// Sampling grid: size, origin, spacing and direction.
#[derive(Debug, Clone, PartialEq)]
pub struct Grid {
    size: [usize; 3],
    origin: Point3<f64>,
    spacing: Vector3<f64>,
    direction: Matrix3<f64>,
    inverse_direction: Matrix3<f64>,
}

impl Grid {
    /// Builds a grid, rejecting non-positive spacing and singular directions.
    pub fn new(
        size: [usize; 3],
        origin: Point3<f64>,
        spacing: Vector3<f64>,
        direction: Matrix3<f64>,
    ) -> Result<Self> {
        if spacing.iter().any(|s| !s.is_finite() || *s <= 0.0) {
            return Err(Error::InvalidSpacing([spacing.x, spacing.y, spacing.z]));
        }
        if origin.iter().any(|o| !o.is_finite()) {
            return Err(Error::InvalidGeometry(format!("non-finite origin {origin}")));
        }
        let inverse_direction = direction.try_inverse().ok_or_else(|| {
            Error::InvalidGeometry(format!("direction matrix is singular: {direction}"))
        })?;
        Ok(Self {
            size,
            origin,
            spacing,
            direction,
            inverse_direction,
        })
    }

    /// Axis-aligned grid with identity direction.
    pub fn axis_aligned(size: [usize; 3], origin: [f64; 3], spacing: [f64; 3]) -> Result<Self> {
        Self::new(
            size,
            Point3::from(origin),
            Vector3::from(spacing),
            Matrix3::identity(),
        )
    }

    /// Decomposes a 4x4 voxel-to-world affine into spacing and direction.
    ///
    /// Spacing is the norm of each of the first three columns, direction the
    /// normalized columns, origin the translation column.
    pub fn from_affine(size: [usize; 3], affine: &Matrix4<f64>) -> Result<Self> {
        let linear = affine.fixed_slice::<3, 3>(0, 0).into_owned();
        let origin = Point3::new(affine[(0, 3)], affine[(1, 3)], affine[(2, 3)]);
        let mut spacing = Vector3::zeros();
        let mut direction = Matrix3::identity();
        for axis in 0..3 {
            let column = linear.column(axis);
            let norm = column.norm();
            spacing[axis] = norm;
            if norm > 0.0 {
                direction.set_column(axis, &(column / norm));
            }
        }
        Self::new(size, origin, spacing, direction)
    }

    pub fn size(&self) -> [usize; 3] {
        self.size
    }

    pub fn origin(&self) -> &Point3<f64> {
        &self.origin
    }

    pub fn spacing(&self) -> &Vector3<f64> {
        &self.spacing
    }

    pub fn direction(&self) -> &Matrix3<f64> {
        &self.direction
    }

    /// Voxel-to-world affine, the inverse of [`Grid::from_affine`].
    pub fn affine(&self) -> Matrix4<f64> {
        let linear = self.direction * Matrix3::from_diagonal(&self.spacing);
        let mut affine = Matrix4::identity();
        affine.fixed_slice_mut::<3, 3>(0, 0).copy_from(&linear);
        for axis in 0..3 {
            affine[(axis, 3)] = self.origin[axis];
        }
        affine
    }

    /// `origin + direction * (spacing ⊙ index)`
    pub fn index_to_physical(&self, index: &Point3<f64>) -> Point3<f64> {
        self.origin + self.direction * index.coords.component_mul(&self.spacing)
    }

    /// `(direction⁻¹ * (point - origin)) ⊘ spacing`
    pub fn physical_to_index(&self, point: &Point3<f64>) -> Point3<f64> {
        let rotated = self.inverse_direction * (point - self.origin);
        Point3::from(rotated.component_div(&self.spacing))
    }

    /// Linear map taking an index of `self` to a continuous index of `source`.
    ///
    /// Returns `(m, t)` with `source_index = m * index + t`.
    pub fn index_map_to(&self, source: &Grid) -> (Matrix3<f64>, Vector3<f64>) {
        let to_source = Matrix3::from_diagonal(&source.spacing.map(|s| 1.0 / s))
            * source.inverse_direction;
        let m = to_source * self.direction * Matrix3::from_diagonal(&self.spacing);
        let t = to_source * (self.origin - source.origin);
        (m, t)
    }

    /// Physical position of the geometric centre of the sample block.
    pub fn center(&self) -> Point3<f64> {
        let mid = Point3::new(
            (self.size[0] as f64 - 1.0) / 2.0,
            (self.size[1] as f64 - 1.0) / 2.0,
            (self.size[2] as f64 - 1.0) / 2.0,
        );
        self.index_to_physical(&mid)
    }

    /// Axis-aligned physical bounds `(min, max)` of the voxel centres.
    pub fn physical_bounds(&self) -> (Point3<f64>, Point3<f64>) {
        let mut min = Point3::new(f64::INFINITY, f64::INFINITY, f64::INFINITY);
        let mut max = Point3::new(f64::NEG_INFINITY, f64::NEG_INFINITY, f64::NEG_INFINITY);
        for corner in 0..8 {
            let index = Point3::new(
                if corner & 1 == 0 { 0.0 } else { self.size[0].saturating_sub(1) as f64 },
                if corner & 2 == 0 { 0.0 } else { self.size[1].saturating_sub(1) as f64 },
                if corner & 4 == 0 { 0.0 } else { self.size[2].saturating_sub(1) as f64 },
            );
            let p = self.index_to_physical(&index);
            for axis in 0..3 {
                min[axis] = min[axis].min(p[axis]);
                max[axis] = max[axis].max(p[axis]);
            }
        }
        (min, max)
    }

    /// Same origin and direction, `size * factor` samples at `spacing / factor`.
    pub fn rescaled(&self, factor: [f64; 3]) -> Result<Grid> {
        if factor.iter().any(|f| !f.is_finite() || *f <= 0.0) {
            return Err(Error::InvalidParameter(format!(
                "scale factor must be positive, got {factor:?}"
            )));
        }
        let mut size = [0; 3];
        let mut spacing = self.spacing;
        for axis in 0..3 {
            size[axis] = ((self.size[axis] as f64 * factor[axis]).round() as usize).max(1);
            spacing[axis] /= factor[axis];
        }
        Grid::new(size, self.origin, spacing, self.direction)
    }

    /// Sub-grid starting at `start` with `size` samples per axis.
    pub fn region(&self, start: [usize; 3], size: [usize; 3]) -> Result<Grid> {
        for axis in 0..3 {
            if start[axis] + size[axis] > self.size[axis] || size[axis] == 0 {
                return Err(Error::ShapeMismatch {
                    expected: self.size,
                    found: [
                        start[0] + size[0],
                        start[1] + size[1],
                        start[2] + size[2],
                    ],
                });
            }
        }
        let start = Point3::new(start[0] as f64, start[1] as f64, start[2] as f64);
        Grid::new(
            size,
            self.index_to_physical(&start),
            self.spacing,
            self.direction,
        )
    }

    /// Grid grown by `padding` samples on every face, content left in place.
    pub fn padded(&self, padding: usize) -> Grid {
        let shift = -(padding as f64);
        let origin = self.index_to_physical(&Point3::new(shift, shift, shift));
        Grid {
            size: self.size.map(|n| n + 2 * padding),
            origin,
            ..self.clone()
        }
    }

    /// Whether two grids describe the same sample positions.
    pub fn coincides_with(&self, other: &Grid) -> bool {
        self.size == other.size
            && (self.origin - other.origin).amax() < GRID_TOLERANCE
            && (self.spacing - other.spacing).amax() < GRID_TOLERANCE
            && (self.direction - other.direction).amax() < GRID_TOLERANCE
    }
}

/// A dense 3D sample array on a [`Grid`].
///
/// Samples are indexed `[i, j, k]` along the grid's first, second and third
/// axis. The array shape always equals the grid size.
#[derive(Debug, Clone, PartialEq)]
pub struct Volume {
    samples: Array3<f64>,
    grid: Grid,
    kind: PixelKind,
}

impl Volume {
    pub fn new(
        samples: Array3<f64>,
        origin: Point3<f64>,
        spacing: Vector3<f64>,
        direction: Matrix3<f64>,
        kind: PixelKind,
    ) -> Result<Self> {
        let (nx, ny, nz) = samples.dim();
        let grid = Grid::new([nx, ny, nz], origin, spacing, direction)?;
        Self::from_grid(grid, samples, kind)
    }

    /// Wraps `samples` on `grid`, quantizing them to `kind`.
    pub fn from_grid(grid: Grid, samples: Array3<f64>, kind: PixelKind) -> Result<Self> {
        let (nx, ny, nz) = samples.dim();
        if [nx, ny, nz] != grid.size {
            return Err(Error::ShapeMismatch {
                expected: grid.size,
                found: [nx, ny, nz],
            });
        }
        let samples = match kind {
            PixelKind::Label => samples.mapv_into(|v| kind.quantize(v)),
            PixelKind::Float => samples,
        };
        Ok(Self {
            samples,
            grid,
            kind,
        })
    }

    /// A volume on `grid` where every sample is `value`.
    pub fn filled(grid: Grid, value: f64, kind: PixelKind) -> Self {
        let [nx, ny, nz] = grid.size;
        Self {
            samples: Array3::from_elem((nx, ny, nz), kind.quantize(value)),
            grid,
            kind,
        }
    }

    pub fn samples(&self) -> &Array3<f64> {
        &self.samples
    }

    pub fn grid(&self) -> &Grid {
        &self.grid
    }

    pub fn kind(&self) -> PixelKind {
        self.kind
    }

    pub fn size(&self) -> [usize; 3] {
        self.grid.size
    }

    pub fn origin(&self) -> &Point3<f64> {
        &self.grid.origin
    }

    pub fn spacing(&self) -> &Vector3<f64> {
        &self.grid.spacing
    }

    pub fn direction(&self) -> &Matrix3<f64> {
        &self.grid.direction
    }

    /// Same geometry, new samples.
    pub fn with_samples(&self, samples: Array3<f64>, kind: PixelKind) -> Result<Volume> {
        Volume::from_grid(self.grid.clone(), samples, kind)
    }

    /// Reinterprets the samples as `kind`.
    pub fn cast(self, kind: PixelKind) -> Volume {
        if kind == self.kind {
            return self;
        }
        let samples = self.samples.mapv_into(|v| kind.quantize(v));
        Volume {
            samples,
            grid: self.grid,
            kind,
        }
    }

    /// Label volume holding 1 where `value >= threshold` and 0 elsewhere.
    pub fn binarize(&self, threshold: f64) -> Volume {
        Volume {
            samples: self
                .samples
                .mapv(|v| if v >= threshold { 1.0 } else { 0.0 }),
            grid: self.grid.clone(),
            kind: PixelKind::Label,
        }
    }

    /// Number of samples that are not zero.
    pub fn count_nonzero(&self) -> usize {
        self.samples.iter().filter(|v| **v != 0.0).count()
    }

    /// Copies the samples inside `[start, start + size)` with the matching
    /// sub-grid.
    pub fn region(&self, start: [usize; 3], size: [usize; 3]) -> Result<Volume> {
        let grid = self.grid.region(start, size)?;
        let samples = self
            .samples
            .slice(s![
                start[0]..start[0] + size[0],
                start[1]..start[1] + size[1],
                start[2]..start[2] + size[2]
            ])
            .to_owned();
        Ok(Volume {
            samples,
            grid,
            kind: self.kind,
        })
    }

    /// Pads every face with `padding` samples of `value`.
    pub fn padded(&self, padding: usize, value: f64) -> Volume {
        let grid = self.grid.padded(padding);
        let [nx, ny, nz] = grid.size;
        let mut samples = Array3::from_elem((nx, ny, nz), self.kind.quantize(value));
        let [sx, sy, sz] = self.grid.size;
        samples
            .slice_mut(s![
                padding..padding + sx,
                padding..padding + sy,
                padding..padding + sz
            ])
            .assign(&self.samples);
        Volume {
            samples,
            grid,
            kind: self.kind,
        }
    }
}
