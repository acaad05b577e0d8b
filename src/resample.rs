//! Reprojecting volumes onto other grids.
//!
//! Every output sample is mapped into the source volume's continuous index
//! space and evaluated with an [`Interpolator`]. Samples whose continuous
//! index falls outside `[-0.5, n - 0.5)` on any axis take the configured
//! default value.

use clap::ValueEnum;
use nalgebra::{Matrix3, Point3, Vector3};
use ndarray::{Array3, Axis};

use crate::error::Result;
use crate::volume::{Grid, PixelKind, Volume};

/// Interpolation used when evaluating a volume between its samples.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Interpolation {
    /// Closest sample; the only mode that never invents label codes.
    Nearest,
    /// Trilinear.
    Linear,
    /// Cubic B-spline on prefiltered coefficients.
    Bspline,
}

/// Parameters of [`resample`] and friends.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ResampleOptions {
    pub interpolation: Interpolation,
    /// Value for output samples outside the source support.
    pub default_value: f64,
    /// Kind of the output; the input's kind when unset.
    pub output_kind: Option<PixelKind>,
}

impl ResampleOptions {
    /// Options with a default value of 0 that keep the input's kind.
    pub fn new(interpolation: Interpolation) -> Self {
        Self {
            interpolation,
            default_value: 0.0,
            output_kind: None,
        }
    }

    pub fn with_default_value(mut self, default_value: f64) -> Self {
        self.default_value = default_value;
        self
    }

    pub fn with_output_kind(mut self, kind: PixelKind) -> Self {
        self.output_kind = Some(kind);
        self
    }
}

/// Evaluates a sample array at a continuous index.
pub trait Interpolator {
    /// `None` when `index` lies outside the array's support.
    fn sample(&self, index: &Point3<f64>) -> Option<f64>;
}

fn inside(shape: (usize, usize, usize), index: &Point3<f64>) -> bool {
    let n = [shape.0, shape.1, shape.2];
    (0..3).all(|axis| index[axis] >= -0.5 && index[axis] < n[axis] as f64 - 0.5)
}

pub struct NearestInterpolator<'a> {
    samples: &'a Array3<f64>,
}

impl<'a> NearestInterpolator<'a> {
    pub fn new(samples: &'a Array3<f64>) -> Self {
        Self { samples }
    }
}

impl Interpolator for NearestInterpolator<'_> {
    fn sample(&self, index: &Point3<f64>) -> Option<f64> {
        let shape = self.samples.dim();
        if !inside(shape, index) {
            return None;
        }
        let round = |c: f64, n: usize| ((c + 0.5).floor().max(0.0) as usize).min(n - 1);
        Some(
            self.samples[[
                round(index.x, shape.0),
                round(index.y, shape.1),
                round(index.z, shape.2),
            ]],
        )
    }
}

pub struct LinearInterpolator<'a> {
    samples: &'a Array3<f64>,
}

impl<'a> LinearInterpolator<'a> {
    pub fn new(samples: &'a Array3<f64>) -> Self {
        Self { samples }
    }
}

/// Lower neighbour, upper neighbour and weight of the upper one, clamped to
/// the array.
#[inline]
fn linear_taps(c: f64, n: usize) -> (usize, usize, f64) {
    let lower = (c.floor().max(0.0) as usize).min(n - 1);
    let upper = (lower + 1).min(n - 1);
    (lower, upper, (c - lower as f64).clamp(0.0, 1.0))
}

impl Interpolator for LinearInterpolator<'_> {
    fn sample(&self, index: &Point3<f64>) -> Option<f64> {
        let shape = self.samples.dim();
        if !inside(shape, index) {
            return None;
        }
        let (x0, x1, fx) = linear_taps(index.x, shape.0);
        let (y0, y1, fy) = linear_taps(index.y, shape.1);
        let (z0, z1, fz) = linear_taps(index.z, shape.2);
        let s = self.samples;
        let lerp = |a: f64, b: f64, f: f64| a + (b - a) * f;
        let c00 = lerp(s[[x0, y0, z0]], s[[x1, y0, z0]], fx);
        let c10 = lerp(s[[x0, y1, z0]], s[[x1, y1, z0]], fx);
        let c01 = lerp(s[[x0, y0, z1]], s[[x1, y0, z1]], fx);
        let c11 = lerp(s[[x0, y1, z1]], s[[x1, y1, z1]], fx);
        Some(lerp(lerp(c00, c10, fy), lerp(c01, c11, fy), fz))
    }
}

/// Cubic B-spline interpolation with mirror boundaries.
///
/// The samples are converted to spline coefficients once, so evaluating at
/// an integer index returns the original sample.
pub struct BSplineInterpolator {
    coefficients: Array3<f64>,
}

/// Pole of the cubic B-spline prefilter.
const CUBIC_POLE: f64 = -0.267_949_192_431_122_7; // sqrt(3) - 2
const PREFILTER_TOLERANCE: f64 = 1e-12;

impl BSplineInterpolator {
    pub fn new(samples: &Array3<f64>) -> Self {
        let mut coefficients = samples.clone();
        for axis in 0..3 {
            let mut line = Vec::with_capacity(coefficients.len_of(Axis(axis)));
            for mut lane in coefficients.lanes_mut(Axis(axis)) {
                line.clear();
                line.extend(lane.iter().copied());
                prefilter_line(&mut line);
                for (dst, src) in lane.iter_mut().zip(&line) {
                    *dst = *src;
                }
            }
        }
        Self { coefficients }
    }
}

/// In-place recursive conversion of samples to cubic B-spline coefficients.
fn prefilter_line(c: &mut [f64]) {
    let n = c.len();
    if n < 2 {
        return;
    }
    let z = CUBIC_POLE;
    let gain = (1.0 - z) * (1.0 - 1.0 / z);
    for v in c.iter_mut() {
        *v *= gain;
    }

    let horizon = (PREFILTER_TOLERANCE.ln() / z.abs().ln()).ceil() as usize;
    c[0] = if horizon < n {
        let mut zn = z;
        let mut sum = c[0];
        for v in &c[1..horizon] {
            sum += zn * v;
            zn *= z;
        }
        sum
    } else {
        let mut zn = z;
        let iz = 1.0 / z;
        let mut z2n = z.powi(n as i32 - 1);
        let mut sum = c[0] + z2n * c[n - 1];
        z2n *= z2n * iz;
        for v in &c[1..n - 1] {
            sum += (zn + z2n) * v;
            zn *= z;
            z2n *= iz;
        }
        sum / (1.0 - zn * zn)
    };
    for k in 1..n {
        c[k] += z * c[k - 1];
    }
    c[n - 1] = (z / (z * z - 1.0)) * (z * c[n - 2] + c[n - 1]);
    for k in (0..n - 1).rev() {
        c[k] = z * (c[k + 1] - c[k]);
    }
}

/// Reflects `i` into `0..n` without repeating the edge sample.
#[inline]
fn mirror(i: i64, n: usize) -> usize {
    if n == 1 {
        return 0;
    }
    let period = 2 * (n as i64 - 1);
    let i = i.rem_euclid(period);
    if i >= n as i64 {
        (period - i) as usize
    } else {
        i as usize
    }
}

/// First tap and the four cubic B-spline weights around `c`.
#[inline]
fn cubic_taps(c: f64) -> (i64, [f64; 4]) {
    let base = c.floor();
    let t = c - base;
    let u = 1.0 - t;
    let weights = [
        u * u * u / 6.0,
        2.0 / 3.0 - t * t + 0.5 * t * t * t,
        2.0 / 3.0 - u * u + 0.5 * u * u * u,
        t * t * t / 6.0,
    ];
    (base as i64 - 1, weights)
}

impl Interpolator for BSplineInterpolator {
    fn sample(&self, index: &Point3<f64>) -> Option<f64> {
        let shape = self.coefficients.dim();
        if !inside(shape, index) {
            return None;
        }
        let (bx, wx) = cubic_taps(index.x);
        let (by, wy) = cubic_taps(index.y);
        let (bz, wz) = cubic_taps(index.z);
        let mut value = 0.0;
        for (c, wzc) in wz.iter().enumerate() {
            let k = mirror(bz + c as i64, shape.2);
            for (b, wyb) in wy.iter().enumerate() {
                let j = mirror(by + b as i64, shape.1);
                let mut row = 0.0;
                for (a, wxa) in wx.iter().enumerate() {
                    row += wxa * self.coefficients[[mirror(bx + a as i64, shape.0), j, k]];
                }
                value += wzc * wyb * row;
            }
        }
        Some(value)
    }
}

fn interpolator_for<'a>(
    volume: &'a Volume,
    interpolation: Interpolation,
) -> Box<dyn Interpolator + 'a> {
    match interpolation {
        Interpolation::Nearest => Box::new(NearestInterpolator::new(volume.samples())),
        Interpolation::Linear => Box::new(LinearInterpolator::new(volume.samples())),
        Interpolation::Bspline => Box::new(BSplineInterpolator::new(volume.samples())),
    }
}

/// Fills `grid` with `volume` evaluated at `m * index + t`.
fn resample_mapped(
    volume: &Volume,
    grid: &Grid,
    m: Matrix3<f64>,
    t: Vector3<f64>,
    options: &ResampleOptions,
) -> Result<Volume> {
    let kind = options.output_kind.unwrap_or(volume.kind());
    let interpolator = interpolator_for(volume, options.interpolation);
    let [nx, ny, nz] = grid.size();
    let samples = Array3::from_shape_fn((nx, ny, nz), |(i, j, k)| {
        let index = Point3::from(m * Vector3::new(i as f64, j as f64, k as f64) + t);
        interpolator
            .sample(&index)
            .unwrap_or(options.default_value)
    });
    Volume::from_grid(grid.clone(), samples, kind)
}

/// Reprojects `volume` onto `grid`.
///
/// Resampling onto the volume's own grid returns its samples unchanged.
pub fn resample(volume: &Volume, grid: &Grid, options: &ResampleOptions) -> Result<Volume> {
    let kind = options.output_kind.unwrap_or(volume.kind());
    if grid.coincides_with(volume.grid()) {
        return volume.with_samples(volume.samples().clone(), kind);
    }
    log::info!(
        "Resampling {:?} -> {:?} ({:?}, default {})",
        volume.size(),
        grid.size(),
        options.interpolation,
        options.default_value
    );
    let (m, t) = grid.index_map_to(volume.grid());
    resample_mapped(volume, grid, m, t, options)
}

/// Reprojects `volume` onto the grid of `reference`.
pub fn resample_like(volume: &Volume, reference: &Volume, options: &ResampleOptions) -> Result<Volume> {
    resample(volume, reference.grid(), options)
}

/// Resamples by `factor` per axis: `round(size * factor)` samples at
/// `spacing / factor`, origin and direction unchanged.
pub fn rescale(volume: &Volume, factor: [f64; 3], options: &ResampleOptions) -> Result<Volume> {
    let grid = volume.grid().rescaled(factor)?;
    resample(volume, &grid, options)
}

/// Moves the content by `shift` voxels on the volume's own grid:
/// `out[i] = in(i - shift)`.
pub fn translate(volume: &Volume, shift: [f64; 3], options: &ResampleOptions) -> Result<Volume> {
    log::info!("Shifting {:?} by {:?} voxels", volume.size(), shift);
    let t = -Vector3::from(shift);
    resample_mapped(volume, volume.grid(), Matrix3::identity(), t, options)
}
