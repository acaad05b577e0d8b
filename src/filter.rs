//! Separable Gaussian smoothing.

use ndarray::{Array3, Axis};

use crate::error::Result;
use crate::volume::{PixelKind, Volume};

/// Kernel half-width in units of sigma.
const TRUNCATE: f64 = 4.0;

/// Gaussian blur with a per-axis sigma given in voxels.
///
/// Each axis is convolved with a normalized 1D kernel of radius
/// `ceil(4 * sigma)`. Borders are reflected about the edge sample
/// (`d c b a | a b c d | d c b a`). Axes with `sigma <= 0` are left alone.
#[derive(Debug, Clone, PartialEq)]
pub struct GaussianFilter {
    sigmas: [f64; 3],
}

impl GaussianFilter {
    pub fn new(sigmas: [f64; 3]) -> Self {
        Self { sigmas }
    }

    pub fn isotropic(sigma: f64) -> Self {
        Self::new([sigma; 3])
    }

    /// Smooths the samples of `volume`; the result is always [`PixelKind::Float`].
    pub fn apply(&self, volume: &Volume) -> Result<Volume> {
        volume.with_samples(self.apply_array(volume.samples()), PixelKind::Float)
    }

    pub fn apply_array(&self, input: &Array3<f64>) -> Array3<f64> {
        let mut data = input.clone();
        for axis in 0..3 {
            let sigma = self.sigmas[axis];
            if sigma <= 1e-6 {
                continue;
            }
            let kernel = kernel(sigma);
            let radius = (kernel.len() / 2) as i64;
            let n = data.len_of(Axis(axis));
            let mut line = vec![0.0; n];
            for mut lane in data.lanes_mut(Axis(axis)) {
                line.iter_mut().zip(lane.iter()).for_each(|(d, s)| *d = *s);
                for (i, out) in lane.iter_mut().enumerate() {
                    *out = kernel
                        .iter()
                        .enumerate()
                        .map(|(k, w)| w * line[reflect(i as i64 + k as i64 - radius, n)])
                        .sum();
                }
            }
        }
        data
    }
}

/// Normalized Gaussian taps for `sigma`.
fn kernel(sigma: f64) -> Vec<f64> {
    let radius = (TRUNCATE * sigma).ceil() as usize;
    let two_sigma2 = 2.0 * sigma * sigma;
    let mut taps: Vec<f64> = (0..=2 * radius)
        .map(|i| {
            let x = i as f64 - radius as f64;
            (-x * x / two_sigma2).exp()
        })
        .collect();
    let sum: f64 = taps.iter().sum();
    for w in &mut taps {
        *w /= sum;
    }
    taps
}

#[inline]
fn reflect(i: i64, n: usize) -> usize {
    let period = 2 * n as i64;
    let i = i.rem_euclid(period);
    if i >= n as i64 {
        (period - 1 - i) as usize
    } else {
        i as usize
    }
}
