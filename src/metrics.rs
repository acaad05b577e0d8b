//! Overlap and surface-distance metrics between binary masks.

use std::fmt;

use ndarray::{Array3, Axis, Zip};

use crate::error::{Error, Result};
use crate::resample::{resample, Interpolation, ResampleOptions};
use crate::volume::{PixelKind, Volume};

/// Squared distance standing in for "no surface on this line yet".
const FAR: f64 = 1e30;

/// Dice similarity coefficient `2 |A ∩ B| / (|A| + |B|)` of the non-zero
/// samples. Two empty masks agree perfectly.
pub fn dice(a: &Volume, b: &Volume) -> Result<f64> {
    ensure_same_size(a, b)?;
    let mut both = 0usize;
    let mut total = 0usize;
    Zip::from(a.samples()).and(b.samples()).for_each(|x, y| {
        let (x, y) = (*x != 0.0, *y != 0.0);
        total += x as usize + y as usize;
        both += (x && y) as usize;
    });
    if total == 0 {
        return Ok(1.0);
    }
    Ok(2.0 * both as f64 / total as f64)
}

fn ensure_same_size(a: &Volume, b: &Volume) -> Result<()> {
    if a.size() != b.size() {
        return Err(Error::ShapeMismatch {
            expected: a.size(),
            found: b.size(),
        });
    }
    Ok(())
}

/// Foreground samples with a background face neighbour, or on the array border.
pub fn surface(mask: &Array3<f64>) -> Array3<bool> {
    let (nx, ny, nz) = mask.dim();
    Array3::from_shape_fn((nx, ny, nz), |(i, j, k)| {
        if mask[[i, j, k]] == 0.0 {
            return false;
        }
        if i == 0 || j == 0 || k == 0 || i + 1 == nx || j + 1 == ny || k + 1 == nz {
            return true;
        }
        mask[[i - 1, j, k]] == 0.0
            || mask[[i + 1, j, k]] == 0.0
            || mask[[i, j - 1, k]] == 0.0
            || mask[[i, j + 1, k]] == 0.0
            || mask[[i, j, k - 1]] == 0.0
            || mask[[i, j, k + 1]] == 0.0
    })
}

/// One pass of the lower-envelope squared distance transform along a line
/// whose samples are `step` apart.
fn distance_transform_line(f: &[f64], step: f64, out: &mut [f64], v: &mut [usize], z: &mut [f64]) {
    let n = f.len();
    let pos = |q: usize| q as f64 * step;
    let intersect = |q: usize, p: usize| {
        ((f[q] + pos(q) * pos(q)) - (f[p] + pos(p) * pos(p))) / (2.0 * (pos(q) - pos(p)))
    };
    let mut k = 0;
    v[0] = 0;
    z[0] = f64::NEG_INFINITY;
    z[1] = f64::INFINITY;
    for q in 1..n {
        let mut s = intersect(q, v[k]);
        while s <= z[k] {
            k -= 1;
            s = intersect(q, v[k]);
        }
        k += 1;
        v[k] = q;
        z[k] = s;
        z[k + 1] = f64::INFINITY;
    }
    k = 0;
    for (q, d) in out.iter_mut().enumerate() {
        while z[k + 1] < pos(q) {
            k += 1;
        }
        let offset = pos(q) - pos(v[k]);
        *d = offset * offset + f[v[k]];
    }
}

/// Squared physical distance from every sample to the nearest `true` sample.
pub fn squared_distance_map(features: &Array3<bool>, spacing: [f64; 3]) -> Array3<f64> {
    let mut map = features.mapv(|f| if f { 0.0 } else { FAR });
    for (axis, step) in spacing.iter().enumerate() {
        let n = map.len_of(Axis(axis));
        let mut line = vec![0.0; n];
        let mut v = vec![0usize; n];
        let mut z = vec![0.0; n + 1];
        for mut lane in map.lanes_mut(Axis(axis)) {
            line.iter_mut().zip(lane.iter()).for_each(|(d, s)| *d = *s);
            let mut out = vec![0.0; n];
            distance_transform_line(&line, *step, &mut out, &mut v, &mut z);
            lane.iter_mut().zip(&out).for_each(|(d, s)| *d = *s);
        }
    }
    map
}

/// Largest distance from a surface sample of `from` to the surface of `to`.
fn directed_hausdorff(from: &Array3<bool>, to: &Array3<bool>, spacing: [f64; 3]) -> f64 {
    let distances = squared_distance_map(to, spacing);
    Zip::from(from)
        .and(&distances)
        .fold(0.0f64, |acc, f, d| if *f { acc.max(*d) } else { acc })
        .sqrt()
}

/// Symmetric Hausdorff distance between the surfaces of two masks on the
/// same grid, in physical units.
pub fn hausdorff(a: &Volume, b: &Volume) -> Result<f64> {
    ensure_same_size(a, b)?;
    let sa = surface(a.samples());
    let sb = surface(b.samples());
    if !sa.iter().any(|s| *s) || !sb.iter().any(|s| *s) {
        return Err(Error::EmptySurface);
    }
    let spacing = a.spacing();
    let spacing = [spacing.x, spacing.y, spacing.z];
    Ok(directed_hausdorff(&sa, &sb, spacing).max(directed_hausdorff(&sb, &sa, spacing)))
}

/// Parameters of [`compare`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CompareOptions {
    /// Used to bring the prediction onto the ground truth grid.
    pub interpolation: Interpolation,
    /// Samples `>= threshold` are foreground.
    pub threshold: f64,
}

impl Default for CompareOptions {
    fn default() -> Self {
        Self {
            interpolation: Interpolation::Nearest,
            threshold: 0.5,
        }
    }
}

/// Agreement between a ground truth and a prediction.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Comparison {
    pub dice: f64,
    /// `None` when either mask has no surface.
    pub hausdorff: Option<f64>,
}

impl fmt::Display for Comparison {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Dice: {:.4}, Hausdorff: ", self.dice)?;
        match self.hausdorff {
            Some(distance) => write!(f, "{distance:.4}"),
            None => write!(f, "undefined"),
        }
    }
}

/// Whether the physical extents of two volumes intersect at all.
fn extents_overlap(a: &Volume, b: &Volume) -> bool {
    let (amin, amax) = a.grid().physical_bounds();
    let (bmin, bmax) = b.grid().physical_bounds();
    let margin = a.spacing().amax().max(b.spacing().amax()) / 2.0;
    (0..3).all(|axis| amin[axis] - margin <= bmax[axis] && bmin[axis] - margin <= amax[axis])
}

/// Resamples `predicted` onto `ground_truth`'s grid, binarizes both and
/// measures their Dice coefficient and Hausdorff distance.
pub fn compare(ground_truth: &Volume, predicted: &Volume, options: &CompareOptions) -> Result<Comparison> {
    if !extents_overlap(ground_truth, predicted) {
        return Err(Error::ShapeMismatch {
            expected: ground_truth.size(),
            found: predicted.size(),
        });
    }
    let resample_options = ResampleOptions::new(options.interpolation).with_output_kind(PixelKind::Float);
    let predicted = resample(predicted, ground_truth.grid(), &resample_options)?.binarize(options.threshold);
    let ground_truth = ground_truth.binarize(options.threshold);
    let hausdorff = match hausdorff(&ground_truth, &predicted) {
        Ok(distance) => Some(distance),
        Err(Error::EmptySurface) => {
            log::warn!("an empty mask has no surface, Hausdorff distance is undefined");
            None
        }
        Err(e) => return Err(e),
    };
    let comparison = Comparison {
        dice: dice(&ground_truth, &predicted)?,
        hausdorff,
    };
    log::debug!("{comparison}");
    Ok(comparison)
}
