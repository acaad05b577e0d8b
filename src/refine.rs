//! Smoothing blocky masks: upsample, blur, re-threshold.

use crate::error::{Error, Result};
use crate::filter::GaussianFilter;
use crate::resample::{rescale, Interpolation, ResampleOptions};
use crate::volume::{PixelKind, Volume};

/// Sigma of the blur per unit of zoom, in output voxels.
pub const SIGMA_PER_ZOOM: f64 = 1.5;

/// Parameters of [`refine_with`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RefineOptions {
    /// Upsampling factor applied to every axis.
    pub zoom: f64,
    /// Blur sigma in output voxels; `SIGMA_PER_ZOOM * zoom` when unset.
    /// Values `<= 0` skip the blur.
    pub sigma: Option<f64>,
    /// Smoothed samples `>= threshold` become foreground.
    pub threshold: f64,
}

impl Default for RefineOptions {
    fn default() -> Self {
        Self {
            zoom: 1.0,
            sigma: None,
            threshold: 0.5,
        }
    }
}

impl RefineOptions {
    pub fn new(zoom: f64) -> Self {
        Self {
            zoom,
            ..Self::default()
        }
    }

    pub fn with_sigma(mut self, sigma: f64) -> Self {
        self.sigma = Some(sigma);
        self
    }

    pub fn with_threshold(mut self, threshold: f64) -> Self {
        self.threshold = threshold;
        self
    }

    pub fn effective_sigma(&self) -> f64 {
        self.sigma.unwrap_or(SIGMA_PER_ZOOM * self.zoom)
    }
}

/// Upsamples `mask` by `zoom` with nearest neighbour, blurs with
/// `sigma = 1.5 * zoom` voxels and re-binarizes at 0.5.
pub fn refine(mask: &Volume, zoom: f64) -> Result<Volume> {
    refine_with(mask, &RefineOptions::new(zoom))
}

pub fn refine_with(mask: &Volume, options: &RefineOptions) -> Result<Volume> {
    if !options.zoom.is_finite() || options.zoom <= 0.0 {
        return Err(Error::InvalidParameter(format!(
            "zoom factor must be positive, got {}",
            options.zoom
        )));
    }
    let upsampled = rescale(
        mask,
        [options.zoom; 3],
        &ResampleOptions::new(Interpolation::Nearest).with_output_kind(PixelKind::Float),
    )?;
    smooth_mask(&upsampled, options.effective_sigma(), options.threshold)
}

/// Blurs `mask` with `sigma` voxels, then thresholds it into a 0/1 label.
pub fn smooth_mask(mask: &Volume, sigma: f64, threshold: f64) -> Result<Volume> {
    log::info!(
        "Smoothing {:?} with sigma {} voxels, threshold {}",
        mask.size(),
        sigma,
        threshold
    );
    let blurred = if sigma > 0.0 {
        GaussianFilter::isotropic(sigma).apply(mask)?
    } else {
        mask.clone()
    };
    Ok(blurred.binarize(threshold))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::volume::Grid;
    use ndarray::Array3;

    fn block(size: usize, lo: usize, hi: usize) -> Volume {
        let grid = Grid::axis_aligned([size; 3], [0.0; 3], [2.0; 3]).unwrap();
        let samples = Array3::from_shape_fn((size, size, size), |(i, j, k)| {
            if [i, j, k].iter().all(|c| (lo..hi).contains(c)) {
                1.0
            } else {
                0.0
            }
        });
        Volume::from_grid(grid, samples, PixelKind::Label).unwrap()
    }

    #[test]
    fn refine_doubles_resolution_and_keeps_extent() {
        let mask = block(12, 2, 10);
        let refined = refine(&mask, 2.0).unwrap();
        assert_eq!(refined.size(), [24, 24, 24]);
        assert_eq!(refined.spacing()[0], 1.0);
        assert_eq!(refined.origin(), mask.origin());
        assert_eq!(refined.kind(), PixelKind::Label);
        assert!(refined.samples().iter().all(|v| *v == 0.0 || *v == 1.0));
        // deep inside stays foreground, far outside stays background
        assert_eq!(refined.samples()[[10, 10, 10]], 1.0);
        assert_eq!(refined.samples()[[0, 0, 0]], 0.0);
    }

    #[test]
    fn smoothing_rounds_off_corners() {
        let mask = block(12, 3, 9).cast(PixelKind::Float);
        let smooth = smooth_mask(&mask, 1.5, 0.5).unwrap();
        assert_eq!(smooth.samples()[[3, 3, 3]], 0.0);
        assert_eq!(smooth.samples()[[6, 6, 6]], 1.0);
        assert!(smooth.count_nonzero() < mask.count_nonzero());
    }

    #[test]
    fn zero_sigma_only_thresholds() {
        let mask = block(6, 1, 4);
        let out = smooth_mask(&mask, 0.0, 0.5).unwrap();
        assert_eq!(out.samples(), mask.samples());
    }

    #[test]
    fn zoom_must_be_positive() {
        let mask = block(4, 1, 3);
        assert!(matches!(refine(&mask, 0.0), Err(Error::InvalidParameter(_))));
    }

    #[test]
    fn default_sigma_follows_zoom() {
        assert_eq!(RefineOptions::new(2.0).effective_sigma(), 3.0);
        assert_eq!(RefineOptions::new(2.0).with_sigma(0.5).effective_sigma(), 0.5);
    }
}
