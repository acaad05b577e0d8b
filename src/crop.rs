//! Bounding boxes of foreground regions and cropping to them.

use nalgebra::Point3;

use crate::error::{Error, Result};
use crate::volume::{Grid, PixelKind, Volume};

/// Which samples of a label volume count as foreground.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ForegroundRule {
    /// Any non-zero sample.
    NonZero,
    /// Samples equal to one label code.
    Equals(f64),
    /// Samples `>= threshold`, for probability maps.
    AtLeast(f64),
}

impl ForegroundRule {
    #[inline]
    pub fn is_foreground(self, value: f64) -> bool {
        match self {
            ForegroundRule::NonZero => value != 0.0,
            ForegroundRule::Equals(label) => value == label,
            ForegroundRule::AtLeast(threshold) => value >= threshold,
        }
    }
}

/// Axis-aligned index region `[start, start + size)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BoundingBox {
    pub start: [usize; 3],
    pub size: [usize; 3],
}

impl BoundingBox {
    /// Last index inside the box on each axis.
    pub fn end(&self) -> [usize; 3] {
        [
            self.start[0] + self.size[0] - 1,
            self.start[1] + self.size[1] - 1,
            self.start[2] + self.size[2] - 1,
        ]
    }

    /// Grown by `padding` on every face, clamped to a grid of size `limit`.
    pub fn padded(&self, padding: usize, limit: [usize; 3]) -> BoundingBox {
        let mut start = [0; 3];
        let mut size = [0; 3];
        let end = self.end();
        for axis in 0..3 {
            start[axis] = self.start[axis].saturating_sub(padding);
            let last = (end[axis] + padding).min(limit[axis] - 1);
            size[axis] = last + 1 - start[axis];
        }
        BoundingBox { start, size }
    }

    /// Centre of the box in continuous index space.
    pub fn center_index(&self) -> Point3<f64> {
        let end = self.end();
        Point3::new(
            (self.start[0] + end[0]) as f64 / 2.0,
            (self.start[1] + end[1]) as f64 / 2.0,
            (self.start[2] + end[2]) as f64 / 2.0,
        )
    }

    /// Physical centre of the box on `grid`.
    pub fn physical_center(&self, grid: &Grid) -> Point3<f64> {
        grid.index_to_physical(&self.center_index())
    }
}

/// Parameters of [`crop_to_bbox`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CropOptions {
    pub rule: ForegroundRule,
    /// Float label volumes are binarized at this value before `rule` applies.
    pub threshold: f64,
    /// Samples added on every face of the box, clamped to the volume.
    pub padding: usize,
}

impl Default for CropOptions {
    fn default() -> Self {
        Self {
            rule: ForegroundRule::Equals(1.0),
            threshold: 0.5,
            padding: 0,
        }
    }
}

impl CropOptions {
    pub fn new(rule: ForegroundRule) -> Self {
        Self {
            rule,
            ..Self::default()
        }
    }

    pub fn with_threshold(mut self, threshold: f64) -> Self {
        self.threshold = threshold;
        self
    }

    pub fn with_padding(mut self, padding: usize) -> Self {
        self.padding = padding;
        self
    }
}

/// Smallest box holding every foreground sample of `volume`.
pub fn bounding_box(volume: &Volume, rule: ForegroundRule) -> Result<BoundingBox> {
    let mut min = [usize::MAX; 3];
    let mut max = [0usize; 3];
    let mut found = false;
    for ((i, j, k), v) in volume.samples().indexed_iter() {
        if rule.is_foreground(*v) {
            found = true;
            for (axis, idx) in [i, j, k].into_iter().enumerate() {
                min[axis] = min[axis].min(idx);
                max[axis] = max[axis].max(idx);
            }
        }
    }
    if !found {
        return Err(Error::EmptyForeground);
    }
    Ok(BoundingBox {
        start: min,
        size: [
            max[0] - min[0] + 1,
            max[1] - min[1] + 1,
            max[2] - min[2] + 1,
        ],
    })
}

/// Copies the samples inside `bbox`; the origin moves to the box's first
/// sample so the crop stays registered with its source.
pub fn crop(volume: &Volume, bbox: &BoundingBox) -> Result<Volume> {
    volume.region(bbox.start, bbox.size)
}

/// Crops `volume` to the foreground of `label`, which must have the same
/// grid size. A float `label` is binarized at the threshold first.
pub fn crop_to_bbox(volume: &Volume, label: &Volume, options: &CropOptions) -> Result<Volume> {
    if volume.size() != label.size() {
        return Err(Error::ShapeMismatch {
            expected: volume.size(),
            found: label.size(),
        });
    }
    let bbox = match label.kind() {
        PixelKind::Float => bounding_box(&label.binarize(options.threshold), options.rule)?,
        PixelKind::Label => bounding_box(label, options.rule)?,
    };
    let bbox = bbox.padded(options.padding, volume.size());
    log::info!(
        "Cropping {:?} to start {:?} size {:?}",
        volume.size(),
        bbox.start,
        bbox.size
    );
    crop(volume, &bbox)
}
