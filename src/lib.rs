//! Preparation of CT volumes, bone surface meshes and segmentation masks for
//! nnU-Net training and inference.
//!
//! The pipeline loads a [`Volume`] from a mesh or volumetric file, resamples
//! it onto another grid, crops it to a foreground box and finally writes it
//! back, smooths it or scores it against a ground truth.

pub mod common;
pub mod crop;
pub mod dataset;
pub mod error;
pub mod filter;
pub mod io;
pub mod metrics;
pub mod pipeline;
pub mod refine;
pub mod resample;
pub mod volume;
pub mod voxelize;

pub use crop::{bounding_box, crop, crop_to_bbox, BoundingBox, CropOptions, ForegroundRule};
pub use error::{Error, Result};
pub use io::{load, save, Format, LoadOptions};
pub use metrics::{compare, dice, hausdorff, CompareOptions, Comparison};
pub use refine::{refine, RefineOptions};
pub use resample::{resample, resample_like, rescale, translate, Interpolation, ResampleOptions};
pub use volume::{Grid, PixelKind, Volume};
