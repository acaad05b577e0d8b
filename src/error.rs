//! Error type shared by every stage of the pipeline.

use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("unsupported file type: {}", .0.display())]
    UnsupportedFormat(PathBuf),

    #[error("no foreground voxels found in label volume")]
    EmptyForeground,

    #[error("grid mismatch: expected {expected:?}, found {found:?}")]
    ShapeMismatch {
        expected: [usize; 3],
        found: [usize; 3],
    },

    #[error("spacing must be strictly positive, got {0:?}")]
    InvalidSpacing([f64; 3]),

    #[error("invalid geometry: {0}")]
    InvalidGeometry(String),

    #[error("invalid parameter: {0}")]
    InvalidParameter(String),

    #[error("mask has no surface voxels, Hausdorff distance is undefined")]
    EmptySurface,

    #[error("mesh {} contains no triangles", .0.display())]
    EmptyMesh(PathBuf),

    #[error("NRRD error: {0}")]
    Nrrd(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("NIfTI error: {0}")]
    Nifti(#[from] nifti::error::NiftiError),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
