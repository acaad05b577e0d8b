//! Loading volumes from disk and writing them back.
//!
//! Every input goes through [`load`], which picks a reader from the file name:
//! surface meshes are voxelized, volumetric files are read directly. Output is
//! always NIfTI.

use std::path::{Path, PathBuf};

use log::info;

use crate::error::{Error, Result};
use crate::volume::{PixelKind, Volume};

pub mod mesh;
pub mod nii;
pub mod nrrd;

/// File formats understood by [`load`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Format {
    /// Triangulated surface mesh (`.stl`).
    Mesh,
    /// NIfTI-1 (`.nii`, `.nii.gz`).
    Nifti,
    /// NRRD with attached or detached payload (`.nrrd`, `.nhdr`).
    Nrrd,
}

impl Format {
    /// Infers the format from the file name.
    pub fn from_path<P: AsRef<Path>>(path: P) -> Result<Format> {
        let path = path.as_ref();
        let name = path
            .file_name()
            .and_then(|n| n.to_str())
            .map(str::to_ascii_lowercase)
            .ok_or_else(|| Error::UnsupportedFormat(path.to_path_buf()))?;
        if name.ends_with(".stl") {
            Ok(Format::Mesh)
        } else if name.ends_with(".nii") || name.ends_with(".nii.gz") {
            Ok(Format::Nifti)
        } else if name.ends_with(".nrrd") || name.ends_with(".nhdr") {
            Ok(Format::Nrrd)
        } else {
            Err(Error::UnsupportedFormat(path.to_path_buf()))
        }
    }
}

/// Parameters of [`load`].
#[derive(Debug, Clone)]
pub struct LoadOptions {
    /// Kind the loaded samples are cast to.
    pub kind: PixelKind,
    /// Physical pitch used when voxelizing meshes.
    pub voxel_size: f64,
    /// Background samples added on every face of a voxelized mesh.
    pub padding: usize,
    /// Directory for intermediate files. A private temporary directory is
    /// used, and removed afterwards, when unset.
    pub scratch_dir: Option<PathBuf>,
}

impl Default for LoadOptions {
    fn default() -> Self {
        Self {
            kind: PixelKind::Float,
            voxel_size: 1.5,
            padding: 0,
            scratch_dir: None,
        }
    }
}

impl LoadOptions {
    pub fn new(kind: PixelKind) -> Self {
        Self {
            kind,
            ..Self::default()
        }
    }

    pub fn with_voxel_size(mut self, voxel_size: f64) -> Self {
        self.voxel_size = voxel_size;
        self
    }

    pub fn with_padding(mut self, padding: usize) -> Self {
        self.padding = padding;
        self
    }

    pub fn with_scratch_dir<P: Into<PathBuf>>(mut self, dir: P) -> Self {
        self.scratch_dir = Some(dir.into());
        self
    }
}

/// Reads a volume from `path`, dispatching on its [`Format`].
pub fn load<P: AsRef<Path>>(path: P, options: &LoadOptions) -> Result<Volume> {
    let path = path.as_ref();
    let format = Format::from_path(path)?;
    info!("Loading {} as {:?} ({:?})", path.display(), format, options.kind);
    let volume = match format {
        Format::Mesh => mesh::load_mesh_volume(path, options)?,
        Format::Nifti => nii::read_nifti(path, options.kind)?,
        Format::Nrrd => nrrd::read_nrrd(path)?.cast(options.kind),
    };
    log::debug!(
        "Loaded {}: size {:?}, spacing {:?}, origin {:?}",
        path.display(),
        volume.size(),
        volume.spacing().as_slice(),
        volume.origin().coords.as_slice()
    );
    Ok(volume)
}

/// Writes `volume` as NIfTI. Parent directories are created as needed.
pub fn save<P: AsRef<Path>>(volume: &Volume, path: P) -> Result<()> {
    let path = path.as_ref();
    if Format::from_path(path)? != Format::Nifti {
        return Err(Error::UnsupportedFormat(path.to_path_buf()));
    }
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }
    nii::write_nifti(volume, path)?;
    info!("Saved {}", path.display());
    Ok(())
}
