//! Mesh inputs: STL surfaces voxelized into label volumes.
//!
//! The voxelizer works in the mesh's own frame, which for bone surfaces
//! exported by segmentation tools is LPS. The resulting volume is presented
//! in RAS by negating the X and Y components of origin and direction.

use std::fs::File;
use std::io::BufReader;
use std::path::Path;

use nalgebra::{Matrix3, Point3, Vector3};
use tempfile::{Builder, TempDir};

use super::{nii, LoadOptions};
use crate::error::{Error, Result};
use crate::volume::{PixelKind, Volume};
use crate::voxelize::{voxelize, TriangleMesh};

/// Scratch space for one conversion, removed when dropped.
enum Scratch {
    /// Private directory owned by this conversion.
    Owned(TempDir),
    /// Uniquely named file inside a directory owned by the caller.
    Shared(tempfile::NamedTempFile),
}

impl Scratch {
    fn acquire(options: &LoadOptions) -> Result<Scratch> {
        let scratch = match &options.scratch_dir {
            Some(dir) => Scratch::Shared(
                Builder::new()
                    .prefix("mesh-")
                    .suffix(".nii")
                    .tempfile_in(dir)?,
            ),
            None => Scratch::Owned(Builder::new().prefix("volprep-").tempdir()?),
        };
        Ok(scratch)
    }

    fn path(&self) -> std::path::PathBuf {
        match self {
            Scratch::Owned(dir) => dir.path().join("mesh.nii"),
            Scratch::Shared(file) => file.path().to_path_buf(),
        }
    }
}

/// Voxelizes an STL file into a 0/1 volume in RAS.
pub fn mesh_to_volume(mesh: &TriangleMesh, voxel_size: f64, padding: usize) -> Result<Volume> {
    let voxels = voxelize(mesh, voxel_size)?;
    let lps_origin = voxels.origin();
    let flip = Vector3::new(-1.0, -1.0, 1.0);
    let volume = Volume::new(
        voxels.samples,
        Point3::from(lps_origin.coords.component_mul(&flip)),
        Vector3::repeat(voxel_size),
        Matrix3::from_diagonal(&flip),
        PixelKind::Label,
    )?;
    Ok(volume.padded(padding, 0.0))
}

/// Reads `path` as STL and voxelizes it per `options`.
///
/// The volume passes through an intermediate NIfTI file in scratch space, so
/// the result carries exactly the geometry a written volume would have.
pub fn load_mesh_volume(path: &Path, options: &LoadOptions) -> Result<Volume> {
    let mut reader = BufReader::new(File::open(path)?);
    let mesh = TriangleMesh::from_stl(&mut reader)?;
    if mesh.is_empty() {
        return Err(Error::EmptyMesh(path.to_path_buf()));
    }
    log::debug!("{}: {} triangles", path.display(), mesh.len());
    let volume = mesh_to_volume(&mesh, options.voxel_size, options.padding)?;

    let scratch = Scratch::acquire(options)?;
    let scratch_path = scratch.path();
    nii::write_nifti(&volume, &scratch_path)?;
    let volume = nii::read_nifti(&scratch_path, options.kind)?;
    drop(scratch);
    Ok(volume)
}
