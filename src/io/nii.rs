//! NIfTI-1 reading and writing.

use std::path::Path;

use ::nifti::writer::WriterOptions;
use ::nifti::{IntoNdArray, NiftiHeader, NiftiObject, ReaderOptions};
use ndarray::{Axis, Ix3};

use crate::error::{Error, Result};
use crate::volume::{Grid, PixelKind, Volume};

/// NIfTI `xyzt_units` code for millimetres.
const UNITS_MM: u8 = 2;
/// NIfTI xform code "aligned to another scan".
const XFORM_ALIGNED: i16 = 2;

/// Reads a 3D NIfTI volume. A trailing singleton 4th axis is dropped.
pub fn read_nifti<P: AsRef<Path>>(path: P, kind: PixelKind) -> Result<Volume> {
    let obj = ReaderOptions::new().read_file(path.as_ref())?;
    let affine = obj.header().affine::<f64>();
    let img = obj.into_volume().into_ndarray::<f64>()?;
    let img = match img.ndim() {
        3 => img,
        4 if img.shape()[3] == 1 => img.index_axis_move(Axis(3), 0),
        n => {
            return Err(Error::InvalidGeometry(format!(
                "expected a 3D volume, found {n} dimensions"
            )))
        }
    };
    let samples = img
        .into_dimensionality::<Ix3>()
        .map_err(|e| Error::InvalidGeometry(e.to_string()))?;
    let (nx, ny, nz) = samples.dim();
    let grid = Grid::from_affine([nx, ny, nz], &affine)?;
    Volume::from_grid(grid, samples, kind)
}

/// Builds a header carrying the geometry of `grid`.
fn header_for(grid: &Grid) -> NiftiHeader {
    let mut header = NiftiHeader::default();
    header.set_affine(&grid.affine());
    header.sform_code = XFORM_ALIGNED;
    header.qform_code = XFORM_ALIGNED;
    for axis in 0..3 {
        header.pixdim[axis + 1] = grid.spacing()[axis] as f32;
    }
    header.xyzt_units = UNITS_MM;
    header
}

/// Writes `volume` with its geometry; labels as `uint8`, floats as `float32`.
/// A `.gz` suffix produces a compressed file.
pub fn write_nifti<P: AsRef<Path>>(volume: &Volume, path: P) -> Result<()> {
    let header = header_for(volume.grid());
    let writer = WriterOptions::new(path.as_ref()).reference_header(&header);
    match volume.kind() {
        PixelKind::Label => writer.write_nifti(&volume.samples().mapv(|v| v as u8))?,
        PixelKind::Float => writer.write_nifti(&volume.samples().mapv(|v| v as f32))?,
    }
    Ok(())
}
