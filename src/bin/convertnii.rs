//! Quick commandline utility to convert a CT scan or surface mesh to NIfTI.
//!
//! NRRD and NIfTI inputs are read with their geometry; STL meshes are
//! voxelized at the requested pitch and presented in RAS.

use std::path::PathBuf;

use anyhow::Context;
use clap::Parser;

use volprep::common::{check_output, exit_on_error, init_logger, volume_stem};
use volprep::{load, save, LoadOptions, PixelKind};

// use clap to create commandline interface
#[derive(Parser, Debug)]
#[command(author, about, version, long_about)]
struct Args {
    /// the input file (.nrrd, .nii, .nii.gz or .stl)
    input: PathBuf,

    /// the output NIfTI file. Defaults to <input name>.nii.gz next to the input
    output: Option<PathBuf>,

    /// how samples are stored: label (uint8) or float (float32)
    #[arg(short, long, value_enum, default_value_t = PixelKind::Float)]
    kind: PixelKind,

    /// voxel size in mm used when voxelizing a mesh
    #[arg(short, long, default_value_t = 1.5)]
    voxel_size: f64,

    /// background voxels added on every face of a voxelized mesh
    #[arg(short, long, default_value_t = 0)]
    padding: usize,

    /// replace the output file if it exists
    #[arg(short, long)]
    force: bool,
}

fn run(cli: &Args) -> anyhow::Result<()> {
    let output = cli.output.clone().unwrap_or_else(|| {
        cli.input
            .with_file_name(format!("{}.nii.gz", volume_stem(&cli.input)))
    });
    check_output(&output, cli.force)?;

    let options = LoadOptions::new(cli.kind)
        .with_voxel_size(cli.voxel_size)
        .with_padding(cli.padding);
    let volume = load(&cli.input, &options)
        .with_context(|| format!("failed to load {}", cli.input.display()))?;
    save(&volume, &output).with_context(|| format!("failed to write {}", output.display()))?;
    println!(
        "Converted {} -> {} (size {:?}, spacing {:?})",
        cli.input.display(),
        output.display(),
        volume.size(),
        volume.spacing().as_slice()
    );
    Ok(())
}

fn main() {
    init_logger();
    let cli = Args::parse();
    exit_on_error(run(&cli));
}
