//! Quick commandline utility to prepare a CT and a low resolution mask for
//! nnU-Net inference.
//!
//! The mask is cropped to its own bounding box plus padding and the CT is
//! resampled onto the cropped grid so both line up voxel for voxel.

use std::path::PathBuf;

use anyhow::Context;
use clap::Parser;

use volprep::common::{check_output, exit_on_error, init_logger};
use volprep::pipeline::{prepare_inference_case, AIR_HU};
use volprep::{load, save, LoadOptions, PixelKind};

// use clap to create commandline interface
#[derive(Parser, Debug)]
#[command(author, about, version, long_about)]
struct Args {
    /// the full-size CT
    input_ct: PathBuf,

    /// the full-size low resolution segmentation
    input_low_res: PathBuf,

    /// where to save the cropped CT
    output_ct: PathBuf,

    /// where to save the cropped low resolution mask
    output_low_res: PathBuf,

    /// voxels of margin around the mask's bounding box
    #[arg(short, long, default_value_t = 4)]
    padding: usize,

    /// value of CT samples outside the scanned volume
    #[arg(short, long, default_value_t = AIR_HU, allow_negative_numbers = true)]
    default_value: f64,

    /// voxel size in mm used when the mask is given as a mesh
    #[arg(short, long, default_value_t = 1.5)]
    voxel_size: f64,

    /// replace the output files if they exist
    #[arg(short, long)]
    force: bool,
}

fn run(cli: &Args) -> anyhow::Result<()> {
    check_output(&cli.output_ct, cli.force)?;
    check_output(&cli.output_low_res, cli.force)?;
    println!("Loading images...");
    let ct = load(&cli.input_ct, &LoadOptions::new(PixelKind::Float))
        .with_context(|| format!("failed to load {}", cli.input_ct.display()))?;
    let low_res = load(
        &cli.input_low_res,
        &LoadOptions::new(PixelKind::Float).with_voxel_size(cli.voxel_size),
    )
    .with_context(|| format!("failed to load {}", cli.input_low_res.display()))?;

    println!("Resampling CT to match low-res mask grid...");
    let (ct, low_res) = prepare_inference_case(&ct, &low_res, cli.padding, cli.default_value)?;
    save(&ct, &cli.output_ct)?;
    save(&low_res, &cli.output_low_res)?;
    println!("Cropped CT saved to: {}", cli.output_ct.display());
    println!("Cropped low-res mask saved to: {}", cli.output_low_res.display());
    Ok(())
}

fn main() {
    init_logger();
    let cli = Args::parse();
    exit_on_error(run(&cli));
}
