//! Quick commandline utility to refine a blocky segmentation mask.
//!
//! The mask is upsampled by the zoom factor with nearest neighbour, blurred
//! with a Gaussian and thresholded at 0.5. With a zoom of 1 this is plain
//! smoothing of the mask on its own grid.

use std::path::PathBuf;

use anyhow::Context;
use clap::Parser;

use volprep::common::{check_output, exit_on_error, init_logger};
use volprep::refine::refine_with;
use volprep::{load, save, LoadOptions, PixelKind, RefineOptions};

// use clap to create commandline interface
#[derive(Parser, Debug)]
#[command(author, about, version, long_about)]
struct Args {
    /// the input segmentation mask
    input: PathBuf,

    /// the output NIfTI mask
    output: PathBuf,

    /// upsampling factor
    #[arg(short, long, default_value_t = 1.0)]
    zoom: f64,

    /// Gaussian sigma in output voxels. Defaults to 1.5 * zoom; 0 disables the blur
    #[arg(short, long)]
    sigma: Option<f64>,

    /// smoothed samples at or above this value become foreground
    #[arg(short, long, default_value_t = 0.5)]
    threshold: f64,

    /// replace the output file if it exists
    #[arg(short, long)]
    force: bool,
}

fn run(cli: &Args) -> anyhow::Result<()> {
    check_output(&cli.output, cli.force)?;
    let mask = load(&cli.input, &LoadOptions::new(PixelKind::Float))
        .with_context(|| format!("failed to load {}", cli.input.display()))?;
    let mut options = RefineOptions::new(cli.zoom).with_threshold(cli.threshold);
    if let Some(sigma) = cli.sigma {
        options = options.with_sigma(sigma);
    }
    let refined = refine_with(&mask, &options)?;
    save(&refined, &cli.output)?;
    println!(
        "Refined segmentation ({} foreground voxels) saved to: {}",
        refined.count_nonzero(),
        cli.output.display()
    );
    Ok(())
}

fn main() {
    init_logger();
    let cli = Args::parse();
    exit_on_error(run(&cli));
}
