//! Quick commandline utility to resample a NIfTI volume.
//!
//! Either zooms the volume on its own grid (`size * zoom` samples at
//! `spacing / zoom`) or reprojects it onto the grid of a reference file.

use std::path::PathBuf;

use anyhow::Context;
use clap::Parser;

use volprep::common::{check_output, exit_on_error, init_logger};
use volprep::{load, rescale, resample_like, save, Interpolation, LoadOptions, PixelKind, ResampleOptions};

// use clap to create commandline interface
#[derive(Parser, Debug)]
#[command(author, about, version, long_about)]
struct Args {
    /// the input volume
    input: PathBuf,

    /// the output NIfTI file
    output: PathBuf,

    /// zoom factor (<1 for downsampling and >1 for upsampling)
    #[arg(short, long, default_value_t = 2.0, conflicts_with = "reference")]
    zoom: f64,

    /// resample onto the grid of this volume instead of zooming
    #[arg(short, long)]
    reference: Option<PathBuf>,

    /// interpolation between samples
    #[arg(short, long, value_enum, default_value_t = Interpolation::Linear)]
    interpolation: Interpolation,

    /// value of output samples outside the input
    #[arg(short, long, default_value_t = 0.0, allow_negative_numbers = true)]
    default_value: f64,

    /// threshold the result at 0.5 into a 0/1 label mask
    #[arg(short, long)]
    binarize: bool,

    /// replace the output file if it exists
    #[arg(short, long)]
    force: bool,
}

fn run(cli: &Args) -> anyhow::Result<()> {
    check_output(&cli.output, cli.force)?;
    let volume = load(&cli.input, &LoadOptions::new(PixelKind::Float))
        .with_context(|| format!("failed to load {}", cli.input.display()))?;
    let options = ResampleOptions::new(cli.interpolation).with_default_value(cli.default_value);
    let resampled = match &cli.reference {
        Some(reference) => {
            let reference = load(reference, &LoadOptions::new(PixelKind::Float))
                .with_context(|| format!("failed to load {}", reference.display()))?;
            resample_like(&volume, &reference, &options)?
        }
        None => rescale(&volume, [cli.zoom; 3], &options)?,
    };
    let resampled = if cli.binarize {
        resampled.binarize(0.5)
    } else {
        resampled
    };
    save(&resampled, &cli.output)?;
    println!(
        "Resampled {:?} -> {:?}, saved to: {}",
        volume.size(),
        resampled.size(),
        cli.output.display()
    );
    Ok(())
}

fn main() {
    init_logger();
    let cli = Args::parse();
    exit_on_error(run(&cli));
}
