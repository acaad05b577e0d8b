//! Quick commandline utility to shift a NIfTI volume by a fractional number
//! of voxels on its own grid.

use std::path::PathBuf;

use anyhow::Context;
use clap::Parser;

use volprep::common::{check_output, exit_on_error, init_logger};
use volprep::{load, save, translate, Interpolation, LoadOptions, PixelKind, ResampleOptions};

// use clap to create commandline interface
#[derive(Parser, Debug)]
#[command(author, about, version, long_about)]
struct Args {
    /// the input volume
    input: PathBuf,

    /// the output NIfTI file
    output: PathBuf,

    /// shift in voxels along each axis, e.g. `--shift 0.5 0 0`
    #[arg(short, long, num_args = 3, required = true, allow_negative_numbers = true,
          value_names = ["SHIFT_X", "SHIFT_Y", "SHIFT_Z"])]
    shift: Vec<f64>,

    /// linear for intensities, nearest for labels
    #[arg(short, long, value_enum, default_value_t = Interpolation::Linear)]
    interpolation: Interpolation,

    /// value of samples shifted in from outside
    #[arg(short, long, default_value_t = 0.0, allow_negative_numbers = true)]
    default_value: f64,

    /// replace the output file if it exists
    #[arg(short, long)]
    force: bool,
}

fn run(cli: &Args) -> anyhow::Result<()> {
    check_output(&cli.output, cli.force)?;
    let shift: [f64; 3] = cli
        .shift
        .as_slice()
        .try_into()
        .context("expected three shift values")?;
    let volume = load(&cli.input, &LoadOptions::new(PixelKind::Float))
        .with_context(|| format!("failed to load {}", cli.input.display()))?;
    println!("Original spacing: {:?}", volume.spacing().as_slice());
    println!("Shift in voxels: {shift:?}");
    let options = ResampleOptions::new(cli.interpolation).with_default_value(cli.default_value);
    let shifted = translate(&volume, shift, &options)?;
    save(&shifted, &cli.output)?;
    println!("Shifted image saved to: {}", cli.output.display());
    Ok(())
}

fn main() {
    init_logger();
    let cli = Args::parse();
    exit_on_error(run(&cli));
}
