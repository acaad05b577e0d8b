//! Quick commandline utility to find the centre of the non-zero data in a
//! volume.

use std::path::PathBuf;

use anyhow::Context;
use clap::Parser;

use volprep::common::{exit_on_error, init_logger};
use volprep::{bounding_box, load, ForegroundRule, LoadOptions, PixelKind};

// use clap to create commandline interface
#[derive(Parser, Debug)]
#[command(author, about, version, long_about)]
struct Args {
    /// the input volume
    input: PathBuf,
}

fn run(cli: &Args) -> anyhow::Result<()> {
    let volume = load(&cli.input, &LoadOptions::new(PixelKind::Float))
        .with_context(|| format!("failed to load {}", cli.input.display()))?;
    let bbox = bounding_box(&volume, ForegroundRule::NonZero)
        .context("this file contains no non-zero voxels")?;
    let end = bbox.end();
    println!("Found non-zero data within bounding box:");
    for (axis, name) in ["x", "y", "z"].iter().enumerate() {
        println!("  {name}-range: [{}, {}]", bbox.start[axis], end[axis]);
    }
    let center: Vec<usize> = (0..3).map(|a| (bbox.start[a] + end[a]) / 2).collect();
    println!("\nCenter coordinate: ({}, {}, {})", center[0], center[1], center[2]);
    let physical = bbox.physical_center(volume.grid());
    println!(
        "Physical center (RAS, mm): ({:.3}, {:.3}, {:.3})",
        physical.x, physical.y, physical.z
    );
    Ok(())
}

fn main() {
    init_logger();
    let cli = Args::parse();
    exit_on_error(run(&cli));
}
