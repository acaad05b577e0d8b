//! Quick commandline utility to score segmentations against a ground truth.
//!
//! Prints the Dice similarity coefficient and the Hausdorff distance of every
//! comparison file. Meshes are voxelized at the given voxel size first.

use std::path::{Path, PathBuf};

use anyhow::Context;
use clap::Parser;

use volprep::common::{exit_on_error, init_logger};
use volprep::{
    compare, load, CompareOptions, Comparison, Interpolation, LoadOptions, PixelKind, Volume,
};

// use clap to create commandline interface
#[derive(Parser, Debug)]
#[command(author, about, version, long_about)]
struct Args {
    /// the ground truth mask or mesh
    ground_truth: PathBuf,

    /// masks or meshes to compare against the ground truth
    #[arg(required = true)]
    comparison: Vec<PathBuf>,

    /// voxel size in mm used when voxelizing meshes
    #[arg(short, long, default_value_t = 0.3)]
    voxel_size: f64,

    /// interpolation used to bring each file onto the ground truth grid
    #[arg(short, long, value_enum, default_value_t = Interpolation::Nearest)]
    interpolation: Interpolation,

    /// samples at or above this value are foreground
    #[arg(short, long, default_value_t = 0.5)]
    threshold: f64,
}

/// `1.2345`, or `undefined` when a mask has no surface.
fn format_distance(distance: Option<f64>) -> String {
    match distance {
        Some(d) => format!("{d:.4}"),
        None => "undefined".to_string(),
    }
}

fn load_ground_truth(cli: &Args) -> anyhow::Result<Volume> {
    load(
        &cli.ground_truth,
        &LoadOptions::new(PixelKind::Label).with_voxel_size(cli.voxel_size),
    )
    .with_context(|| format!("failed to load ground truth {}", cli.ground_truth.display()))
}

fn compare_file(ground_truth: &Volume, file: &Path, cli: &Args) -> anyhow::Result<Comparison> {
    let other = load(
        file,
        &LoadOptions::new(PixelKind::Float).with_voxel_size(cli.voxel_size),
    )
    .with_context(|| format!("failed to load {}", file.display()))?;
    let options = CompareOptions {
        interpolation: cli.interpolation,
        threshold: cli.threshold,
    };
    Ok(compare(ground_truth, &other, &options)?)
}

fn main() {
    init_logger();
    let cli = Args::parse();
    let ground_truth = exit_on_error(load_ground_truth(&cli));

    let mut failures = 0;
    for file in &cli.comparison {
        match compare_file(&ground_truth, file, &cli) {
            Ok(result) => println!(
                "Dice Similarity Coefficient: {:.4}, Hausdorff Distance: {}, File: {}",
                result.dice,
                format_distance(result.hausdorff),
                file.display()
            ),
            Err(e) => {
                eprintln!("Error! {}: {e:#}", file.display());
                failures += 1;
            }
        }
    }
    if failures > 0 {
        eprintln!("{failures} of {} comparisons failed", cli.comparison.len());
        std::process::exit(-2);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_surface_prints_undefined() {
        assert_eq!(format_distance(Some(1.0)), "1.0000");
        assert_eq!(format_distance(None), "undefined");
    }

    #[test]
    fn ground_truth_failure_names_the_file() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("gt.nii.gz");
        let cli = Args::parse_from(["comparenii", missing.to_str().unwrap(), "pred.nii.gz"]);
        let err = load_ground_truth(&cli).unwrap_err();
        let message = format!("{err:#}");
        assert!(message.starts_with("failed to load ground truth"));
        assert!(message.contains("gt.nii.gz"));
    }
}
