//! Quick commandline utility to build an nnU-Net training dataset from
//! patient directories.
//!
//! Every `Pat*` directory holds `<name>.nrrd` (CT) and `<name>.stl` (bone
//! surface). Each subject becomes one case: the CT and a low resolution mask
//! as input channels and a finer voxelization of the surface as the label,
//! all on the label's grid. Subjects that fail are reported and skipped.

use std::path::PathBuf;

use clap::Parser;

use volprep::common::{exit_on_error, init_logger};
use volprep::pipeline::{prepare_dataset, PrepareConfig};
use volprep::Interpolation;

// use clap to create commandline interface
#[derive(Parser, Debug)]
#[command(author, about, version, long_about)]
struct Args {
    /// directory of subject folders (e.g. "data/raw/Subjects/")
    subjects_dir: PathBuf,

    /// nnU-Net raw data directory for training (e.g. "data/nnUNet/raw/")
    train_output_path: PathBuf,

    /// directory for the validation cases (e.g. "data/nnUNet/test/")
    valid_output_path: PathBuf,

    /// nnU-Net dataset id (e.g. 103)
    #[arg(long)]
    dataset_id: u32,

    /// nnU-Net dataset name
    #[arg(long, default_value = "FemurRefine")]
    dataset_name: String,

    /// random seed for the train/validation split
    #[arg(long, default_value_t = 123)]
    seed: u64,

    /// voxel size in mm of the low resolution input mask
    #[arg(long, default_value_t = 1.5)]
    voxel_size_original: f64,

    /// the ground truth is voxelized at voxel_size_original / upscale_factor
    #[arg(long, default_value_t = 2.0)]
    upscale_factor: f64,

    /// do not generate the validation set
    #[arg(long)]
    skip_val: bool,

    /// share of the training subjects to process, in (0, 1]
    #[arg(long, default_value_t = 1.0)]
    data_percentage: f64,

    /// interpolation of the low resolution mask onto the label grid
    #[arg(long, value_enum, default_value_t = Interpolation::Linear)]
    low_res_interpolation: Interpolation,

    /// crop every case to the label's bounding box plus this many voxels
    #[arg(long)]
    crop: Option<usize>,

    /// only directories starting with this prefix are subjects
    #[arg(long, default_value = "Pat")]
    subject_prefix: String,
}

fn main() {
    init_logger();
    let cli = Args::parse();
    let config = PrepareConfig {
        dataset_id: cli.dataset_id,
        dataset_name: cli.dataset_name.clone(),
        seed: cli.seed,
        voxel_size_original: cli.voxel_size_original,
        upscale_factor: cli.upscale_factor,
        skip_validation: cli.skip_val,
        data_percentage: cli.data_percentage,
        low_res_interpolation: cli.low_res_interpolation,
        crop_padding: cli.crop,
        subject_prefix: cli.subject_prefix.clone(),
        ..PrepareConfig::default()
    };
    let summary = exit_on_error(prepare_dataset(
        &cli.subjects_dir,
        &cli.train_output_path,
        &cli.valid_output_path,
        &config,
    ));

    let mut all = summary.train.clone();
    all.merge(summary.validation.clone());
    for (subject, error) in &all.failed {
        eprintln!("  {subject}: {error}");
    }
    println!(
        "Data preparation complete: {} ({} training samples in {}).",
        all,
        summary.num_training,
        summary.dataset_json.display()
    );
    if all.succeeded.is_empty() {
        std::process::exit(-2);
    }
}
