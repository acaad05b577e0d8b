//! nnU-Net dataset layout: naming, the train/validation split and
//! `dataset.json`.

use std::collections::BTreeMap;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use rand::seq::SliceRandom;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Suffix of every image and label file.
pub const FILE_ENDING: &str = ".nii.gz";
/// Share of subjects assigned to training; the rest validate.
pub const TRAIN_FRACTION: f64 = 0.9;
/// Channel index of the CT image.
pub const CT_CHANNEL: usize = 0;
/// Channel index of the low-resolution segmentation.
pub const LOW_RES_CHANNEL: usize = 1;

/// Contents of `dataset.json`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DatasetDescriptor {
    pub dataset_name: String,
    pub channel_names: BTreeMap<String, String>,
    pub labels: BTreeMap<String, u8>,
    #[serde(rename = "numTraining")]
    pub num_training: usize,
    pub file_ending: String,
    pub overwrite_image_reader_writer: String,
}

impl DatasetDescriptor {
    /// Descriptor of the two-channel femur refinement task.
    pub fn femur(dataset_name: &str, num_training: usize) -> Self {
        let channel_names = BTreeMap::from([
            (CT_CHANNEL.to_string(), "CT".to_string()),
            (LOW_RES_CHANNEL.to_string(), "low_res_segmentation".to_string()),
        ]);
        let labels = BTreeMap::from([("background".to_string(), 0), ("femur".to_string(), 1)]);
        Self {
            dataset_name: dataset_name.to_string(),
            channel_names,
            labels,
            num_training,
            file_ending: FILE_ENDING.to_string(),
            overwrite_image_reader_writer: "SimpleITKIO".to_string(),
        }
    }

    /// Writes the descriptor as JSON indented by four spaces.
    pub fn write<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let mut buf = Vec::new();
        let formatter = serde_json::ser::PrettyFormatter::with_indent(b"    ");
        let mut ser = serde_json::Serializer::with_formatter(&mut buf, formatter);
        self.serialize(&mut ser)?;
        let mut file = fs::File::create(path)?;
        file.write_all(&buf)?;
        Ok(())
    }

    pub fn read<P: AsRef<Path>>(path: P) -> Result<Self> {
        let text = fs::read_to_string(path)?;
        Ok(serde_json::from_str(&text)?)
    }
}

/// Number of label files (`*.nii.gz`) in `labels_dir`.
pub fn count_cases<P: AsRef<Path>>(labels_dir: P) -> Result<usize> {
    let mut count = 0;
    for entry in fs::read_dir(labels_dir)? {
        let entry = entry?;
        if entry.file_type()?.is_file() && entry.file_name().to_string_lossy().ends_with(FILE_ENDING) {
            count += 1;
        }
    }
    Ok(count)
}

/// `Dataset103_FemurRefine`
pub fn dataset_folder_name(dataset_id: u32, dataset_name: &str) -> String {
    format!("Dataset{dataset_id:03}_{dataset_name}")
}

/// Writes a voxel size without its decimal point: `1.5` -> `15`,
/// `0.75` -> `075`, `2.0` -> `20`.
pub fn voxel_to_str(voxel_size: f64) -> String {
    format!("{voxel_size:?}").replace('.', "")
}

/// `femur_007_15_20` for the seventh subject.
pub fn sample_name(prefix: &str, number: usize, voxel_size: f64, upscale_factor: f64) -> String {
    format!(
        "{prefix}_{number:03}_{}_{}",
        voxel_to_str(voxel_size),
        voxel_to_str(upscale_factor)
    )
}

/// `<images_dir>/<sample>_<channel>.nii.gz`
pub fn image_path(images_dir: &Path, sample: &str, channel: usize) -> PathBuf {
    images_dir.join(format!("{sample}_{channel:04}{FILE_ENDING}"))
}

/// `<labels_dir>/<sample>.nii.gz`
pub fn label_path(labels_dir: &Path, sample: &str) -> PathBuf {
    labels_dir.join(format!("{sample}{FILE_ENDING}"))
}

/// Subject indices assigned to each part of the dataset.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Split {
    /// Training subjects that will actually be processed.
    pub train: Vec<usize>,
    pub validation: Vec<usize>,
}

/// Shuffles `0..count` with `seed`, assigns the first 90% to training and
/// keeps a `data_percentage` share of those, drawn with a second generator
/// seeded by `seed * kept`.
pub fn split_subjects(count: usize, seed: u64, data_percentage: f64) -> Result<Split> {
    if !(data_percentage > 0.0 && data_percentage <= 1.0) {
        return Err(Error::InvalidParameter(format!(
            "data percentage must be in (0, 1], got {data_percentage}"
        )));
    }
    let mut indices: Vec<usize> = (0..count).collect();
    indices.shuffle(&mut ChaCha8Rng::seed_from_u64(seed));
    let split = (TRAIN_FRACTION * count as f64) as usize;
    let validation = indices.split_off(split);

    let kept = (indices.len() as f64 * data_percentage) as usize;
    let mut rng = ChaCha8Rng::seed_from_u64(seed.wrapping_mul(kept as u64));
    let train = indices.choose_multiple(&mut rng, kept).copied().collect();
    Ok(Split { train, validation })
}
