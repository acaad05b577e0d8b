//! Batch preparation of nnU-Net training and inference inputs.
//!
//! Subjects are processed one at a time and independently. A failing subject
//! is logged and skipped, so the batch outcome is "N of M succeeded".

use std::fmt;
use std::path::{Path, PathBuf};

use glob::glob;
use log::{info, warn};

use crate::crop::{bounding_box, crop, crop_to_bbox, CropOptions, ForegroundRule};
use crate::dataset::{
    count_cases, dataset_folder_name, image_path, label_path, sample_name,
    split_subjects, DatasetDescriptor, CT_CHANNEL, LOW_RES_CHANNEL,
};
use crate::error::{Error, Result};
use crate::io::{load, save, LoadOptions};
use crate::resample::{resample, Interpolation, ResampleOptions};
use crate::volume::{PixelKind, Volume};

/// Hounsfield units of air, used outside the CT field of view.
pub const AIR_HU: f64 = -1000.0;

/// One patient directory holding `<name>.nrrd` and `<name>.stl`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Subject {
    pub name: String,
    pub ct_path: PathBuf,
    pub mesh_path: PathBuf,
}

impl Subject {
    pub fn from_dir(dir: &Path) -> Option<Subject> {
        let name = dir.file_name()?.to_str()?.to_string();
        Some(Subject {
            ct_path: dir.join(format!("{name}.nrrd")),
            mesh_path: dir.join(format!("{name}.stl")),
            name,
        })
    }
}

/// Subject directories under `subjects_dir` whose name starts with
/// `prefix`, sorted by name.
pub fn discover_subjects(subjects_dir: &Path, prefix: &str) -> Result<Vec<Subject>> {
    if !subjects_dir.is_dir() {
        return Err(Error::Io(std::io::Error::new(
            std::io::ErrorKind::NotFound,
            format!("{} is not a directory", subjects_dir.display()),
        )));
    }
    let pattern = subjects_dir.join(format!("{prefix}*"));
    let pattern = pattern.to_string_lossy();
    let paths = glob(&pattern).map_err(|e| Error::InvalidParameter(e.to_string()))?;
    let mut subjects: Vec<Subject> = paths
        .filter_map(std::result::Result::ok)
        .filter(|p| p.is_dir())
        .filter_map(|p| Subject::from_dir(&p))
        .collect();
    subjects.sort_by(|a, b| a.name.cmp(&b.name));
    Ok(subjects)
}

/// Parameters of the training dataset build.
#[derive(Debug, Clone, PartialEq)]
pub struct PrepareConfig {
    pub dataset_id: u32,
    pub dataset_name: String,
    pub seed: u64,
    /// Pitch of the low-resolution input mask.
    pub voxel_size_original: f64,
    /// Ground truth is voxelized at `voxel_size_original / upscale_factor`.
    pub upscale_factor: f64,
    pub skip_validation: bool,
    /// Share of the training subjects to process, in `(0, 1]`.
    pub data_percentage: f64,
    /// Interpolation of the low-resolution mask onto the ground truth grid.
    pub low_res_interpolation: Interpolation,
    /// Crop all outputs to the ground truth box plus this padding.
    pub crop_padding: Option<usize>,
    pub subject_prefix: String,
    pub sample_prefix: String,
}

impl Default for PrepareConfig {
    fn default() -> Self {
        Self {
            dataset_id: 1,
            dataset_name: "FemurRefine".to_string(),
            seed: 123,
            voxel_size_original: 1.5,
            upscale_factor: 2.0,
            skip_validation: false,
            data_percentage: 1.0,
            low_res_interpolation: Interpolation::Linear,
            crop_padding: None,
            subject_prefix: "Pat".to_string(),
            sample_prefix: "femur".to_string(),
        }
    }
}

impl PrepareConfig {
    /// Background padding around the voxelized ground truth.
    pub fn ground_truth_padding(&self) -> usize {
        (1.5 * self.upscale_factor).ceil() as usize
    }

    pub fn ground_truth_voxel_size(&self) -> f64 {
        self.voxel_size_original / self.upscale_factor
    }

    fn validate(&self) -> Result<()> {
        if !(self.voxel_size_original > 0.0) || !(self.upscale_factor > 0.0) {
            return Err(Error::InvalidParameter(format!(
                "voxel size {} and upscale factor {} must be positive",
                self.voxel_size_original, self.upscale_factor
            )));
        }
        Ok(())
    }
}

/// The three aligned volumes of one training case.
#[derive(Debug, Clone)]
pub struct TrainingCase {
    pub ct: Volume,
    pub low_res: Volume,
    pub label: Volume,
}

impl TrainingCase {
    /// Writes the channels to `images_dir` and the label to `labels_dir`.
    pub fn save(&self, images_dir: &Path, labels_dir: &Path, sample: &str) -> Result<()> {
        save(&self.ct, image_path(images_dir, sample, CT_CHANNEL))?;
        save(&self.low_res, image_path(images_dir, sample, LOW_RES_CHANNEL))?;
        save(&self.label, label_path(labels_dir, sample))
    }
}

/// Builds the CT, low-resolution mask and ground truth of one subject, all
/// on the ground truth grid.
pub fn prepare_training_case(subject: &Subject, config: &PrepareConfig, scratch_dir: &Path) -> Result<TrainingCase> {
    let ct = load(&subject.ct_path, &LoadOptions::new(PixelKind::Float))?;
    let low_res = load(
        &subject.mesh_path,
        &LoadOptions::new(PixelKind::Float)
            .with_voxel_size(config.voxel_size_original)
            .with_scratch_dir(scratch_dir),
    )?;
    let label = load(
        &subject.mesh_path,
        &LoadOptions::new(PixelKind::Label)
            .with_voxel_size(config.ground_truth_voxel_size())
            .with_padding(config.ground_truth_padding())
            .with_scratch_dir(scratch_dir),
    )?;

    let ct = resample(
        &ct,
        label.grid(),
        &ResampleOptions::new(Interpolation::Linear).with_default_value(AIR_HU),
    )?;
    let low_res = resample(&low_res, label.grid(), &ResampleOptions::new(config.low_res_interpolation))?;

    match config.crop_padding {
        Some(padding) => {
            let bbox = bounding_box(&label, ForegroundRule::NonZero)?.padded(padding, label.size());
            Ok(TrainingCase {
                ct: crop(&ct, &bbox)?,
                low_res: crop(&low_res, &bbox)?,
                label: crop(&label, &bbox)?,
            })
        }
        None => Ok(TrainingCase { ct, low_res, label }),
    }
}

/// Inference inputs: the low-resolution mask cropped to its own box and the
/// CT resampled onto that crop.
pub fn prepare_inference_case(
    ct: &Volume,
    low_res: &Volume,
    padding: usize,
    ct_default: f64,
) -> Result<(Volume, Volume)> {
    let options = CropOptions::default().with_padding(padding);
    let cropped = crop_to_bbox(low_res, low_res, &options)?;
    let ct = resample(
        ct,
        cropped.grid(),
        &ResampleOptions::new(Interpolation::Linear).with_default_value(ct_default),
    )?;
    Ok((ct, cropped))
}

/// Outcome of a batch.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BatchReport {
    pub succeeded: Vec<String>,
    /// Subject name and the error that stopped it.
    pub failed: Vec<(String, String)>,
}

impl BatchReport {
    pub fn total(&self) -> usize {
        self.succeeded.len() + self.failed.len()
    }

    pub fn merge(&mut self, other: BatchReport) {
        self.succeeded.extend(other.succeeded);
        self.failed.extend(other.failed);
    }
}

impl fmt::Display for BatchReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} of {} subjects succeeded", self.succeeded.len(), self.total())
    }
}

/// Runs `task` on every subject, collecting failures instead of stopping.
pub fn run_batch<T, F>(items: &[T], name: impl Fn(&T) -> String, mut task: F) -> BatchReport
where
    F: FnMut(&T) -> Result<()>,
{
    let mut report = BatchReport::default();
    for item in items {
        let id = name(item);
        match task(item) {
            Ok(()) => report.succeeded.push(id),
            Err(e) => {
                warn!("Error processing {id}: {e}. Skipping.");
                report.failed.push((id, e.to_string()));
            }
        }
    }
    report
}

/// Summary of [`prepare_dataset`].
#[derive(Debug, Clone)]
pub struct PrepareSummary {
    pub train: BatchReport,
    pub validation: BatchReport,
    pub num_training: usize,
    pub dataset_json: PathBuf,
}

/// Builds `Dataset<id>_<name>` under `train_root` (and `valid_root`) from
/// the subjects in `subjects_dir`, then writes `dataset.json`.
pub fn prepare_dataset(
    subjects_dir: &Path,
    train_root: &Path,
    valid_root: &Path,
    config: &PrepareConfig,
) -> Result<PrepareSummary> {
    config.validate()?;
    let subjects = discover_subjects(subjects_dir, &config.subject_prefix)?;
    if subjects.is_empty() {
        return Err(Error::InvalidParameter(format!(
            "no subject directories starting with '{}' in {}",
            config.subject_prefix,
            subjects_dir.display()
        )));
    }
    info!("Found {} total subjects.", subjects.len());

    let split = split_subjects(subjects.len(), config.seed, config.data_percentage)?;
    info!(
        "Processing {} training samples ({}%)",
        split.train.len(),
        config.data_percentage * 100.0
    );
    if !config.skip_validation {
        info!("Processing {} validation samples", split.validation.len());
    }

    let folder = dataset_folder_name(config.dataset_id, &config.dataset_name);
    let train_dir = train_root.join(&folder);
    let valid_dir = valid_root.join(&folder);
    let scratch = tempfile::Builder::new().prefix("volprep-batch-").tempdir()?;

    let process = |dataset_dir: &Path, indices: &[usize], part: &str| -> Result<BatchReport> {
        let images_dir = dataset_dir.join("imagesTr");
        let labels_dir = dataset_dir.join("labelsTr");
        std::fs::create_dir_all(&images_dir)?;
        std::fs::create_dir_all(&labels_dir)?;
        Ok(run_batch(
            indices,
            |i| subjects[*i].name.clone(),
            |i| {
                let subject = &subjects[*i];
                let sample = sample_name(
                    &config.sample_prefix,
                    i + 1,
                    config.voxel_size_original,
                    config.upscale_factor,
                );
                info!("--- Processing {part} {} -> {sample} ---", subject.name);
                prepare_training_case(subject, config, scratch.path())?.save(&images_dir, &labels_dir, &sample)
            },
        ))
    };

    let train = process(&train_dir, &split.train, "Train")?;
    let validation = if config.skip_validation {
        BatchReport::default()
    } else {
        process(&valid_dir, &split.validation, "Valid")?
    };

    let num_training = count_cases(train_dir.join("labelsTr"))?;
    let dataset_json = train_dir.join("dataset.json");
    DatasetDescriptor::femur(&config.dataset_name, num_training).write(&dataset_json)?;
    info!(
        "Data preparation complete with {} training samples and {} validation samples.",
        num_training,
        validation.succeeded.len()
    );
    Ok(PrepareSummary {
        train,
        validation,
        num_training,
        dataset_json,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::volume::Grid;
    use ndarray::Array3;

    #[test]
    fn batch_keeps_going_after_a_failure() {
        let items = [1, 2, 3, 4];
        let report = run_batch(
            &items,
            |i| format!("Pat{i:03}"),
            |i| {
                if *i == 2 {
                    Err(Error::EmptyForeground)
                } else {
                    Ok(())
                }
            },
        );
        assert_eq!(report.succeeded, vec!["Pat001", "Pat003", "Pat004"]);
        assert_eq!(report.failed.len(), 1);
        assert_eq!(report.failed[0].0, "Pat002");
        assert_eq!(report.to_string(), "3 of 4 subjects succeeded");
    }

    #[test]
    fn discovery_filters_and_sorts() {
        let dir = tempfile::tempdir().unwrap();
        for name in ["Pat010", "Pat002", "Other", "Pat001"] {
            std::fs::create_dir(dir.path().join(name)).unwrap();
        }
        std::fs::write(dir.path().join("Pat999"), b"not a dir").unwrap();
        let subjects = discover_subjects(dir.path(), "Pat").unwrap();
        let names: Vec<_> = subjects.iter().map(|s| s.name.as_str()).collect();
        assert_eq!(names, ["Pat001", "Pat002", "Pat010"]);
        assert_eq!(subjects[0].ct_path, dir.path().join("Pat001").join("Pat001.nrrd"));
        assert_eq!(subjects[0].mesh_path, dir.path().join("Pat001").join("Pat001.stl"));
    }

    #[test]
    fn ground_truth_padding_rounds_up() {
        let config = PrepareConfig::default();
        assert_eq!(config.ground_truth_padding(), 3);
        assert_eq!(config.ground_truth_voxel_size(), 0.75);
        let config = PrepareConfig {
            upscale_factor: 2.5,
            ..PrepareConfig::default()
        };
        assert_eq!(config.ground_truth_padding(), 4);
    }

    #[test]
    fn inference_case_is_cropped_and_aligned() {
        let grid = Grid::axis_aligned([10, 10, 10], [0.0; 3], [1.5; 3]).unwrap();
        let mask = Array3::from_shape_fn((10, 10, 10), |(i, j, k)| {
            if (4..6).contains(&i) && (4..6).contains(&j) && (4..6).contains(&k) {
                1.0
            } else {
                0.0
            }
        });
        let low_res = Volume::from_grid(grid, mask, PixelKind::Label).unwrap();
        let ct_grid = Grid::axis_aligned([30, 30, 30], [0.0; 3], [0.5; 3]).unwrap();
        let ct = Volume::filled(ct_grid, 40.0, PixelKind::Float);
        let (ct, cropped) = prepare_inference_case(&ct, &low_res, 1, AIR_HU).unwrap();
        assert_eq!(cropped.size(), [4, 4, 4]);
        assert!(ct.grid().coincides_with(cropped.grid()));
        assert_eq!(ct.samples()[[0, 0, 0]], 40.0);
    }
}
