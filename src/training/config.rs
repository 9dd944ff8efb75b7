//! Training configuration
//!
//! Every constant of a training run lives in [`TrainingConfig`]. The two
//! presets reproduce the cats-vs-dogs and lung runs; a TOML file can override
//! any subset of keys on top of a preset.

use std::fs;
use std::path::{Path, PathBuf};

use clap::ValueEnum;
use serde::{Deserialize, Serialize};

use crate::dataset::augmentation::AugmentationConfig;
use crate::dataset::DEFAULT_IMAGE_SIZE;
use crate::model::{CnnConfig, DEFAULT_DROPOUT};
use crate::utils::{PipelineError, Result};

/// Which preset a run starts from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "kebab-case")]
pub enum Task {
    /// Cats vs dogs, 2 epochs, no checkpoint
    Binary,
    /// Lung CT, 4 classes, 10 epochs, best-model checkpoint
    FourClass,
}

impl Task {
    pub fn preset(self) -> TrainingConfig {
        match self {
            Task::Binary => TrainingConfig::binary(),
            Task::FourClass => TrainingConfig::four_class(),
        }
    }
}

/// Full configuration of one training run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrainingConfig {
    pub task: Task,
    pub train_dir: PathBuf,
    pub val_dir: PathBuf,
    /// Directory receiving history files and model artifacts
    pub output_dir: PathBuf,
    pub num_classes: usize,
    pub epochs: usize,
    pub batch_size: usize,
    pub image_size: usize,
    pub learning_rate: f64,
    pub beta_1: f32,
    pub beta_2: f32,
    pub epsilon: f32,
    pub dropout_rate: f64,
    pub augmentation: AugmentationConfig,
    /// File stem of `<stem>.csv` / `<stem>.json`
    pub history_stem: String,
    /// File stem of the final model artifact
    pub model_stem: String,
    /// File stem of the best-model checkpoint; `None` disables it
    pub checkpoint_stem: Option<String>,
    /// Delete undecodable images from both directories before loading
    pub clean_corrupted: bool,
    pub seed: u64,
}

impl TrainingConfig {
    /// Cats vs dogs on `dataset_sr`
    pub fn binary() -> Self {
        Self {
            task: Task::Binary,
            train_dir: PathBuf::from("dataset_sr/train"),
            val_dir: PathBuf::from("dataset_sr/val"),
            output_dir: PathBuf::from("."),
            num_classes: 2,
            epochs: 2,
            batch_size: 8,
            image_size: DEFAULT_IMAGE_SIZE,
            learning_rate: 1e-3,
            beta_1: 0.9,
            beta_2: 0.999,
            epsilon: 1e-7,
            dropout_rate: DEFAULT_DROPOUT,
            augmentation: AugmentationConfig::default(),
            history_stem: "training_history".into(),
            model_stem: "cats_vs_dogs_cnn".into(),
            checkpoint_stem: None,
            clean_corrupted: true,
            seed: 42,
        }
    }

    /// adeno / largecell / normal / squamouscell on `dataset_tvr`
    pub fn four_class() -> Self {
        Self {
            task: Task::FourClass,
            train_dir: PathBuf::from("dataset_tvr/images/train"),
            val_dir: PathBuf::from("dataset_tvr/images/val"),
            num_classes: 4,
            epochs: 10,
            history_stem: "training_history_4class".into(),
            model_stem: "4class_cnn".into(),
            checkpoint_stem: Some("best_model".into()),
            ..Self::binary()
        }
    }

    /// Preset for `task` with the keys of a TOML document applied on top.
    ///
    /// Nested tables (`[augmentation]`) are merged key by key. A `task` key
    /// must name the same task, since it cannot switch presets.
    pub fn from_toml_str(task: Task, content: &str) -> Result<Self> {
        let overrides: toml::Table = toml::from_str(content)
            .map_err(|e| PipelineError::Config(format!("Failed to parse config: {e}")))?;

        if let Some(value) = overrides.get("task") {
            let requested: Task = value
                .clone()
                .try_into()
                .map_err(|e| PipelineError::Config(format!("Invalid task: {e}")))?;
            if requested != task {
                return Err(PipelineError::Config(format!(
                    "config file is for task {requested:?} but {task:?} was selected"
                )));
            }
        }

        let toml::Value::Table(mut base) = toml::Value::try_from(task.preset())
            .map_err(|e| PipelineError::Config(format!("Failed to encode preset: {e}")))?
        else {
            return Err(PipelineError::Config("preset did not encode as a table".into()));
        };
        merge_tables(&mut base, overrides);

        let config: Self = toml::Value::Table(base)
            .try_into()
            .map_err(|e| PipelineError::Config(format!("Invalid config: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    /// Read a TOML override file for `task`
    pub fn load_toml(task: Task, path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path).map_err(|e| {
            PipelineError::Config(format!("Failed to read config {}: {e}", path.display()))
        })?;
        Self::from_toml_str(task, &content)
    }

    pub fn validate(&self) -> Result<()> {
        if self.epochs == 0 {
            return Err(PipelineError::Config("epochs must be > 0".into()));
        }
        if self.batch_size == 0 {
            return Err(PipelineError::Config("batch_size must be > 0".into()));
        }
        if self.learning_rate <= 0.0 {
            return Err(PipelineError::Config(format!(
                "learning_rate must be > 0, got {}",
                self.learning_rate
            )));
        }
        self.model_config().validate().map_err(PipelineError::Config)
    }

    /// Network configuration implied by this run
    pub fn model_config(&self) -> CnnConfig {
        CnnConfig::new()
            .with_num_classes(self.num_classes)
            .with_input_size(self.image_size)
            .with_dropout_rate(self.dropout_rate)
    }

    pub fn history_csv_path(&self) -> PathBuf {
        self.output_dir.join(format!("{}.csv", self.history_stem))
    }

    pub fn history_json_path(&self) -> PathBuf {
        self.output_dir.join(format!("{}.json", self.history_stem))
    }
}

fn merge_tables(base: &mut toml::Table, overrides: toml::Table) {
    for (key, value) in overrides {
        match (base.get_mut(&key), value) {
            (Some(toml::Value::Table(existing)), toml::Value::Table(nested)) => {
                merge_tables(existing, nested);
            }
            (_, value) => {
                base.insert(key, value);
            }
        }
    }
}
