//! Model artifacts and best-model checkpointing
//!
//! Every artifact is a `CompactRecorder` record (`<stem>.mpk`) plus a JSON
//! sidecar (`<stem>.json`) holding the network configuration, class names and
//! the epoch it was taken at.

use std::fs;
use std::path::{Path, PathBuf};

use burn::module::Module;
use burn::record::CompactRecorder;
use burn::tensor::backend::Backend;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::model::{CnnConfig, ImageClassifier};
use crate::training::history::EpochMetrics;
use crate::utils::{PipelineError, Result};

/// Sidecar written next to every model artifact
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArtifactMetadata {
    pub model: CnnConfig,
    /// Label index -> class name
    pub class_names: Vec<String>,
    /// 1-based epoch the weights come from
    pub epoch: usize,
    pub metrics: EpochMetrics,
    /// RFC 3339 timestamp
    pub saved_at: String,
}

impl ArtifactMetadata {
    pub fn new(
        model: CnnConfig,
        class_names: Vec<String>,
        epoch: usize,
        metrics: EpochMetrics,
    ) -> Self {
        Self {
            model,
            class_names,
            epoch,
            metrics,
            saved_at: Utc::now().to_rfc3339(),
        }
    }

    pub fn load(path: &Path) -> Result<Self> {
        let json = fs::read_to_string(path)?;
        Ok(serde_json::from_str(&json)?)
    }
}

/// Save `<dir>/<stem>.mpk` and `<dir>/<stem>.json`, returning the record path
pub fn save_model<B: Backend>(
    model: &ImageClassifier<B>,
    dir: &Path,
    stem: &str,
    metadata: &ArtifactMetadata,
) -> Result<PathBuf> {
    fs::create_dir_all(dir)?;

    let record_path = dir.join(stem);
    model
        .clone()
        .save_file(&record_path, &CompactRecorder::new())
        .map_err(|e| PipelineError::Model(format!("Failed to save model: {:?}", e)))?;

    let sidecar = dir.join(format!("{stem}.json"));
    fs::write(&sidecar, serde_json::to_string_pretty(metadata)?)?;

    Ok(dir.join(format!("{stem}.mpk")))
}

/// Rebuild a model from `<dir>/<stem>.json` and `<dir>/<stem>.mpk`
pub fn load_model<B: Backend>(
    dir: &Path,
    stem: &str,
    device: &B::Device,
) -> Result<(ImageClassifier<B>, ArtifactMetadata)> {
    let metadata = ArtifactMetadata::load(&dir.join(format!("{stem}.json")))?;

    let model = ImageClassifier::<B>::new(&metadata.model, device)
        .load_file(dir.join(stem), &CompactRecorder::new(), device)
        .map_err(|e| PipelineError::Model(format!("Failed to load model: {:?}", e)))?;

    Ok((model, metadata))
}

/// Outcome of comparing one epoch against the best so far
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum CheckpointDecision {
    Improved { previous: f64, current: f64 },
    NotImproved { best: f64 },
}

/// Saves the model whenever validation accuracy strictly improves
#[derive(Debug, Clone)]
pub struct BestModelCheckpoint {
    dir: PathBuf,
    stem: String,
    best: f64,
    best_epoch: Option<usize>,
}

impl BestModelCheckpoint {
    pub const MONITOR: &'static str = "val_accuracy";

    pub fn new(dir: impl Into<PathBuf>, stem: impl Into<String>) -> Self {
        Self {
            dir: dir.into(),
            stem: stem.into(),
            best: f64::NEG_INFINITY,
            best_epoch: None,
        }
    }

    pub fn best(&self) -> f64 {
        self.best
    }

    pub fn best_epoch(&self) -> Option<usize> {
        self.best_epoch
    }

    pub fn path(&self) -> PathBuf {
        self.dir.join(format!("{}.mpk", self.stem))
    }

    /// Record `value` for `epoch` and report whether it beat the best
    pub fn update(&mut self, epoch: usize, value: f64) -> CheckpointDecision {
        if value > self.best {
            let previous = self.best;
            self.best = value;
            self.best_epoch = Some(epoch);
            CheckpointDecision::Improved {
                previous,
                current: value,
            }
        } else {
            CheckpointDecision::NotImproved { best: self.best }
        }
    }

    /// Update with the epoch's validation accuracy and save on improvement
    pub fn on_epoch_end<B: Backend>(
        &mut self,
        model: &ImageClassifier<B>,
        metadata: &ArtifactMetadata,
    ) -> Result<CheckpointDecision> {
        let decision = self.update(metadata.epoch, metadata.metrics.val_accuracy);

        match decision {
            CheckpointDecision::Improved { previous, current } => {
                info!(
                    "Epoch {}: {} improved from {:.5} to {:.5}, saving model to {}",
                    metadata.epoch,
                    Self::MONITOR,
                    previous,
                    current,
                    self.path().display()
                );
                save_model(model, &self.dir, &self.stem, metadata)?;
            }
            CheckpointDecision::NotImproved { best } => {
                info!(
                    "Epoch {}: {} did not improve from {:.5}",
                    metadata.epoch,
                    Self::MONITOR,
                    best
                );
            }
        }

        Ok(decision)
    }
}
