//! Supervised Training Implementation
//!
//! A custom training loop on Burn's optimizer API rather than the high-level
//! `LearnerBuilder`: shuffle, batch, step, then evaluate on the validation set
//! after every epoch.

use std::path::PathBuf;

use burn::{
    data::{dataloader::batcher::Batcher, dataset::Dataset},
    module::AutodiffModule,
    nn::loss::{BinaryCrossEntropyLossConfig, CrossEntropyLossConfig},
    optim::{AdamConfig, GradientsParams, Optimizer},
    tensor::{
        backend::{AutodiffBackend, Backend},
        ElementConversion, Int, Tensor,
    },
};
use colored::Colorize;
use indicatif::{ProgressBar, ProgressStyle};
use rand::seq::SliceRandom;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::dataset::burn_dataset::{AugmentingBatcher, ImageBatch, ImageBatcher, ImageFolderDataset};
use crate::dataset::integrity::{remove_invalid_images_in, IntegrityReport};
use crate::dataset::loader::ImageFolder;
use crate::model::ImageClassifier;
use crate::training::checkpoint::{save_model, ArtifactMetadata, BestModelCheckpoint};
use crate::training::config::TrainingConfig;
use crate::training::history::{EpochMetrics, TrainingHistory};
use crate::utils::logging::TrainingLogger;
use crate::utils::{PipelineError, Result};

/// What a finished run produced
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrainingOutcome {
    pub history: TrainingHistory,
    pub class_names: Vec<String>,
    pub best_val_accuracy: f64,
    /// 1-based epoch of the best validation accuracy
    pub best_epoch: usize,
    pub model_path: PathBuf,
    pub checkpoint_path: Option<PathBuf>,
    pub history_csv: PathBuf,
    pub history_json: PathBuf,
    /// Corrupted images removed before loading, when cleaning was enabled
    pub integrity: Option<IntegrityReport>,
}

impl TrainingOutcome {
    /// Print a summary of the run to console
    pub fn print(&self) {
        println!();
        println!("{}", "Training Complete!".green().bold());
        println!(
            "  🎉 Best validation accuracy: {:.2}% (epoch {})",
            self.best_val_accuracy * 100.0,
            self.best_epoch
        );
        if let Some(report) = &self.integrity {
            println!("  🧹 Corrupted images removed: {}", report.total_deleted());
        }
        println!("  💾 Model:      {}", self.model_path.display());
        if let Some(path) = &self.checkpoint_path {
            println!("  🏆 Best model: {}", path.display());
        }
        println!("  📈 History:    {}", self.history_csv.display());
        println!("                {}", self.history_json.display());
    }
}

/// Loss and correct-prediction count of one batch
fn batch_loss<B: Backend>(
    model: &ImageClassifier<B>,
    images: Tensor<B, 4>,
    targets: Tensor<B, 1, Int>,
) -> (Tensor<B, 1>, usize) {
    let logits = model.forward(images);
    let device = logits.device();

    let predictions = model.predict(logits.clone());
    let correct: i64 = predictions
        .equal(targets.clone())
        .int()
        .sum()
        .into_scalar()
        .elem();

    let loss = if model.is_binary() {
        let [batch_size, _] = logits.dims();
        BinaryCrossEntropyLossConfig::new()
            .with_logits(true)
            .init(&device)
            .forward(logits, targets.reshape([batch_size, 1]))
    } else {
        CrossEntropyLossConfig::new()
            .init(&device)
            .forward(logits, targets)
    };

    (loss, correct as usize)
}

/// Run one training task end to end
///
/// # Type Parameters
/// * `B` - The autodiff backend to use (e.g., `Autodiff<NdArray>` or `Autodiff<Cuda>`)
///
/// # Steps
/// 1. Remove undecodable images from the train and validation trees
/// 2. Scan both trees and load them into memory
/// 3. Fit for `config.epochs` epochs, evaluating after each one
/// 4. Save the best checkpoint (when configured), the history and the final model
pub fn run_training<B>(config: &TrainingConfig, device: &B::Device) -> Result<TrainingOutcome>
where
    B: AutodiffBackend,
{
    config.validate()?;

    println!("{}", "Initializing Training...".green().bold());
    info!("Device: {:?}", device);
    B::seed(config.seed);

    let integrity = if config.clean_corrupted {
        println!("{}", "Removing Corrupted Images...".cyan());
        let report = remove_invalid_images_in(&[&config.train_dir, &config.val_dir])?;
        info!(
            "Checked {} images, deleted {}",
            report.scanned,
            report.total_deleted()
        );
        Some(report)
    } else {
        None
    };

    println!("{}", "Loading Dataset...".cyan());
    let train_folder = ImageFolder::new(&config.train_dir)?;
    let val_folder = ImageFolder::new(&config.val_dir)?;

    train_folder.expect_classes(config.num_classes)?;
    if val_folder.class_names != train_folder.class_names {
        return Err(PipelineError::Dataset(format!(
            "validation classes {:?} differ from training classes {:?}",
            val_folder.class_names, train_folder.class_names
        )));
    }
    train_folder.get_stats().print();

    let train_dataset =
        ImageFolderDataset::new_cached(train_folder.labelled_paths(), config.image_size)?;
    let val_dataset = ImageFolderDataset::new_cached(val_folder.labelled_paths(), config.image_size)?;

    if train_dataset.is_empty() {
        return Err(PipelineError::Dataset(format!(
            "no training images in {}",
            config.train_dir.display()
        )));
    }
    if val_dataset.is_empty() {
        return Err(PipelineError::Dataset(format!(
            "no validation images in {}",
            config.val_dir.display()
        )));
    }

    for (name, count) in train_folder
        .class_names
        .iter()
        .zip(train_dataset.class_distribution(config.num_classes))
    {
        info!("Loaded {} training images for '{}'", count, name);
    }

    let train_batcher = AugmentingBatcher::with_config(
        train_dataset.image_size(),
        config.augmentation.clone(),
        config.seed,
    );
    let val_batcher = ImageBatcher::new(val_dataset.image_size());

    println!("{}", "Creating Model...".cyan());
    let model_config = config.model_config();
    for line in model_config.summary().to_string().lines() {
        info!("{}", line);
    }
    let mut model = ImageClassifier::<B>::new(&model_config, device);

    let mut optimizer = AdamConfig::new()
        .with_beta_1(config.beta_1)
        .with_beta_2(config.beta_2)
        .with_epsilon(config.epsilon)
        .init();

    println!();
    println!("{}", "Training Configuration:".cyan().bold());
    println!("  🏷️  Training samples:   {}", train_dataset.len());
    println!("  ✅ Validation samples: {}", val_dataset.len());
    println!("  🔄 Epochs:             {}", config.epochs);
    println!("  📦 Batch size:         {}", config.batch_size);
    println!("  📈 Learning rate:      {}", config.learning_rate);
    println!();

    let mut checkpoint = config
        .checkpoint_stem
        .as_ref()
        .map(|stem| BestModelCheckpoint::new(&config.output_dir, stem.as_str()));

    let mut history = TrainingHistory::new();
    let mut logger = TrainingLogger::new(config.epochs);
    let mut epoch_rng = ChaCha8Rng::seed_from_u64(config.seed);
    let mut last_metrics = None;

    for epoch in 1..=config.epochs {
        logger.start_epoch(epoch - 1);

        let mut indices: Vec<usize> = (0..train_dataset.len()).collect();
        indices.shuffle(&mut epoch_rng);
        let num_batches = indices.len().div_ceil(config.batch_size);

        let pb = ProgressBar::new(num_batches as u64);
        pb.set_style(
            ProgressStyle::default_bar()
                .template("  {spinner:.green} [{bar:40.cyan/blue}] {pos}/{len} {msg}")
                .map_err(|e| PipelineError::Training(e.to_string()))?
                .progress_chars("#>-"),
        );

        let mut loss_sum = 0.0f64;
        let mut correct = 0usize;
        let mut seen = 0usize;

        for chunk in indices.chunks(config.batch_size) {
            let items: Vec<_> = chunk.iter().filter_map(|&i| train_dataset.get(i)).collect();
            if items.is_empty() {
                continue;
            }
            let batch: ImageBatch<B> = train_batcher.batch(items, device);
            let batch_size = batch.targets.dims()[0];

            let (loss, batch_correct) = batch_loss(&model, batch.images, batch.targets);
            let loss_value: f64 = loss.clone().into_scalar().elem();

            let grads = loss.backward();
            let grads = GradientsParams::from_grads(grads, &model);
            model = optimizer.step(config.learning_rate, model, grads);

            loss_sum += loss_value * batch_size as f64;
            correct += batch_correct;
            seen += batch_size;

            pb.inc(1);
            pb.set_message(format!(
                "loss: {:.4} - accuracy: {:.4}",
                loss_sum / seen as f64,
                correct as f64 / seen as f64
            ));
        }
        pb.finish_and_clear();

        let (val_loss, val_accuracy) =
            evaluate::<B>(&model, &val_dataset, &val_batcher, config.batch_size, device);

        let metrics = EpochMetrics {
            loss: loss_sum / seen.max(1) as f64,
            accuracy: correct as f64 / seen.max(1) as f64,
            val_loss,
            val_accuracy,
        };
        logger.end_epoch(
            metrics.loss,
            metrics.accuracy,
            metrics.val_loss,
            metrics.val_accuracy,
        );
        history.push(metrics);

        if let Some(checkpoint) = checkpoint.as_mut() {
            let metadata = ArtifactMetadata::new(
                model_config.clone(),
                train_folder.class_names.clone(),
                epoch,
                metrics,
            );
            checkpoint.on_epoch_end(&model, &metadata)?;
        }

        last_metrics = Some((epoch, metrics));
    }

    let checkpoint_best = checkpoint
        .as_ref()
        .and_then(|c| c.best_epoch().map(|epoch| (epoch, c.best())));
    let (best_epoch, best_val_accuracy) = checkpoint_best
        .or_else(|| history.best_val_accuracy())
        .ok_or_else(|| PipelineError::Training("no epoch completed".into()))?;
    logger.log_complete(best_val_accuracy);

    let history_csv = config.history_csv_path();
    let history_json = config.history_json_path();
    history.save(&history_csv, &history_json)?;

    let (last_epoch, last) = last_metrics
        .ok_or_else(|| PipelineError::Training("no epoch completed".into()))?;
    let metadata = ArtifactMetadata::new(
        model_config,
        train_folder.class_names.clone(),
        last_epoch,
        last,
    );
    println!("{}", "Saving Model...".cyan());
    let model_path = save_model(&model, &config.output_dir, &config.model_stem, &metadata)?;
    info!("Model saved to {}", model_path.display());

    Ok(TrainingOutcome {
        history,
        class_names: train_folder.class_names,
        best_val_accuracy,
        best_epoch,
        model_path,
        checkpoint_path: checkpoint.map(|c| c.path()),
        history_csv,
        history_json,
        integrity,
    })
}

/// Validation loss (sample-weighted mean) and accuracy, without augmentation
fn evaluate<B: AutodiffBackend>(
    model: &ImageClassifier<B>,
    dataset: &ImageFolderDataset,
    batcher: &ImageBatcher,
    batch_size: usize,
    device: &B::Device,
) -> (f64, f64) {
    let inner_model = model.valid();
    let len = dataset.len();

    let mut loss_sum = 0.0f64;
    let mut correct = 0usize;
    let mut total = 0usize;

    for start in (0..len).step_by(batch_size) {
        let end = (start + batch_size).min(len);
        let items: Vec<_> = (start..end).filter_map(|i| dataset.get(i)).collect();

        if items.is_empty() {
            continue;
        }

        let batch = Batcher::<B::InnerBackend, _, _>::batch(batcher, items, device);
        let n = batch.targets.dims()[0];

        let (loss, batch_correct) = batch_loss(&inner_model, batch.images, batch.targets);
        let loss_value: f64 = loss.into_scalar().elem();

        loss_sum += loss_value * n as f64;
        correct += batch_correct;
        total += n;
    }

    if total == 0 {
        return (0.0, 0.0);
    }

    (loss_sum / total as f64, correct as f64 / total as f64)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::training::config::Task;
    use burn::backend::Autodiff;
    use burn_ndarray::NdArray;
    use image::{ImageBuffer, Rgb};
    use std::fs;
    use std::path::Path;
    use tempfile::TempDir;

    type TestBackend = Autodiff<NdArray>;

    fn write_image(path: &Path, color: [u8; 3]) {
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        let img = ImageBuffer::from_fn(40, 40, |x, _| {
            if x % 8 < 4 {
                Rgb(color)
            } else {
                Rgb([color[0] / 2, color[1] / 2, color[2] / 2])
            }
        });
        img.save(path).unwrap();
    }

    fn build_tree(root: &Path, classes: &[(&str, [u8; 3])], per_class: usize) {
        for split in ["train", "val"] {
            for (class, color) in classes {
                for i in 0..per_class {
                    write_image(&root.join(split).join(class).join(format!("{i}.png")), *color);
                }
            }
        }
    }

    fn small_config(task: Task, root: &Path) -> TrainingConfig {
        TrainingConfig {
            train_dir: root.join("train"),
            val_dir: root.join("val"),
            output_dir: root.join("out"),
            image_size: 32,
            batch_size: 4,
            ..task.preset()
        }
    }

    #[test]
    fn test_binary_run_writes_history_and_model() {
        let tmp = TempDir::new().unwrap();
        build_tree(tmp.path(), &[("cat", [220, 40, 40]), ("dog", [40, 40, 220])], 3);
        // corrupted file is removed before loading
        let bad = tmp.path().join("train/cat/bad.png");
        fs::write(&bad, b"\x89PNG\r\n\x1a\n").unwrap();

        let config = small_config(Task::Binary, tmp.path());
        let device = Default::default();
        let outcome = run_training::<TestBackend>(&config, &device).unwrap();

        assert!(!bad.exists());
        assert_eq!(outcome.integrity.as_ref().unwrap().total_deleted(), 1);
        assert_eq!(outcome.class_names, vec!["cat", "dog"]);
        assert_eq!(outcome.history.epochs(), 2);
        assert!(outcome.checkpoint_path.is_none());
        assert!(outcome.model_path.ends_with("cats_vs_dogs_cnn.mpk"));
        assert!(outcome.model_path.exists());
        assert!(tmp.path().join("out/cats_vs_dogs_cnn.json").exists());
        assert_eq!(outcome.history_csv, config.history_csv_path());
        assert_eq!(
            Some((outcome.best_epoch, outcome.best_val_accuracy)),
            outcome.history.best_val_accuracy()
        );

        let loaded = TrainingHistory::load_json(&outcome.history_json).unwrap();
        assert_eq!(loaded, outcome.history);
        for acc in loaded.accuracy.iter().chain(&loaded.val_accuracy) {
            assert!((0.0..=1.0).contains(acc));
        }
        assert!(loaded.loss.iter().all(|l| l.is_finite()));
    }

    #[test]
    fn test_four_class_run_keeps_best_checkpoint() {
        let tmp = TempDir::new().unwrap();
        build_tree(
            tmp.path(),
            &[
                ("adeno", [200, 30, 30]),
                ("largecell", [30, 200, 30]),
                ("normal", [30, 30, 200]),
                ("squamouscell", [200, 200, 30]),
            ],
            2,
        );

        let config = TrainingConfig {
            epochs: 3,
            ..small_config(Task::FourClass, tmp.path())
        };
        let device = Default::default();
        let outcome = run_training::<TestBackend>(&config, &device).unwrap();

        assert_eq!(outcome.history.epochs(), 3);
        assert_eq!(outcome.class_names[2], "normal");

        let checkpoint = outcome.checkpoint_path.clone().unwrap();
        assert!(checkpoint.ends_with("best_model.mpk"));
        assert!(checkpoint.exists());

        let meta = ArtifactMetadata::load(&tmp.path().join("out/best_model.json")).unwrap();
        assert_eq!(meta.epoch, outcome.best_epoch);
        assert_eq!(meta.metrics.val_accuracy, outcome.best_val_accuracy);
        assert!(tmp.path().join("out/training_history_4class.csv").exists());
        assert!(tmp.path().join("out/4class_cnn.mpk").exists());
    }

    #[test]
    fn test_undecodable_image_aborts_run() {
        let tmp = TempDir::new().unwrap();
        build_tree(tmp.path(), &[("cat", [220, 40, 40]), ("dog", [40, 40, 220])], 2);
        // .bmp is loaded for training but not scanned by the cleaner
        let broken = tmp.path().join("train/cat/broken.bmp");
        fs::write(&broken, b"not a bitmap").unwrap();

        let config = small_config(Task::Binary, tmp.path());
        let device = Default::default();
        let result = run_training::<TestBackend>(&config, &device);

        assert!(matches!(result, Err(PipelineError::Image(path, _)) if path == broken));
        assert!(broken.exists());
        assert!(!tmp.path().join("out/cats_vs_dogs_cnn.mpk").exists());
    }

    #[test]
    fn test_wrong_class_count_is_rejected() {
        let tmp = TempDir::new().unwrap();
        build_tree(tmp.path(), &[("cat", [1, 2, 3])], 1);

        let config = small_config(Task::Binary, tmp.path());
        let device = Default::default();
        let result = run_training::<TestBackend>(&config, &device);

        assert!(matches!(result, Err(PipelineError::Dataset(_))));
    }
}
