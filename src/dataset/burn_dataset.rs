//! Burn Dataset Integration
//!
//! Implements Burn's `Dataset` trait and `Batcher` for class-folder images.
//!
//! ## Batchers
//!
//! - `ImageBatcher`: rescale only (validation)
//! - `AugmentingBatcher`: random rotation/shift/flip per image (training)

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;

use burn::data::dataloader::batcher::Batcher;
use burn::data::dataset::Dataset;
use burn::prelude::*;
use image::{DynamicImage, ImageReader};
use indicatif::{ProgressBar, ProgressStyle};
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use rayon::prelude::*;
use tracing::info;

use crate::dataset::augmentation::{AugmentationConfig, Augmenter};
use crate::utils::{PipelineError, Result};

/// A decoded image already resized to the network input size
#[derive(Clone)]
pub struct ImageItem {
    pub image: DynamicImage,
    pub label: usize,
    /// Image path (for debugging/logging)
    pub path: String,
}

impl ImageItem {
    /// Decode and resize an image from disk
    pub fn from_path(path: &Path, label: usize, image_size: usize) -> Result<Self> {
        let img = ImageReader::open(path)?
            .with_guessed_format()?
            .decode()
            .map_err(|e| PipelineError::Image(path.to_path_buf(), e.to_string()))?;

        let image = Augmenter::no_augmentation(image_size as u32).resize(img);

        Ok(Self {
            image,
            label,
            path: path.to_string_lossy().to_string(),
        })
    }
}

impl std::fmt::Debug for ImageItem {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ImageItem")
            .field("label", &self.label)
            .field("path", &self.path)
            .field(
                "image_size",
                &format!("{}x{}", self.image.width(), self.image.height()),
            )
            .finish()
    }
}

/// In-memory dataset of resized images
#[derive(Clone)]
pub struct ImageFolderDataset {
    items: Vec<ImageItem>,
    image_size: usize,
}

impl std::fmt::Debug for ImageFolderDataset {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ImageFolderDataset")
            .field("len", &self.items.len())
            .field("image_size", &self.image_size)
            .finish()
    }
}

impl ImageFolderDataset {
    /// Load every sample into memory in parallel.
    ///
    /// Fails with the first image that cannot be decoded.
    pub fn new_cached(samples: Vec<(PathBuf, usize)>, image_size: usize) -> Result<Self> {
        let total = samples.len();
        info!("Pre-loading {} images at {}x{}", total, image_size, image_size);

        let pb = ProgressBar::new(total as u64);
        pb.set_style(
            ProgressStyle::default_bar()
                .template("  {spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} ({per_sec})")
                .map_err(|e| PipelineError::Dataset(e.to_string()))?
                .progress_chars("#>-"),
        );

        let loaded = AtomicUsize::new(0);

        let items = samples
            .par_iter()
            .map(|(path, label)| {
                let item = ImageItem::from_path(path, *label, image_size);
                let count = loaded.fetch_add(1, Ordering::Relaxed);
                if count % 100 == 0 {
                    pb.set_position(count as u64);
                }
                item
            })
            .collect::<Result<Vec<ImageItem>>>();

        let items = match items {
            Ok(items) => items,
            Err(e) => {
                pb.abandon();
                return Err(e);
            }
        };

        pb.finish_with_message(format!("Loaded {} images", items.len()));

        Ok(Self { items, image_size })
    }

    pub fn image_size(&self) -> usize {
        self.image_size
    }

    /// Samples per label, indexed by label
    pub fn class_distribution(&self, num_classes: usize) -> Vec<usize> {
        let mut counts = vec![0usize; num_classes];
        for item in &self.items {
            if item.label < num_classes {
                counts[item.label] += 1;
            }
        }
        counts
    }
}

impl Dataset<ImageItem> for ImageFolderDataset {
    fn get(&self, index: usize) -> Option<ImageItem> {
        self.items.get(index).cloned()
    }

    fn len(&self) -> usize {
        self.items.len()
    }
}

/// A batch of images for training
#[derive(Clone, Debug)]
pub struct ImageBatch<B: Backend> {
    /// Shape [batch_size, 3, height, width], values in [0, 1]
    pub images: Tensor<B, 4>,
    /// Shape [batch_size]
    pub targets: Tensor<B, 1, Int>,
}

fn build_batch<B: Backend>(
    images_data: Vec<f32>,
    targets_data: Vec<i64>,
    image_size: usize,
    device: &B::Device,
) -> ImageBatch<B> {
    let batch_size = targets_data.len();

    let images = Tensor::<B, 4>::from_floats(
        TensorData::new(images_data, [batch_size, 3, image_size, image_size]),
        device,
    );
    let targets =
        Tensor::<B, 1, Int>::from_data(TensorData::new(targets_data, [batch_size]), device);

    ImageBatch { images, targets }
}

/// Batcher that only rescales pixels to [0, 1]
#[derive(Clone, Debug)]
pub struct ImageBatcher {
    augmenter: Augmenter,
}

impl ImageBatcher {
    pub fn new(image_size: usize) -> Self {
        Self {
            augmenter: Augmenter::no_augmentation(image_size as u32),
        }
    }
}

impl<B: Backend> Batcher<B, ImageItem, ImageBatch<B>> for ImageBatcher {
    fn batch(&self, items: Vec<ImageItem>, device: &B::Device) -> ImageBatch<B> {
        let image_size = self.augmenter.image_size() as usize;
        let mut images_data = Vec::with_capacity(items.len() * 3 * image_size * image_size);
        let mut targets_data = Vec::with_capacity(items.len());

        for item in items {
            images_data.extend(self.augmenter.preprocess(item.image, None));
            targets_data.push(item.label as i64);
        }

        build_batch(images_data, targets_data, image_size, device)
    }
}

/// Batcher that applies on-the-fly augmentation
///
/// Each batch draws from its own RNG seeded with `seed + batch counter`, so a
/// run with a fixed seed sees the same augmentations.
#[derive(Clone, Debug)]
pub struct AugmentingBatcher {
    augmenter: Augmenter,
    seed: u64,
    batches: Arc<AtomicU64>,
}

impl AugmentingBatcher {
    /// Batcher with the default training augmentation
    pub fn new(image_size: usize, seed: u64) -> Self {
        Self::with_config(image_size, AugmentationConfig::default(), seed)
    }

    pub fn with_config(image_size: usize, config: AugmentationConfig, seed: u64) -> Self {
        Self {
            augmenter: Augmenter::new(config, image_size as u32),
            seed,
            batches: Arc::new(AtomicU64::new(0)),
        }
    }
}

impl<B: Backend> Batcher<B, ImageItem, ImageBatch<B>> for AugmentingBatcher {
    fn batch(&self, items: Vec<ImageItem>, device: &B::Device) -> ImageBatch<B> {
        let image_size = self.augmenter.image_size() as usize;
        let mut images_data = Vec::with_capacity(items.len() * 3 * image_size * image_size);
        let mut targets_data = Vec::with_capacity(items.len());

        let batch_index = self.batches.fetch_add(1, Ordering::Relaxed);
        let mut rng = ChaCha8Rng::seed_from_u64(self.seed.wrapping_add(batch_index));

        for item in items {
            images_data.extend(self.augmenter.preprocess(item.image, Some(&mut rng)));
            targets_data.push(item.label as i64);
        }

        build_batch(images_data, targets_data, image_size, device)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn_ndarray::NdArray;
    use image::{ImageBuffer, Rgb};
    use tempfile::TempDir;

    type TestBackend = NdArray;

    fn solid(value: u8, size: u32) -> DynamicImage {
        DynamicImage::ImageRgb8(ImageBuffer::from_pixel(size, size, Rgb([value, value, value])))
    }

    fn item(value: u8, label: usize) -> ImageItem {
        ImageItem {
            image: solid(value, 16),
            label,
            path: format!("{}.png", value),
        }
    }

    #[test]
    fn test_from_path_resizes() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("1.png");
        solid(255, 40).save(&path).unwrap();

        let item = ImageItem::from_path(&path, 1, 16).unwrap();

        assert_eq!(item.image.width(), 16);
        assert_eq!(item.image.height(), 16);
        assert_eq!(item.label, 1);
    }

    #[test]
    fn test_new_cached_counts_per_class() {
        let tmp = TempDir::new().unwrap();
        let mut samples = Vec::new();
        for (i, label) in [0, 1, 1].into_iter().enumerate() {
            let path = tmp.path().join(format!("{i}.png"));
            solid(10, 20).save(&path).unwrap();
            samples.push((path, label));
        }

        let dataset = ImageFolderDataset::new_cached(samples, 16).unwrap();

        assert_eq!(dataset.len(), 3);
        assert_eq!(dataset.image_size(), 16);
        assert_eq!(dataset.class_distribution(2), vec![1, 2]);
    }

    #[test]
    fn test_new_cached_fails_on_undecodable_file() {
        let tmp = TempDir::new().unwrap();
        let good = tmp.path().join("good.png");
        let bad = tmp.path().join("bad.bmp");
        solid(10, 20).save(&good).unwrap();
        std::fs::write(&bad, b"nope").unwrap();

        let result = ImageFolderDataset::new_cached(vec![(good, 0), (bad.clone(), 1)], 16);

        assert!(matches!(result, Err(PipelineError::Image(path, _)) if path == bad));
    }

    #[test]
    fn test_image_batcher_rescales() {
        let device = Default::default();
        let batcher = ImageBatcher::new(16);

        let batch: ImageBatch<TestBackend> =
            batcher.batch(vec![item(255, 1), item(0, 0), item(51, 1)], &device);

        assert_eq!(batch.images.dims(), [3, 3, 16, 16]);
        assert_eq!(batch.targets.dims(), [3]);

        let values: Vec<f32> = batch.images.into_data().to_vec().unwrap();
        assert!((values[0] - 1.0).abs() < 1e-6);
        assert!(values[3 * 16 * 16].abs() < 1e-6);
        assert!((values[2 * 3 * 16 * 16] - 0.2).abs() < 1e-6);

        let targets: Vec<i64> = batch.targets.into_data().to_vec().unwrap();
        assert_eq!(targets, vec![1, 0, 1]);
    }

    #[test]
    fn test_augmenting_batcher_keeps_shape_and_range() {
        let device = Default::default();
        let batcher = AugmentingBatcher::new(16, 42);

        let batch: ImageBatch<TestBackend> = batcher.batch(vec![item(200, 0), item(30, 1)], &device);

        assert_eq!(batch.images.dims(), [2, 3, 16, 16]);
        let values: Vec<f32> = batch.images.into_data().to_vec().unwrap();
        assert!(values.iter().all(|v| (0.0..=1.0).contains(v)));
    }

    #[test]
    fn test_augmenting_batcher_is_reproducible() {
        let device = Default::default();
        let gradient = DynamicImage::ImageRgb8(ImageBuffer::from_fn(16, 16, |x, y| {
            Rgb([(x * 15) as u8, (y * 15) as u8, 0])
        }));
        let items = vec![ImageItem {
            image: gradient,
            label: 0,
            path: "g.png".into(),
        }];

        let a: ImageBatch<TestBackend> = AugmentingBatcher::new(16, 9).batch(items.clone(), &device);
        let b: ImageBatch<TestBackend> = AugmentingBatcher::new(16, 9).batch(items, &device);

        let a: Vec<f32> = a.images.into_data().to_vec().unwrap();
        let b: Vec<f32> = b.images.into_data().to_vec().unwrap();
        assert_eq!(a, b);
    }
}
