//! Dataset module: preparing image folders and feeding them to Burn
//!
//! This module provides:
//! - Consolidation of split folders into class folders
//! - Filename normalization to numeric IDs
//! - Removal of images that fail to decode
//! - Class-folder scanning and Burn dataset/batcher implementations
//! - Training-time augmentation

pub mod augmentation;
pub mod burn_dataset;
pub mod consolidate;
pub mod integrity;
pub mod loader;
pub mod normalize;

pub use augmentation::{AugmentationConfig, Augmenter};
pub use burn_dataset::{AugmentingBatcher, ImageBatch, ImageBatcher, ImageFolderDataset, ImageItem};
pub use consolidate::{consolidate_splits, ConsolidateConfig, ConsolidationReport};
pub use integrity::{remove_invalid_images, remove_invalid_images_in, IntegrityReport};
pub use loader::{DatasetStats, ImageFolder, ImageSample};
pub use normalize::{normalize_filenames, NormalizeConfig, NormalizeReport};

/// Lung CT class folders, in processing order
pub const LUNG_CLASSES: [&str; 4] = ["adeno", "largecell", "squamouscell", "normal"];

/// Extensions the filename normalizer touches
pub const RENAME_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png", "bmp"];

/// Extensions the corrupted-image filter decodes
pub const INTEGRITY_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png"];

/// Extensions picked up when scanning class folders for training
pub const LOADER_EXTENSIONS: &[&str] = &["png", "jpg", "jpeg", "bmp", "ppm", "tif", "tiff"];

/// Square side every image is resized to before entering the network
pub const DEFAULT_IMAGE_SIZE: usize = 128;
