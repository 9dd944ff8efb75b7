//! # CNN Pipeline
//!
//! Dataset preparation and small CNN training pipelines built on the Burn
//! framework: cats vs dogs (binary) and lung CT (adeno, largecell,
//! squamouscell, normal).
//!
//! ## Modules
//!
//! - `dataset`: Split consolidation, filename normalization, corrupted-image
//!   removal, class-folder loading and augmentation
//! - `model`: Three-stage CNN built with Burn
//! - `training`: Training loop, history export and checkpointing
//! - `utils`: Logging, errors and helper functions
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use cnn_pipeline::backend::{default_device, TrainingBackend};
//! use cnn_pipeline::training::{run_training, TrainingConfig};
//!
//! let outcome = run_training::<TrainingBackend>(&TrainingConfig::four_class(), &default_device())?;
//! outcome.print();
//! ```

pub mod backend;
pub mod dataset;
pub mod model;
pub mod training;
pub mod utils;

pub use dataset::{
    consolidate_splits, normalize_filenames, remove_invalid_images, ConsolidateConfig,
    ImageFolder, NormalizeConfig,
};
pub use model::{CnnConfig, ImageClassifier};
pub use training::{run_training, Task, TrainingConfig, TrainingHistory, TrainingOutcome};
pub use utils::error::{PipelineError, Result};
