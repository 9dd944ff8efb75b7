//! Training module
//!
//! This module provides:
//! - Run configuration with the binary and four-class presets
//! - The supervised training loop
//! - Per-epoch history export (CSV + JSON)
//! - Model artifacts and best-model checkpointing

pub mod checkpoint;
pub mod config;
pub mod history;
pub mod supervised;

pub use checkpoint::{load_model, save_model, ArtifactMetadata, BestModelCheckpoint, CheckpointDecision};
pub use config::{Task, TrainingConfig};
pub use history::{EpochMetrics, TrainingHistory};
pub use supervised::{run_training, TrainingOutcome};
