//! Model module for CNN architectures using the Burn framework
//!
//! This module provides:
//! - The three-stage convolutional classifier
//! - Its configuration (saved as JSON next to every artifact)
//! - A per-layer summary with parameter counts

pub mod cnn;

pub use cnn::{CnnConfig, ConvBlock, ImageClassifier, LayerSummary, ModelSummary};

/// Default dropout rate before the output layer
pub const DEFAULT_DROPOUT: f64 = 0.5;
