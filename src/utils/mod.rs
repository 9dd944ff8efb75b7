//! Utilities module for logging, errors, and small helpers
//!
//! This module provides:
//! - Structured logging with tracing
//! - The shared error type
//! - Filesystem helpers used by every pipeline stage

pub mod error;
pub mod logging;

use std::path::Path;

pub use error::{PipelineError, Result};
pub use logging::init_logging;

/// Lowercased extension of a path, without the dot
pub fn lowercase_extension(path: &Path) -> Option<String> {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_lowercase())
}

/// Whether the path's lowercased extension is one of `allowed`
pub fn has_extension(path: &Path, allowed: &[&str]) -> bool {
    lowercase_extension(path)
        .map(|ext| allowed.contains(&ext.as_str()))
        .unwrap_or(false)
}

/// Format a duration in a human-readable way
pub fn format_duration(seconds: f64) -> String {
    if seconds < 60.0 {
        format!("{:.1}s", seconds)
    } else if seconds < 3600.0 {
        let minutes = (seconds / 60.0).floor();
        let secs = seconds % 60.0;
        format!("{}m {:.0}s", minutes as u32, secs)
    } else {
        let hours = (seconds / 3600.0).floor();
        let minutes = ((seconds % 3600.0) / 60.0).floor();
        format!("{}h {}m", hours as u32, minutes as u32)
    }
}
