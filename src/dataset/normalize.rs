//! Filename Normalization
//!
//! Strips alphabetic prefixes from image file names inside class folders so
//! every image is named by its numeric ID only (`img_0042.png` -> `0042.png`).
//!
//! Two different files can reduce to the same numeric name (`a12.jpg` and
//! `b12.jpg`). The second one is left untouched and reported as a collision;
//! an existing file is never overwritten.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, warn};

use crate::dataset::{LUNG_CLASSES, RENAME_EXTENSIONS};
use crate::utils::{has_extension, Result};

/// Optional letter/underscore prefix followed by the digit run we keep
static NUMERIC_ID: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"([A-Za-z_]+)?(\d+)").expect("static regex is valid"));

/// Configuration for the normalizer
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NormalizeConfig {
    /// Root holding one folder per class
    pub root: PathBuf,
    /// Class folder names to process
    pub classes: Vec<String>,
}

impl Default for NormalizeConfig {
    fn default() -> Self {
        Self {
            root: PathBuf::from("dataset_j"),
            classes: LUNG_CLASSES.iter().map(|c| c.to_string()).collect(),
        }
    }
}

/// A file that was not renamed because its target already exists
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RenameCollision {
    pub source: PathBuf,
    pub target: PathBuf,
}

/// A rename that the filesystem refused
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RenameFailure {
    pub source: PathBuf,
    pub reason: String,
}

/// Outcome of a normalization run
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NormalizeReport {
    /// Renamed file count per class folder
    pub renamed_per_class: BTreeMap<String, usize>,
    pub collisions: Vec<RenameCollision>,
    pub failures: Vec<RenameFailure>,
    /// Images left alone because their name is not valid UTF-8
    pub skipped_non_utf8: Vec<PathBuf>,
    /// Class folders that did not exist
    pub missing_classes: Vec<String>,
}

impl NormalizeReport {
    pub fn total_renamed(&self) -> usize {
        self.renamed_per_class.values().sum()
    }
}

/// Split a file name into stem and extension (with its dot).
///
/// A leading dot does not start an extension, so `.hidden` has no extension.
fn split_file_name(file_name: &str) -> (&str, &str) {
    match file_name.rfind('.') {
        Some(idx) if idx > 0 => file_name.split_at(idx),
        _ => (file_name, ""),
    }
}

/// Numeric file name for `file_name`, or `None` when it should stay as is.
///
/// The extension is lowercased in the returned name. `None` means either no
/// digit run exists in the stem or the stem already is that digit run.
pub fn numeric_file_name(file_name: &str) -> Option<String> {
    let (stem, ext) = split_file_name(file_name);
    let digits = NUMERIC_ID.captures(stem)?.get(2)?.as_str();

    if digits == stem {
        return None;
    }

    Some(format!("{}{}", digits, ext.to_lowercase()))
}

/// Rename every image in each configured class folder to its numeric ID.
pub fn normalize_filenames(config: &NormalizeConfig) -> Result<NormalizeReport> {
    info!("Target directory: {}", config.root.display());

    let mut report = NormalizeReport::default();

    for class_name in &config.classes {
        let target_dir = config.root.join(class_name);

        if !target_dir.is_dir() {
            warn!(
                "Class folder '{}' not found, skipping",
                target_dir.display()
            );
            report.missing_classes.push(class_name.clone());
            continue;
        }

        let renamed = normalize_class_dir(&target_dir, &mut report)?;
        info!("Class '{}': renamed {} files", class_name, renamed);
        report.renamed_per_class.insert(class_name.clone(), renamed);
    }

    info!(
        "Normalization complete: {} files renamed, {} collisions, {} failures",
        report.total_renamed(),
        report.collisions.len(),
        report.failures.len()
    );

    Ok(report)
}

fn normalize_class_dir(dir: &Path, report: &mut NormalizeReport) -> Result<usize> {
    let mut entries: Vec<PathBuf> = fs::read_dir(dir)?
        .map(|entry| entry.map(|e| e.path()))
        .collect::<std::io::Result<_>>()?;
    entries.sort();

    let mut renamed = 0usize;

    for src_path in entries {
        let Some(os_name) = src_path.file_name() else {
            continue;
        };

        if src_path.is_dir() || os_name.to_string_lossy().starts_with('.') {
            continue;
        }

        if !has_extension(&src_path, RENAME_EXTENSIONS) {
            continue;
        }

        let Some(file_name) = os_name.to_str() else {
            warn!("Skipping non UTF-8 file name {}", src_path.display());
            report.skipped_non_utf8.push(src_path);
            continue;
        };

        let Some(new_name) = numeric_file_name(file_name) else {
            continue;
        };

        let dst_path = dir.join(&new_name);
        if dst_path.exists() {
            error!(
                "Rename collision: {} -> {} already exists, keeping original name",
                file_name, new_name
            );
            report.collisions.push(RenameCollision {
                source: src_path,
                target: dst_path,
            });
            continue;
        }

        if apply_rename(src_path, &dst_path, report) {
            renamed += 1;
        }
    }

    Ok(renamed)
}

/// Rename `src_path` to `dst_path`, recording a failure in `report`
fn apply_rename(src_path: PathBuf, dst_path: &Path, report: &mut NormalizeReport) -> bool {
    match fs::rename(&src_path, dst_path) {
        Ok(()) => {
            debug!("Renamed: {} -> {}", src_path.display(), dst_path.display());
            true
        }
        Err(e) => {
            error!("Rename failed: {}. Cause: {}", src_path.display(), e);
            report.failures.push(RenameFailure {
                source: src_path,
                reason: e.to_string(),
            });
            false
        }
    }
}
