//! Dataset Consolidation
//!
//! Merges a split-organised dataset (`<source>/<split>/<class>/*`) into one
//! folder per class (`<dest>/<class>/*`). Files are copied, never moved, and
//! a name that already exists in the destination gets a `_N` suffix instead
//! of being overwritten.

use std::ffi::{OsStr, OsString};
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::dataset::LUNG_CLASSES;
use crate::utils::error::ResultExt;
use crate::utils::Result;

/// Configuration for consolidating split folders into class folders
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConsolidateConfig {
    /// Root holding the split folders
    pub source_root: PathBuf,
    /// Root receiving one folder per class
    pub dest_root: PathBuf,
    /// Split folder names, processed in this order
    pub splits: Vec<String>,
    /// Class folder names
    pub classes: Vec<String>,
}

impl Default for ConsolidateConfig {
    fn default() -> Self {
        Self {
            source_root: PathBuf::from("data_j"),
            dest_root: PathBuf::from("dataset_j"),
            splits: vec!["train".into(), "valid".into(), "test".into()],
            classes: LUNG_CLASSES.iter().map(|c| c.to_string()).collect(),
        }
    }
}

/// What a consolidation run did
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConsolidationReport {
    /// Files copied into the destination
    pub copied: usize,
    /// Copies that needed a `_N` suffix
    pub renamed_on_collision: usize,
    /// Source `<split>/<class>` folders that did not exist
    pub missing_dirs: Vec<PathBuf>,
}

/// Copy every file of every `<split>/<class>` folder into `<dest>/<class>`.
pub fn consolidate_splits(config: &ConsolidateConfig) -> Result<ConsolidationReport> {
    for class in &config.classes {
        fs::create_dir_all(config.dest_root.join(class))?;
    }

    let mut report = ConsolidationReport::default();

    for split in &config.splits {
        for class in &config.classes {
            let src_dir = config.source_root.join(split).join(class);
            let dst_dir = config.dest_root.join(class);

            if !src_dir.is_dir() {
                warn!("Skipping missing folder: {}", src_dir.display());
                report.missing_dirs.push(src_dir);
                continue;
            }

            let mut entries: Vec<PathBuf> = fs::read_dir(&src_dir)?
                .map(|entry| entry.map(|e| e.path()))
                .collect::<std::io::Result<_>>()?;
            entries.sort();

            for src_path in entries {
                if src_path.is_dir() {
                    debug!("Skipping nested directory {}", src_path.display());
                    continue;
                }

                let Some(file_name) = src_path.file_name() else {
                    continue;
                };

                let dst_path = free_destination(&dst_dir, file_name);
                if dst_path.file_name() != Some(file_name) {
                    report.renamed_on_collision += 1;
                }

                fs::copy(&src_path, &dst_path).with_context(|| {
                    format!("copy {} -> {}", src_path.display(), dst_path.display())
                })?;
                report.copied += 1;
            }

            info!("Copied: {} -> {}", src_dir.display(), dst_dir.display());
        }
    }

    Ok(report)
}

/// First path in `dir` for `file_name` that does not exist yet.
///
/// `a001.jpg` becomes `a001_1.jpg`, then `a001_2.jpg`, and so on.
pub fn free_destination(dir: &Path, file_name: &OsStr) -> PathBuf {
    let candidate = dir.join(file_name);
    if !candidate.exists() {
        return candidate;
    }

    let name = Path::new(file_name);
    let stem = name.file_stem().unwrap_or(file_name);
    let mut i = 1usize;
    loop {
        let mut suffixed = OsString::from(stem);
        suffixed.push(format!("_{i}"));
        if let Some(ext) = name.extension() {
            suffixed.push(".");
            suffixed.push(ext);
        }

        let candidate = dir.join(suffixed);
        if !candidate.exists() {
            return candidate;
        }
        i += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::PipelineError;
    use tempfile::TempDir;

    fn write(path: &Path, contents: &str) {
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, contents).unwrap();
    }

    fn config_for(tmp: &TempDir) -> ConsolidateConfig {
        ConsolidateConfig {
            source_root: tmp.path().join("data_j"),
            dest_root: tmp.path().join("dataset_j"),
            ..Default::default()
        }
    }

    #[test]
    fn test_collision_gets_suffix() {
        let tmp = TempDir::new().unwrap();
        write(&tmp.path().join("data_j/train/adeno/a001.jpg"), "train");
        write(&tmp.path().join("data_j/valid/adeno/a001.jpg"), "valid");

        let report = consolidate_splits(&config_for(&tmp)).unwrap();

        let dst = tmp.path().join("dataset_j/adeno");
        assert_eq!(fs::read_to_string(dst.join("a001.jpg")).unwrap(), "train");
        assert_eq!(fs::read_to_string(dst.join("a001_1.jpg")).unwrap(), "valid");
        assert_eq!(report.copied, 2);
        assert_eq!(report.renamed_on_collision, 1);
    }

    #[test]
    fn test_free_destination_keeps_extension() {
        let tmp = TempDir::new().unwrap();
        write(&tmp.path().join("archive.tar.gz"), "x");
        write(&tmp.path().join(".hidden"), "x");

        assert_eq!(
            free_destination(tmp.path(), OsStr::new("archive.tar.gz")),
            tmp.path().join("archive.tar_1.gz")
        );
        assert_eq!(
            free_destination(tmp.path(), OsStr::new(".hidden")),
            tmp.path().join(".hidden_1")
        );
        assert_eq!(
            free_destination(tmp.path(), OsStr::new("new.jpg")),
            tmp.path().join("new.jpg")
        );
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn test_non_utf8_names_are_copied() {
        use std::os::unix::ffi::OsStrExt;

        let tmp = TempDir::new().unwrap();
        let name = OsStr::from_bytes(b"a\xff1.jpg");
        write(&tmp.path().join("data_j/train/adeno").join(name), "train");
        write(&tmp.path().join("data_j/valid/adeno").join(name), "valid");

        let report = consolidate_splits(&config_for(&tmp)).unwrap();

        let dst = tmp.path().join("dataset_j/adeno");
        assert_eq!(report.copied, 2);
        assert_eq!(report.renamed_on_collision, 1);
        assert_eq!(fs::read_to_string(dst.join(name)).unwrap(), "train");
        assert_eq!(
            fs::read_to_string(dst.join(OsStr::from_bytes(b"a\xff1_1.jpg"))).unwrap(),
            "valid"
        );
    }

    #[cfg(unix)]
    #[test]
    fn test_copy_failure_keeps_io_error() {
        let tmp = TempDir::new().unwrap();
        let src_dir = tmp.path().join("data_j/train/normal");
        fs::create_dir_all(&src_dir).unwrap();
        std::os::unix::fs::symlink(tmp.path().join("gone.png"), src_dir.join("n1.png")).unwrap();

        let err = consolidate_splits(&config_for(&tmp)).unwrap_err();

        assert!(matches!(
            err,
            PipelineError::IoContext(_, ref e) if e.kind() == std::io::ErrorKind::NotFound
        ));
        assert!(err.to_string().contains("n1.png"));
    }

    #[test]
    fn test_never_overwrites_existing_destination() {
        let tmp = TempDir::new().unwrap();
        write(&tmp.path().join("dataset_j/normal/n1.png"), "already here");
        write(&tmp.path().join("dataset_j/normal/n1_1.png"), "also here");
        write(&tmp.path().join("data_j/test/normal/n1.png"), "incoming");

        consolidate_splits(&config_for(&tmp)).unwrap();

        let dst = tmp.path().join("dataset_j/normal");
        assert_eq!(fs::read_to_string(dst.join("n1.png")).unwrap(), "already here");
        assert_eq!(fs::read_to_string(dst.join("n1_1.png")).unwrap(), "also here");
        assert_eq!(fs::read_to_string(dst.join("n1_2.png")).unwrap(), "incoming");
    }

    #[test]
    fn test_sources_are_left_in_place() {
        let tmp = TempDir::new().unwrap();
        let src = tmp.path().join("data_j/train/largecell/l7.jpg");
        write(&src, "x");

        consolidate_splits(&config_for(&tmp)).unwrap();

        assert!(src.exists());
        assert!(tmp.path().join("dataset_j/largecell/l7.jpg").exists());
    }

    #[test]
    fn test_missing_folders_are_skipped() {
        let tmp = TempDir::new().unwrap();
        write(&tmp.path().join("data_j/train/squamouscell/s1.jpg"), "x");

        let report = consolidate_splits(&config_for(&tmp)).unwrap();

        assert_eq!(report.copied, 1);
        // 3 splits x 4 classes, only one present
        assert_eq!(report.missing_dirs.len(), 11);
        for class in LUNG_CLASSES {
            assert!(tmp.path().join("dataset_j").join(class).is_dir());
        }
    }
}
