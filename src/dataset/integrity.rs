//! Corrupted Image Filter
//!
//! Walks a directory tree, fully decodes every JPEG/PNG file and deletes the
//! ones the decoder rejects. Deletions are counted per directory.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use image::ImageReader;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};
use walkdir::WalkDir;

use crate::dataset::INTEGRITY_EXTENSIONS;
use crate::utils::{has_extension, PipelineError, Result};

/// Result of scanning one tree
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct IntegrityReport {
    /// Image files that were checked
    pub scanned: usize,
    /// Deleted file count per directory, only for directories with deletions
    pub deleted_per_dir: BTreeMap<PathBuf, usize>,
}

impl IntegrityReport {
    pub fn total_deleted(&self) -> usize {
        self.deleted_per_dir.values().sum()
    }

    /// Fold another report into this one
    pub fn merge(&mut self, other: IntegrityReport) {
        self.scanned += other.scanned;
        for (dir, count) in other.deleted_per_dir {
            *self.deleted_per_dir.entry(dir).or_default() += count;
        }
    }
}

/// Whether the image at `path` decodes.
///
/// `Ok(false)` means the bytes are corrupt. Failing to open or read the file
/// is an error, not corruption.
pub fn is_valid_image(path: &Path) -> Result<bool> {
    let reader = ImageReader::open(path)?.with_guessed_format()?;

    match reader.decode() {
        Ok(_) => Ok(true),
        Err(e) => {
            debug!("Decode failed for {}: {}", path.display(), e);
            Ok(false)
        }
    }
}

/// Delete every undecodable image under `base_dir`.
pub fn remove_invalid_images(base_dir: &Path) -> Result<IntegrityReport> {
    if !base_dir.is_dir() {
        return Err(PipelineError::PathNotFound(base_dir.to_path_buf()));
    }

    let mut report = IntegrityReport::default();

    for entry in WalkDir::new(base_dir).sort_by_file_name() {
        let entry = entry?;
        if !entry.file_type().is_file() || !has_extension(entry.path(), INTEGRITY_EXTENSIONS) {
            continue;
        }

        report.scanned += 1;
        let path = entry.path();

        if !is_valid_image(path)? {
            fs::remove_file(path)?;
            let dir = path.parent().unwrap_or(base_dir).to_path_buf();
            *report.deleted_per_dir.entry(dir).or_default() += 1;
        }
    }

    for (dir, count) in &report.deleted_per_dir {
        info!("{}: deleted {} corrupted images", dir.display(), count);
    }

    Ok(report)
}

/// Run the filter over several trees and merge the reports.
pub fn remove_invalid_images_in<P: AsRef<Path>>(dirs: &[P]) -> Result<IntegrityReport> {
    let mut report = IntegrityReport::default();
    for dir in dirs {
        report.merge(remove_invalid_images(dir.as_ref())?);
    }
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{ImageBuffer, Rgb};
    use tempfile::TempDir;

    fn write_png(path: &Path) {
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        let img = ImageBuffer::from_fn(16, 16, |x, y| Rgb([x as u8 * 10, y as u8 * 10, 90u8]));
        img.save(path).unwrap();
    }

    fn write_truncated_png(path: &Path) {
        write_png(path);
        let bytes = fs::read(path).unwrap();
        fs::write(path, &bytes[..12]).unwrap();
    }

    #[test]
    fn test_valid_image_is_kept() {
        let tmp = TempDir::new().unwrap();
        let good = tmp.path().join("train/cat/1.png");
        write_png(&good);

        let report = remove_invalid_images(&tmp.path().join("train")).unwrap();

        assert!(good.exists());
        assert_eq!(report.scanned, 1);
        assert_eq!(report.total_deleted(), 0);
    }

    #[test]
    fn test_truncated_png_is_removed_and_counted() {
        let tmp = TempDir::new().unwrap();
        let cat_dir = tmp.path().join("dataset_sr/train/cat");
        write_png(&cat_dir.join("ok.png"));
        write_truncated_png(&cat_dir.join("bad.png"));

        let report = remove_invalid_images(&tmp.path().join("dataset_sr/train")).unwrap();

        assert!(!cat_dir.join("bad.png").exists());
        assert!(cat_dir.join("ok.png").exists());
        assert_eq!(report.deleted_per_dir.get(&cat_dir), Some(&1));
        assert_eq!(report.total_deleted(), 1);
    }

    #[test]
    fn test_garbage_with_image_extension_is_removed() {
        let tmp = TempDir::new().unwrap();
        let dog_dir = tmp.path().join("val/dog");
        fs::create_dir_all(&dog_dir).unwrap();
        fs::write(dog_dir.join("noise.jpg"), b"definitely not a jpeg").unwrap();

        let report = remove_invalid_images(&tmp.path().join("val")).unwrap();

        assert!(!dog_dir.join("noise.jpg").exists());
        assert_eq!(report.deleted_per_dir.get(&dog_dir), Some(&1));
    }

    #[test]
    fn test_other_extensions_are_ignored() {
        let tmp = TempDir::new().unwrap();
        let dir = tmp.path().join("train/cat");
        fs::create_dir_all(&dir).unwrap();
        fs::write(dir.join("labels.txt"), b"cat").unwrap();
        fs::write(dir.join("broken.bmp"), b"not a bmp").unwrap();

        let report = remove_invalid_images(&tmp.path().join("train")).unwrap();

        assert!(dir.join("labels.txt").exists());
        assert!(dir.join("broken.bmp").exists());
        assert_eq!(report.scanned, 0);
    }

    #[test]
    fn test_missing_root_is_an_error() {
        let tmp = TempDir::new().unwrap();
        let result = remove_invalid_images(&tmp.path().join("nope"));
        assert!(matches!(result, Err(PipelineError::PathNotFound(_))));
    }

    #[test]
    fn test_merge_reports_across_trees() {
        let tmp = TempDir::new().unwrap();
        write_truncated_png(&tmp.path().join("train/cat/a.png"));
        write_truncated_png(&tmp.path().join("val/cat/b.png"));
        write_png(&tmp.path().join("val/dog/c.png"));

        let report = remove_invalid_images_in(&[tmp.path().join("train"), tmp.path().join("val")])
            .unwrap();

        assert_eq!(report.scanned, 3);
        assert_eq!(report.total_deleted(), 2);
        assert_eq!(report.deleted_per_dir.len(), 2);
    }
}
