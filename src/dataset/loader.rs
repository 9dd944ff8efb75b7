//! Class-Folder Dataset Loader
//!
//! Scans a `<root>/<class>/...` tree into labelled samples. Class labels are
//! the sorted class folder names, so `cat`/`dog` map to 0/1 and
//! `adeno`/`largecell`/`normal`/`squamouscell` map to 0..4.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{debug, info};
use walkdir::WalkDir;

use crate::dataset::LOADER_EXTENSIONS;
use crate::utils::{has_extension, PipelineError, Result};

/// A single image sample with its label
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageSample {
    /// Path to the image file
    pub path: PathBuf,
    /// Class label index
    pub label: usize,
    /// Class folder name
    pub class_name: String,
}

/// Images found under a class-folder tree
#[derive(Debug, Clone)]
pub struct ImageFolder {
    pub root_dir: PathBuf,
    /// Samples grouped by class, classes in label order
    pub samples: Vec<ImageSample>,
    /// Label index -> class name
    pub class_names: Vec<String>,
}

impl ImageFolder {
    /// Scan `root_dir`, one subdirectory per class.
    ///
    /// ```text
    /// root_dir/
    /// ├── cat/
    /// │   ├── 1.jpg
    /// │   └── 2.jpg
    /// └── dog/
    ///     └── ...
    /// ```
    pub fn new<P: AsRef<Path>>(root_dir: P) -> Result<Self> {
        let root_dir = root_dir.as_ref().to_path_buf();
        info!("Scanning class folders in: {}", root_dir.display());

        if !root_dir.is_dir() {
            return Err(PipelineError::PathNotFound(root_dir));
        }

        let mut class_names: Vec<String> = Vec::new();
        for entry in std::fs::read_dir(&root_dir)? {
            let entry = entry?;
            if entry.file_type()?.is_dir() {
                if let Some(name) = entry.file_name().to_str() {
                    if !name.starts_with('.') {
                        class_names.push(name.to_string());
                    }
                }
            }
        }
        class_names.sort();

        let mut samples = Vec::new();
        for (label, class_name) in class_names.iter().enumerate() {
            let class_dir = root_dir.join(class_name);
            let before = samples.len();

            for entry in WalkDir::new(&class_dir)
                .min_depth(1)
                .sort_by_file_name()
                .into_iter()
            {
                let entry = entry?;
                if entry.file_type().is_file() && has_extension(entry.path(), LOADER_EXTENSIONS) {
                    samples.push(ImageSample {
                        path: entry.path().to_path_buf(),
                        label,
                        class_name: class_name.clone(),
                    });
                }
            }

            debug!(
                "Class '{}' (label {}): {} images",
                class_name,
                label,
                samples.len() - before
            );
        }

        info!(
            "Found {} images belonging to {} classes.",
            samples.len(),
            class_names.len()
        );

        Ok(Self {
            root_dir,
            samples,
            class_names,
        })
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn num_classes(&self) -> usize {
        self.class_names.len()
    }

    /// `(path, label)` pairs in scan order
    pub fn labelled_paths(&self) -> Vec<(PathBuf, usize)> {
        self.samples
            .iter()
            .map(|s| (s.path.clone(), s.label))
            .collect()
    }

    /// Fail unless the tree has exactly `expected` class folders
    pub fn expect_classes(&self, expected: usize) -> Result<()> {
        if self.num_classes() != expected {
            return Err(PipelineError::Dataset(format!(
                "{} has {} class folders ({:?}), expected {}",
                self.root_dir.display(),
                self.num_classes(),
                self.class_names,
                expected
            )));
        }
        Ok(())
    }

    pub fn get_stats(&self) -> DatasetStats {
        let mut class_counts = BTreeMap::new();
        for name in &self.class_names {
            class_counts.insert(name.clone(), 0usize);
        }
        for sample in &self.samples {
            *class_counts.entry(sample.class_name.clone()).or_default() += 1;
        }

        DatasetStats {
            total_samples: self.samples.len(),
            num_classes: self.num_classes(),
            class_counts,
        }
    }
}

/// Per-class image counts
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatasetStats {
    pub total_samples: usize,
    pub num_classes: usize,
    pub class_counts: BTreeMap<String, usize>,
}

impl DatasetStats {
    /// Print statistics to console
    pub fn print(&self) {
        println!("\n📊 Dataset Statistics:");
        println!("  Total samples: {}", self.total_samples);
        println!("  Number of classes: {}", self.num_classes);
        println!("\n  Samples per class:");

        for (idx, (name, count)) in self.class_counts.iter().enumerate() {
            let share = if self.total_samples == 0 {
                0.0
            } else {
                *count as f32 / self.total_samples as f32
            };
            let bar: String = "█".repeat((share * 40.0) as usize);
            println!("    {:3}. {:20} {:5} {}", idx, name, count, bar);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn touch(path: &Path) {
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, b"x").unwrap();
    }

    #[test]
    fn test_labels_follow_sorted_class_names() {
        let tmp = TempDir::new().unwrap();
        for class in ["squamouscell", "adeno", "normal", "largecell"] {
            touch(&tmp.path().join(class).join("1.png"));
        }

        let folder = ImageFolder::new(tmp.path()).unwrap();

        assert_eq!(
            folder.class_names,
            vec!["adeno", "largecell", "normal", "squamouscell"]
        );
        let normal = folder
            .samples
            .iter()
            .find(|s| s.class_name == "normal")
            .unwrap();
        assert_eq!(normal.label, 2);
        assert!(folder.expect_classes(4).is_ok());
        assert!(folder.expect_classes(2).is_err());
    }

    #[test]
    fn test_only_image_files_are_collected() {
        let tmp = TempDir::new().unwrap();
        touch(&tmp.path().join("cat/1.jpg"));
        touch(&tmp.path().join("cat/nested/2.PNG"));
        touch(&tmp.path().join("cat/readme.txt"));
        touch(&tmp.path().join("dog/3.bmp"));
        touch(&tmp.path().join("dog/4.ppm"));
        touch(&tmp.path().join("dog/5.tiff"));
        touch(&tmp.path().join("dog/6.gif"));
        touch(&tmp.path().join("dog/7.webp"));
        touch(&tmp.path().join("stray.jpg"));

        let folder = ImageFolder::new(tmp.path()).unwrap();
        let stats = folder.get_stats();

        assert_eq!(folder.len(), 5);
        assert_eq!(stats.class_counts["cat"], 2);
        assert_eq!(stats.class_counts["dog"], 3);
    }

    #[test]
    fn test_missing_root() {
        let tmp = TempDir::new().unwrap();
        assert!(matches!(
            ImageFolder::new(tmp.path().join("absent")),
            Err(PipelineError::PathNotFound(_))
        ));
    }
}
