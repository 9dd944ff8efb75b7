//! Per-epoch training history
//!
//! Persisted twice: a CSV with one row per epoch and a JSON object mapping
//! each metric name to its list of per-epoch values.

use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::Path;

use csv::Writer;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::utils::Result;

/// UTF-8 byte order mark written at the start of the CSV
const UTF8_BOM: &[u8] = b"\xEF\xBB\xBF";

/// Metrics of one epoch; field order is the CSV column order
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EpochMetrics {
    pub loss: f64,
    pub accuracy: f64,
    pub val_loss: f64,
    pub val_accuracy: f64,
}

/// Metric name -> per-epoch values
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TrainingHistory {
    pub loss: Vec<f64>,
    pub accuracy: Vec<f64>,
    pub val_loss: Vec<f64>,
    pub val_accuracy: Vec<f64>,
}

impl TrainingHistory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, metrics: EpochMetrics) {
        self.loss.push(metrics.loss);
        self.accuracy.push(metrics.accuracy);
        self.val_loss.push(metrics.val_loss);
        self.val_accuracy.push(metrics.val_accuracy);
    }

    pub fn epochs(&self) -> usize {
        self.loss.len()
    }

    /// Rows in epoch order
    pub fn rows(&self) -> Vec<EpochMetrics> {
        (0..self.epochs())
            .map(|i| EpochMetrics {
                loss: self.loss[i],
                accuracy: self.accuracy[i],
                val_loss: self.val_loss[i],
                val_accuracy: self.val_accuracy[i],
            })
            .collect()
    }

    /// 1-based epoch and value of the first highest validation accuracy
    pub fn best_val_accuracy(&self) -> Option<(usize, f64)> {
        self.val_accuracy
            .iter()
            .copied()
            .enumerate()
            .fold(None, |best, (i, v)| match best {
                Some((_, b)) if v <= b => best,
                _ => Some((i + 1, v)),
            })
    }

    /// Write `loss,accuracy,val_loss,val_accuracy` rows, no index column
    pub fn save_csv(&self, path: &Path) -> Result<()> {
        create_parent(path)?;
        let mut file = BufWriter::new(File::create(path)?);
        file.write_all(UTF8_BOM)?;

        let mut writer = Writer::from_writer(file);
        for row in self.rows() {
            writer.serialize(row)?;
        }
        writer.flush()?;
        Ok(())
    }

    pub fn save_json(&self, path: &Path) -> Result<()> {
        create_parent(path)?;
        let json = serde_json::to_string_pretty(self)?;
        fs::write(path, json)?;
        Ok(())
    }

    pub fn load_json(path: &Path) -> Result<Self> {
        let json = fs::read_to_string(path)?;
        Ok(serde_json::from_str(&json)?)
    }

    /// Save both the CSV and the JSON form
    pub fn save(&self, csv_path: &Path, json_path: &Path) -> Result<()> {
        self.save_csv(csv_path)?;
        self.save_json(json_path)?;

        info!(
            "History saved: {} and {}",
            csv_path.display(),
            json_path.display()
        );
        Ok(())
    }
}

fn create_parent(path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn two_epochs() -> TrainingHistory {
        let mut history = TrainingHistory::new();
        history.push(EpochMetrics {
            loss: 0.69,
            accuracy: 0.5,
            val_loss: 0.68,
            val_accuracy: 0.55,
        });
        history.push(EpochMetrics {
            loss: 0.61,
            accuracy: 0.66,
            val_loss: 0.64,
            val_accuracy: 0.6,
        });
        history
    }

    #[test]
    fn test_csv_and_json_agree() {
        let tmp = TempDir::new().unwrap();
        let history = two_epochs();

        let csv_path = tmp.path().join("training_history.csv");
        let json_path = tmp.path().join("training_history.json");
        history.save(&csv_path, &json_path).unwrap();

        let bytes = fs::read(&csv_path).unwrap();
        assert!(bytes.starts_with(UTF8_BOM));

        let mut reader = csv::Reader::from_reader(&bytes[UTF8_BOM.len()..]);
        let headers: Vec<String> = reader.headers().unwrap().iter().map(String::from).collect();
        assert_eq!(headers, vec!["loss", "accuracy", "val_loss", "val_accuracy"]);

        let rows: Vec<EpochMetrics> = reader.deserialize().map(|r| r.unwrap()).collect();
        assert_eq!(rows.len(), 2);

        let loaded = TrainingHistory::load_json(&json_path).unwrap();
        assert_eq!(loaded, history);
        assert_eq!(rows, loaded.rows());
    }

    #[test]
    fn test_json_is_metric_to_list() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("nested/h.json");

        two_epochs().save_json(&path).unwrap();

        let value: serde_json::Value =
            serde_json::from_str(&fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(value["val_accuracy"], serde_json::json!([0.55, 0.6]));
        assert_eq!(value.as_object().unwrap().len(), 4);
    }

    #[test]
    fn test_best_val_accuracy() {
        assert_eq!(TrainingHistory::new().best_val_accuracy(), None);
        assert_eq!(two_epochs().best_val_accuracy(), Some((2, 0.6)));

        let mut tied = two_epochs();
        tied.push(EpochMetrics {
            loss: 0.5,
            accuracy: 0.7,
            val_loss: 0.6,
            val_accuracy: 0.6,
        });
        assert_eq!(tied.best_val_accuracy(), Some((2, 0.6)));
    }
}
