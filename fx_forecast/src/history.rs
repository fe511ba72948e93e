//! Append-only CSV log of ensemble training runs

use crate::ensemble::EnsembleMetrics;
use crate::error::Result;
use crate::horizon::Horizon;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs::{self, OpenOptions};
use std::path::{Path, PathBuf};
use tracing::debug;

/// One row of the training log
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrainingRecord {
    pub trained_at: DateTime<Utc>,
    pub horizon: String,
    pub ensemble_rmse: f64,
    pub ensemble_mae: f64,
    pub ensemble_mape: f64,
    pub directional_accuracy: f64,
    pub model_a_rmse: Option<f64>,
    pub model_b_rmse: Option<f64>,
    pub weight_a: f64,
    pub weight_b: f64,
    pub n_train: usize,
    pub n_test: usize,
}

impl TrainingRecord {
    fn from_metrics(horizon: Horizon, metrics: &EnsembleMetrics) -> Self {
        Self {
            trained_at: metrics.trained_at,
            horizon: horizon.label(),
            ensemble_rmse: metrics.ensemble.rmse,
            ensemble_mae: metrics.ensemble.mae,
            ensemble_mape: metrics.ensemble.mape,
            directional_accuracy: metrics.ensemble.directional_accuracy,
            model_a_rmse: metrics.model_a.map(|m| m.rmse),
            model_b_rmse: metrics.model_b.map(|m| m.rmse),
            weight_a: metrics.weight_a,
            weight_b: metrics.weight_b,
            n_train: metrics.n_train,
            n_test: metrics.n_test,
        }
    }
}

/// Training log stored as CSV at a fixed path
#[derive(Debug, Clone)]
pub struct TrainingHistory {
    path: PathBuf,
}

impl TrainingHistory {
    pub fn new<P: AsRef<Path>>(path: P) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Append one training run, writing the header on first use
    pub fn record(&self, horizon: Horizon, metrics: &EnsembleMetrics) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        let needs_header = fs::metadata(&self.path).map(|m| m.len() == 0).unwrap_or(true);

        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;
        let mut writer = csv::WriterBuilder::new()
            .has_headers(needs_header)
            .from_writer(file);
        writer.serialize(TrainingRecord::from_metrics(horizon, metrics))?;
        writer.flush()?;

        debug!(path = %self.path.display(), horizon = %horizon, "training run recorded");
        Ok(())
    }

    /// All recorded runs, oldest first; empty when the log does not exist
    pub fn records(&self) -> Result<Vec<TrainingRecord>> {
        if !self.path.exists() {
            return Ok(Vec::new());
        }
        let mut reader = csv::Reader::from_path(&self.path)?;
        let mut records = Vec::new();
        for row in reader.deserialize() {
            records.push(row?);
        }
        Ok(records)
    }

    /// Runs of a single horizon
    pub fn records_for(&self, horizon: Horizon) -> Result<Vec<TrainingRecord>> {
        let label = horizon.label();
        Ok(self
            .records()?
            .into_iter()
            .filter(|r| r.horizon == label)
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metrics::ForecastMetrics;
    use tempfile::tempdir;

    fn metrics(horizon_days: u32, rmse: f64, model_b: bool) -> EnsembleMetrics {
        let m = ForecastMetrics {
            rmse,
            mae: rmse * 0.8,
            mape: 1.2,
            directional_accuracy: 58.0,
            n_samples: 24,
        };
        EnsembleMetrics {
            horizon_days,
            ensemble: m,
            model_a: Some(m),
            model_b: model_b.then_some(m),
            weight_a: 0.6,
            weight_b: 0.4,
            n_train: 96,
            n_test: 24,
            residual_std: Some(0.05),
            volatility_fitted: false,
            trained_at: Utc::now(),
        }
    }

    #[test]
    fn test_missing_log_is_empty() {
        let dir = tempdir().unwrap();
        let history = TrainingHistory::new(dir.path().join("history.csv"));
        assert!(history.records().unwrap().is_empty());
    }

    #[test]
    fn test_appends_with_single_header() {
        let dir = tempdir().unwrap();
        let history = TrainingHistory::new(dir.path().join("logs").join("history.csv"));
        let week = Horizon::new(7).unwrap();
        let month = Horizon::new(30).unwrap();

        history.record(week, &metrics(7, 0.12, true)).unwrap();
        history.record(month, &metrics(30, 0.30, false)).unwrap();
        history.record(week, &metrics(7, 0.10, true)).unwrap();

        let records = history.records().unwrap();
        assert_eq!(records.len(), 3);
        assert_eq!(records[1].horizon, "30d");
        assert_eq!(records[1].model_b_rmse, None);

        let weekly = history.records_for(week).unwrap();
        assert_eq!(weekly.len(), 2);
        assert_eq!(weekly[1].ensemble_rmse, 0.10);

        let contents = fs::read_to_string(history.path()).unwrap();
        assert_eq!(contents.matches("trained_at").count(), 1);
    }
}
