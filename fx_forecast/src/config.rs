//! Application configuration loaded from TOML
//!
//! Every section falls back to its defaults, so a partial file (or an empty
//! one) is a valid configuration.

use crate::ensemble::DEFAULT_VALIDATION_SPLIT;
use crate::error::{ForecastError, Result};
use crate::horizon::Horizon;
use crate::models::ModelConfig;
use crate::monitor::MonitorSettings;
use crate::optimization::search::SearchSettings;
use crate::optimization::PipelineSettings;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Top-level configuration
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub ensemble: EnsembleSettings,
    pub monitor: MonitorSettings,
    pub pipeline: PipelineSettings,
    pub search: SearchSettings,
    pub logging: LoggingSettings,
    pub storage: StorageSettings,
}

/// `[ensemble]`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EnsembleSettings {
    /// Fraction of rows held out for validation
    pub validation_split: f64,
    /// Hyperparameters used when nothing is deployed
    pub default_models: ModelConfig,
}

impl Default for EnsembleSettings {
    fn default() -> Self {
        Self {
            validation_split: DEFAULT_VALIDATION_SPLIT,
            default_models: ModelConfig::default(),
        }
    }
}

/// `[logging]`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingSettings {
    /// Default filter directive, overridden by `RUST_LOG`
    pub level: String,
    /// Emit JSON lines instead of human-readable output
    pub json: bool,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
        }
    }
}

/// `[storage]`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageSettings {
    pub baseline_dir: PathBuf,
    pub deployment_dir: PathBuf,
    pub model_dir: PathBuf,
    pub training_history: PathBuf,
}

impl Default for StorageSettings {
    fn default() -> Self {
        let root = PathBuf::from("fxcast_data");
        Self {
            baseline_dir: root.join("baselines"),
            deployment_dir: root.join("deployments"),
            model_dir: root.join("models"),
            training_history: root.join("training_history.csv"),
        }
    }
}

impl StorageSettings {
    /// Directory holding the saved ensemble of a horizon
    pub fn model_path(&self, horizon: Horizon) -> PathBuf {
        self.model_dir.join(horizon.label())
    }
}

impl AppConfig {
    /// Parse and validate a TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let contents = fs::read_to_string(path).map_err(|e| {
            ForecastError::Config(format!("Cannot read {}: {}", path.display(), e))
        })?;
        Self::from_toml_str(&contents)
    }

    /// Parse and validate TOML text
    pub fn from_toml_str(contents: &str) -> Result<Self> {
        let config: AppConfig = toml::from_str(contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Range checks across sections
    pub fn validate(&self) -> Result<()> {
        let split = self.ensemble.validation_split;
        if !(split > 0.0 && split <= 0.5) {
            return Err(ForecastError::Config(format!(
                "ensemble.validation_split must be in (0, 0.5], got {}",
                split
            )));
        }
        self.ensemble
            .default_models
            .validate()
            .map_err(|e| ForecastError::Config(format!("ensemble.default_models: {}", e)))?;
        self.monitor.validate()?;
        self.pipeline.validate()?;
        self.search.validate()?;
        if self.logging.level.trim().is_empty() {
            return Err(ForecastError::Config("logging.level is empty".to_string()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_empty_file_is_default() {
        assert_eq!(AppConfig::from_toml_str("").unwrap(), AppConfig::default());
    }

    #[test]
    fn test_partial_sections() {
        let config = AppConfig::from_toml_str(
            r#"
            [monitor]
            warning_threshold = 0.10

            [pipeline]
            exog = ["oil", "us10y"]
            dry_run = true

            [ensemble.default_models.boosted_trees]
            n_estimators = 250
            "#,
        )
        .unwrap();

        assert_eq!(config.monitor.warning_threshold, 0.10);
        assert_eq!(config.monitor.critical_threshold, 0.30);
        assert_eq!(config.pipeline.exog, vec!["oil", "us10y"]);
        assert!(config.pipeline.dry_run);
        assert_eq!(config.ensemble.default_models.boosted_trees.n_estimators, 250);
        assert_eq!(config.ensemble.default_models.boosted_trees.max_depth, 3);
    }

    #[test]
    fn test_rejects_inverted_thresholds() {
        let result = AppConfig::from_toml_str(
            r#"
            [monitor]
            warning_threshold = 0.4
            critical_threshold = 0.3
            "#,
        );
        assert!(matches!(result, Err(ForecastError::Config(_))));
    }

    #[test]
    fn test_rejects_malformed_toml() {
        assert!(matches!(
            AppConfig::from_toml_str("[pipeline\nlookback_days = 3"),
            Err(ForecastError::Config(_))
        ));
    }
}
