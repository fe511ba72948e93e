//! Baseline tracking and degradation alerts
//!
//! Each `(model_name, horizon)` pair owns one baseline record. Checks compare
//! fresh metrics against it and emit typed alerts; nothing here raises an
//! error for a degraded model.

use crate::error::{ForecastError, Result};
use crate::metrics::ForecastMetrics;
use chrono::{DateTime, Utc};
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Weight of the new observation when averaging baselines
pub const AVERAGE_ALPHA: f64 = 0.3;

/// Alert thresholds
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MonitorSettings {
    /// Relative error increase that raises a WARNING
    pub warning_threshold: f64,
    /// Relative error increase that raises a CRITICAL
    pub critical_threshold: f64,
    /// Directional accuracy (percent) below which an alert fires
    pub min_directional_accuracy: f64,
}

impl Default for MonitorSettings {
    fn default() -> Self {
        Self {
            warning_threshold: 0.15,
            critical_threshold: 0.30,
            min_directional_accuracy: 55.0,
        }
    }
}

impl MonitorSettings {
    pub fn validate(&self) -> Result<()> {
        if !(self.warning_threshold > 0.0 && self.warning_threshold < self.critical_threshold) {
            return Err(ForecastError::Config(format!(
                "warning_threshold {} must be positive and below critical_threshold {}",
                self.warning_threshold, self.critical_threshold
            )));
        }
        if !(0.0..=100.0).contains(&self.min_directional_accuracy) {
            return Err(ForecastError::Config(format!(
                "min_directional_accuracy must be a percentage, got {}",
                self.min_directional_accuracy
            )));
        }
        Ok(())
    }
}

/// Reference performance for one model and horizon
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BaselineMetrics {
    pub rmse: f64,
    pub mae: f64,
    pub mape: f64,
    pub directional_accuracy: f64,
    pub n_samples: usize,
    pub established_date: DateTime<Utc>,
    pub last_updated: DateTime<Utc>,
}

impl BaselineMetrics {
    /// Fresh baseline from evaluated metrics
    pub fn from_metrics(metrics: &ForecastMetrics, now: DateTime<Utc>) -> Self {
        Self {
            rmse: metrics.rmse,
            mae: metrics.mae,
            mape: metrics.mape,
            directional_accuracy: metrics.directional_accuracy,
            n_samples: metrics.n_samples,
            established_date: now,
            last_updated: now,
        }
    }

    /// Exponential average with `metrics`, keeping the establishment date
    fn averaged_with(&self, metrics: &ForecastMetrics, now: DateTime<Utc>) -> Self {
        let blend = |old: f64, new: f64| AVERAGE_ALPHA * new + (1.0 - AVERAGE_ALPHA) * old;
        Self {
            rmse: blend(self.rmse, metrics.rmse),
            mae: blend(self.mae, metrics.mae),
            mape: blend(self.mape, metrics.mape),
            directional_accuracy: blend(self.directional_accuracy, metrics.directional_accuracy),
            n_samples: metrics.n_samples,
            established_date: self.established_date,
            last_updated: now,
        }
    }
}

/// Alert severity, ordered from least to most severe
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Severity {
    Info,
    Warning,
    Critical,
}

/// What an alert is about
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AlertType {
    BaselineMissing,
    PerformanceDegradation,
    LowDirectionalAccuracy,
    DataDrift,
    CandidateRejected,
    DeploymentFailed,
}

impl fmt::Display for AlertType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            AlertType::BaselineMissing => "BASELINE_MISSING",
            AlertType::PerformanceDegradation => "PERFORMANCE_DEGRADATION",
            AlertType::LowDirectionalAccuracy => "LOW_DIRECTIONAL_ACCURACY",
            AlertType::DataDrift => "DATA_DRIFT",
            AlertType::CandidateRejected => "CANDIDATE_REJECTED",
            AlertType::DeploymentFailed => "DEPLOYMENT_FAILED",
        };
        f.write_str(label)
    }
}

/// Alert handed to the caller's alert sink
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelAlert {
    pub alert_type: AlertType,
    pub severity: Severity,
    pub model_name: String,
    pub horizon: String,
    pub message: String,
    pub current_metrics: Option<ForecastMetrics>,
    pub baseline_metrics: Option<BaselineMetrics>,
    /// Relative degradation in percent
    pub degradation_pct: Option<f64>,
    pub recommendations: Vec<String>,
    pub created_at: DateTime<Utc>,
}

impl ModelAlert {
    /// Alert without metric context
    pub fn new(
        alert_type: AlertType,
        severity: Severity,
        model_name: &str,
        horizon: &str,
        message: String,
    ) -> Self {
        Self {
            alert_type,
            severity,
            model_name: model_name.to_string(),
            horizon: horizon.to_string(),
            message,
            current_metrics: None,
            baseline_metrics: None,
            degradation_pct: None,
            recommendations: default_recommendations(alert_type, severity),
            created_at: Utc::now(),
        }
    }
}

fn default_recommendations(alert_type: AlertType, severity: Severity) -> Vec<String> {
    let items: &[&str] = match (alert_type, severity) {
        (AlertType::BaselineMissing, _) => &[
            "Establish a baseline from the current evaluation",
            "Re-run the check once a baseline exists",
        ],
        (AlertType::PerformanceDegradation, Severity::Critical) => &[
            "Trigger hyperparameter re-optimization immediately",
            "Inspect recent data for structural breaks or feed errors",
            "Consider rolling back to the previous deployed configuration",
        ],
        (AlertType::PerformanceDegradation, _) => &[
            "Schedule hyperparameter re-optimization",
            "Monitor the next evaluations for a persistent trend",
        ],
        (AlertType::LowDirectionalAccuracy, _) => &[
            "Review the exogenous inputs for stale values",
            "Check whether the market regime has shifted",
        ],
        (AlertType::DataDrift, _) => &[
            "Retrain on a window that covers the new regime",
            "Verify upstream data quality",
        ],
        (AlertType::CandidateRejected, _) => &[
            "Keep the production configuration",
            "Widen the search space or extend the trial budget",
        ],
        (AlertType::DeploymentFailed, _) => &[
            "Verify the deployment store is writable",
            "Retry the deployment or roll back manually",
        ],
    };
    items.iter().map(|s| s.to_string()).collect()
}

/// Per-key monitoring state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MonitorState {
    NoBaseline,
    BaselineEstablished,
    Ok,
    DegradedWarning,
    DegradedCritical,
}

/// How `update_baseline` merges new metrics
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UpdateStrategy {
    /// Overwrite the record
    Replace,
    /// Exponential average with weight [`AVERAGE_ALPHA`] on the new metrics
    Average,
}

/// Storage key of a baseline record
pub fn baseline_key(model_name: &str, horizon: &str) -> String {
    format!("{}_{}", model_name, horizon)
}

/// Persistence of baseline records
pub trait BaselineStore: Send + Sync {
    /// Load the record for `key`, if any
    fn load(&self, key: &str) -> Result<Option<BaselineMetrics>>;

    /// Write the whole record for `key`
    fn save(&self, key: &str, baseline: &BaselineMetrics) -> Result<()>;
}

/// One JSON file per key inside a directory
#[derive(Debug, Clone)]
pub struct JsonBaselineStore {
    dir: PathBuf,
}

impl JsonBaselineStore {
    /// Store rooted at `dir`, created if missing
    pub fn new<P: AsRef<Path>>(dir: P) -> Result<Self> {
        let dir = dir.as_ref().to_path_buf();
        fs::create_dir_all(&dir)?;
        Ok(Self { dir })
    }

    fn path_for(&self, key: &str) -> PathBuf {
        let file: String = key
            .chars()
            .map(|c| {
                if c.is_ascii_alphanumeric() || c == '-' || c == '_' || c == '.' {
                    c
                } else {
                    '_'
                }
            })
            .collect();
        self.dir.join(format!("{}.json", file))
    }
}

impl BaselineStore for JsonBaselineStore {
    fn load(&self, key: &str) -> Result<Option<BaselineMetrics>> {
        let path = self.path_for(key);
        if !path.exists() {
            return Ok(None);
        }
        let contents = fs::read_to_string(&path)?;
        Ok(Some(serde_json::from_str(&contents)?))
    }

    fn save(&self, key: &str, baseline: &BaselineMetrics) -> Result<()> {
        let path = self.path_for(key);
        let tmp = path.with_extension("json.tmp");
        fs::write(&tmp, serde_json::to_string_pretty(baseline)?)?;
        fs::rename(&tmp, &path)?;
        Ok(())
    }
}

/// Process-local store, mostly for tests and dry runs
#[derive(Debug, Default)]
pub struct InMemoryBaselineStore {
    records: RwLock<HashMap<String, BaselineMetrics>>,
}

impl InMemoryBaselineStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl BaselineStore for InMemoryBaselineStore {
    fn load(&self, key: &str) -> Result<Option<BaselineMetrics>> {
        Ok(self.records.read().get(key).cloned())
    }

    fn save(&self, key: &str, baseline: &BaselineMetrics) -> Result<()> {
        self.records
            .write()
            .insert(key.to_string(), baseline.clone());
        Ok(())
    }
}

/// Compares fresh metrics against stored baselines
pub struct PerformanceMonitor {
    store: Box<dyn BaselineStore>,
    settings: MonitorSettings,
    cache: RwLock<HashMap<String, BaselineMetrics>>,
    states: RwLock<HashMap<String, MonitorState>>,
    key_locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl fmt::Debug for PerformanceMonitor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PerformanceMonitor")
            .field("settings", &self.settings)
            .field("cached_keys", &self.cache.read().len())
            .finish()
    }
}

impl PerformanceMonitor {
    /// Monitor over an arbitrary store
    pub fn new(store: Box<dyn BaselineStore>, settings: MonitorSettings) -> Self {
        Self {
            store,
            settings,
            cache: RwLock::new(HashMap::new()),
            states: RwLock::new(HashMap::new()),
            key_locks: Mutex::new(HashMap::new()),
        }
    }

    /// Monitor persisting baselines as JSON files under `dir`
    pub fn with_json_store<P: AsRef<Path>>(dir: P, settings: MonitorSettings) -> Result<Self> {
        Ok(Self::new(Box::new(JsonBaselineStore::new(dir)?), settings))
    }

    /// Monitor with an in-memory store
    pub fn in_memory(settings: MonitorSettings) -> Self {
        Self::new(Box::new(InMemoryBaselineStore::new()), settings)
    }

    pub fn settings(&self) -> &MonitorSettings {
        &self.settings
    }

    /// Read-through lookup of a baseline
    pub fn get_baseline(&self, model_name: &str, horizon: &str) -> Result<Option<BaselineMetrics>> {
        let key = baseline_key(model_name, horizon);
        if let Some(hit) = self.cache.read().get(&key) {
            return Ok(Some(hit.clone()));
        }

        let loaded = self.store.load(&key)?;
        if let Some(baseline) = &loaded {
            self.cache.write().insert(key, baseline.clone());
        }
        Ok(loaded)
    }

    /// Establish (or overwrite) the baseline from `metrics`
    pub fn save_baseline(
        &self,
        model_name: &str,
        horizon: &str,
        metrics: &ForecastMetrics,
    ) -> Result<BaselineMetrics> {
        self.update_baseline(model_name, horizon, metrics, UpdateStrategy::Replace)
    }

    /// Merge `metrics` into the baseline; a missing baseline is created
    pub fn update_baseline(
        &self,
        model_name: &str,
        horizon: &str,
        metrics: &ForecastMetrics,
        strategy: UpdateStrategy,
    ) -> Result<BaselineMetrics> {
        let key = baseline_key(model_name, horizon);
        let lock = self.key_lock(&key);
        let _guard = lock.lock();

        let now = Utc::now();
        let existing = self.get_baseline(model_name, horizon)?;
        let baseline = match (strategy, existing) {
            (UpdateStrategy::Average, Some(old)) => old.averaged_with(metrics, now),
            _ => BaselineMetrics::from_metrics(metrics, now),
        };

        self.store.save(&key, &baseline)?;
        self.cache.write().insert(key.clone(), baseline.clone());
        self.states
            .write()
            .insert(key, MonitorState::BaselineEstablished);

        info!(
            model = model_name,
            horizon,
            ?strategy,
            rmse = baseline.rmse,
            "baseline updated"
        );
        Ok(baseline)
    }

    /// Compare `current` against the stored baseline
    pub fn check_degradation(
        &self,
        model_name: &str,
        horizon: &str,
        current: &ForecastMetrics,
    ) -> Result<Vec<ModelAlert>> {
        let key = baseline_key(model_name, horizon);
        let lock = self.key_lock(&key);
        let _guard = lock.lock();

        let baseline = match self.get_baseline(model_name, horizon)? {
            Some(b) => b,
            None => {
                self.states.write().insert(key, MonitorState::NoBaseline);
                let mut alert = ModelAlert::new(
                    AlertType::BaselineMissing,
                    Severity::Info,
                    model_name,
                    horizon,
                    format!("No baseline recorded for {} at {}", model_name, horizon),
                );
                alert.current_metrics = Some(*current);
                debug!(model = model_name, horizon, "no baseline to compare against");
                return Ok(vec![alert]);
            }
        };

        let mut alerts = Vec::new();

        let candidates = [
            ("RMSE", relative_increase(current.rmse, baseline.rmse)),
            ("MAE", relative_increase(current.mae, baseline.mae)),
            ("MAPE", relative_increase(current.mape, baseline.mape)),
        ];
        let (worst_name, worst) = candidates
            .iter()
            .copied()
            .fold(("RMSE", f64::NEG_INFINITY), |best, c| {
                if c.1 > best.1 {
                    c
                } else {
                    best
                }
            });

        let severity = if worst >= self.settings.critical_threshold {
            Some(Severity::Critical)
        } else if worst >= self.settings.warning_threshold {
            Some(Severity::Warning)
        } else {
            None
        };

        if let Some(severity) = severity {
            let mut alert = ModelAlert::new(
                AlertType::PerformanceDegradation,
                severity,
                model_name,
                horizon,
                format!(
                    "{} degraded by {:.1}% against baseline for {} at {}",
                    worst_name,
                    worst * 100.0,
                    model_name,
                    horizon
                ),
            );
            alert.current_metrics = Some(*current);
            alert.baseline_metrics = Some(baseline.clone());
            alert.degradation_pct = Some(worst * 100.0);
            alerts.push(alert);
        }

        if current.directional_accuracy < self.settings.min_directional_accuracy {
            let mut alert = ModelAlert::new(
                AlertType::LowDirectionalAccuracy,
                Severity::Warning,
                model_name,
                horizon,
                format!(
                    "Directional accuracy {:.1}% is below {:.1}%",
                    current.directional_accuracy, self.settings.min_directional_accuracy
                ),
            );
            alert.current_metrics = Some(*current);
            alert.baseline_metrics = Some(baseline.clone());
            alert.degradation_pct = Some(
                relative_decrease(current.directional_accuracy, baseline.directional_accuracy)
                    * 100.0,
            );
            alerts.push(alert);
        }

        let state = match alerts.iter().map(|a| a.severity).max() {
            Some(Severity::Critical) => MonitorState::DegradedCritical,
            Some(Severity::Warning) => MonitorState::DegradedWarning,
            _ => MonitorState::Ok,
        };
        self.states.write().insert(key, state);

        if !alerts.is_empty() {
            warn!(
                model = model_name,
                horizon,
                alerts = alerts.len(),
                ?state,
                "performance alerts raised"
            );
        }
        Ok(alerts)
    }

    /// Current state of a key
    pub fn state(&self, model_name: &str, horizon: &str) -> Result<MonitorState> {
        let key = baseline_key(model_name, horizon);
        if let Some(state) = self.states.read().get(&key) {
            return Ok(*state);
        }
        Ok(match self.get_baseline(model_name, horizon)? {
            Some(_) => MonitorState::BaselineEstablished,
            None => MonitorState::NoBaseline,
        })
    }

    /// Drop every cached baseline
    pub fn invalidate_cache(&self) {
        self.cache.write().clear();
    }

    /// Re-read one baseline from the store
    pub fn reload(&self, model_name: &str, horizon: &str) -> Result<Option<BaselineMetrics>> {
        let key = baseline_key(model_name, horizon);
        self.cache.write().remove(&key);
        self.get_baseline(model_name, horizon)
    }

    fn key_lock(&self, key: &str) -> Arc<Mutex<()>> {
        self.key_locks
            .lock()
            .entry(key.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }
}

/// `(current - baseline) / baseline`, zero when the baseline is not positive
fn relative_increase(current: f64, baseline: f64) -> f64 {
    if baseline > 0.0 && current.is_finite() {
        (current - baseline) / baseline
    } else {
        0.0
    }
}

fn relative_decrease(current: f64, baseline: f64) -> f64 {
    if baseline > 0.0 && current.is_finite() {
        (baseline - current) / baseline
    } else {
        0.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn metrics(rmse: f64) -> ForecastMetrics {
        ForecastMetrics {
            rmse,
            mae: rmse * 0.8,
            mape: 2.0,
            directional_accuracy: 60.0,
            n_samples: 30,
        }
    }

    #[test]
    fn test_average_keeps_establishment_date() {
        let monitor = PerformanceMonitor::in_memory(MonitorSettings::default());
        let first = monitor.save_baseline("ensemble", "7d", &metrics(10.0)).unwrap();
        let averaged = monitor
            .update_baseline("ensemble", "7d", &metrics(20.0), UpdateStrategy::Average)
            .unwrap();

        assert_relative_eq!(averaged.rmse, 13.0, epsilon = 1e-12);
        assert_eq!(averaged.established_date, first.established_date);
        assert!(averaged.last_updated >= first.last_updated);
    }

    #[test]
    fn test_states_follow_checks() {
        let monitor = PerformanceMonitor::in_memory(MonitorSettings::default());
        assert_eq!(monitor.state("m", "7d").unwrap(), MonitorState::NoBaseline);

        monitor.save_baseline("m", "7d", &metrics(10.0)).unwrap();
        assert_eq!(
            monitor.state("m", "7d").unwrap(),
            MonitorState::BaselineEstablished
        );

        monitor.check_degradation("m", "7d", &metrics(10.0)).unwrap();
        assert_eq!(monitor.state("m", "7d").unwrap(), MonitorState::Ok);

        monitor.check_degradation("m", "7d", &metrics(14.0)).unwrap();
        assert_eq!(
            monitor.state("m", "7d").unwrap(),
            MonitorState::DegradedCritical
        );
    }

    #[test]
    fn test_low_directional_accuracy_is_separate_alert() {
        let monitor = PerformanceMonitor::in_memory(MonitorSettings::default());
        monitor.save_baseline("m", "30d", &metrics(10.0)).unwrap();

        let mut current = metrics(10.0);
        current.directional_accuracy = 40.0;
        let alerts = monitor.check_degradation("m", "30d", &current).unwrap();

        assert_eq!(alerts.len(), 1);
        assert_eq!(alerts[0].alert_type, AlertType::LowDirectionalAccuracy);
        assert_eq!(alerts[0].severity, Severity::Warning);
        assert!(!alerts[0].recommendations.is_empty());
    }

    #[test]
    fn test_relative_increase_guards_zero_baseline() {
        assert_eq!(relative_increase(5.0, 0.0), 0.0);
        assert_relative_eq!(relative_increase(12.0, 10.0), 0.2, epsilon = 1e-12);
    }
}
