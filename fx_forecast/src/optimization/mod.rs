//! Automated re-optimization of the ensemble configuration
//!
//! A run walks through five stages for one horizon: load history, decide
//! whether anything warrants a new search, search for a better
//! configuration, validate it against production, and deploy it. Every run
//! produces an [`OptimizationResult`]; failures end up in its `error` field
//! or as alerts, never as a panic or an `Err`.

pub mod deployment;
pub mod search;
pub mod triggers;
pub mod validation;

use crate::config::AppConfig;
use crate::data::{HistoryProvider, TimeSeriesData};
use crate::error::{ForecastError, Result};
use crate::horizon::Horizon;
use crate::models::ModelConfig;
use crate::monitor::{AlertType, ModelAlert, PerformanceMonitor, Severity, UpdateStrategy};
use chrono::{DateTime, Utc};
use deployment::{DeployedConfig, DeploymentManager, DeploymentReport, FileDeploymentManager};
use parking_lot::Mutex;
use search::{
    ConfigEvaluator, HyperparameterOptimizer, OptimizationReport, RandomSearchOptimizer,
    WalkForwardEvaluator,
};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{error, info, warn};
use triggers::{
    detect_drift, schedule_due, CooldownPolicy, CooldownState, DriftThresholds, TriggerReason,
    TriggerReport,
};
use validation::{validate_candidate, ProductionScore, ValidationReport};

/// Name under which the ensemble's baselines are kept
pub const MONITORED_MODEL: &str = "ensemble";

/// Pipeline tuning knobs
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineSettings {
    /// Target column of the history bundle
    pub target: String,
    /// Exogenous columns fed to both forecasters
    pub exog: Vec<String>,
    /// Rows requested from the history provider
    pub lookback_days: usize,
    /// Below this many rows the run continues with a warning
    pub recommended_history_days: usize,
    /// Returns in the recent drift window
    pub drift_window: usize,
    pub drift_p_value: f64,
    pub drift_volatility_ratio: f64,
    /// Age after which the deployed config is refreshed regardless
    pub max_config_age_days: i64,
    /// Relative RMSE gain required to accept a candidate
    pub min_improvement: f64,
    /// Walk-forward folds per evaluation
    pub n_folds: usize,
    pub cooldown_days: i64,
    pub max_cooldown_days: i64,
    /// Run every stage but never deploy
    pub dry_run: bool,
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self {
            target: "rate".to_string(),
            exog: Vec::new(),
            lookback_days: 730,
            recommended_history_days: 365,
            drift_window: 30,
            drift_p_value: 0.01,
            drift_volatility_ratio: 1.5,
            max_config_age_days: 30,
            min_improvement: 0.05,
            n_folds: 3,
            cooldown_days: 3,
            max_cooldown_days: 30,
            dry_run: false,
        }
    }
}

impl PipelineSettings {
    pub fn validate(&self) -> Result<()> {
        if self.target.is_empty() {
            return Err(ForecastError::Config("pipeline.target is empty".to_string()));
        }
        if self.drift_window < 2 {
            return Err(ForecastError::Config(
                "pipeline.drift_window must be at least 2".to_string(),
            ));
        }
        if !(self.drift_p_value > 0.0 && self.drift_p_value < 1.0) {
            return Err(ForecastError::Config(format!(
                "pipeline.drift_p_value must be in (0, 1), got {}",
                self.drift_p_value
            )));
        }
        if self.drift_volatility_ratio <= 1.0 {
            return Err(ForecastError::Config(format!(
                "pipeline.drift_volatility_ratio must exceed 1, got {}",
                self.drift_volatility_ratio
            )));
        }
        if !(0.0..1.0).contains(&self.min_improvement) {
            return Err(ForecastError::Config(format!(
                "pipeline.min_improvement must be in [0, 1), got {}",
                self.min_improvement
            )));
        }
        if self.n_folds == 0 {
            return Err(ForecastError::Config(
                "pipeline.n_folds must be positive".to_string(),
            ));
        }
        if self.cooldown_days < 0 || self.max_cooldown_days < self.cooldown_days {
            return Err(ForecastError::Config(
                "pipeline cooldown must satisfy 0 <= cooldown_days <= max_cooldown_days"
                    .to_string(),
            ));
        }
        Ok(())
    }

    fn drift_thresholds(&self) -> DriftThresholds {
        DriftThresholds {
            window: self.drift_window,
            p_value: self.drift_p_value,
            volatility_ratio: self.drift_volatility_ratio,
        }
    }

    fn cooldown_policy(&self) -> CooldownPolicy {
        CooldownPolicy {
            cooldown_days: self.cooldown_days,
            max_cooldown_days: self.max_cooldown_days,
        }
    }
}

/// Complete record of one pipeline run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OptimizationResult {
    pub horizon_days: u32,
    pub success: bool,
    pub triggered: bool,
    pub optimized: bool,
    pub validated: bool,
    pub deployed: bool,
    pub dry_run: bool,
    pub data_rows: usize,
    pub trigger: Option<TriggerReport>,
    pub optimization: Option<OptimizationReport>,
    pub validation: Option<ValidationReport>,
    pub deployment: Option<DeploymentReport>,
    pub alerts: Vec<ModelAlert>,
    pub warnings: Vec<String>,
    pub error: Option<String>,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
}

impl OptimizationResult {
    fn start(horizon: Horizon, started_at: DateTime<Utc>, dry_run: bool) -> Self {
        Self {
            horizon_days: horizon.days(),
            success: false,
            triggered: false,
            optimized: false,
            validated: false,
            deployed: false,
            dry_run,
            data_rows: 0,
            trigger: None,
            optimization: None,
            validation: None,
            deployment: None,
            alerts: Vec::new(),
            warnings: Vec::new(),
            error: None,
            started_at,
            finished_at: None,
        }
    }

    fn finish(mut self, success: bool) -> Self {
        self.success = success;
        self.finished_at = Some(Utc::now());
        self
    }

    fn fail(mut self, message: String) -> Self {
        error!(horizon_days = self.horizon_days, error = %message, "optimization run failed");
        self.error = Some(message);
        self.finish(false)
    }

    /// Pretty JSON rendering
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Write the result into `dir` and return the file path
    pub fn save_to<P: AsRef<Path>>(&self, dir: P) -> Result<PathBuf> {
        let dir = dir.as_ref();
        fs::create_dir_all(dir)?;
        let path = dir.join(format!(
            "optimization_{}d_{}.json",
            self.horizon_days,
            self.started_at.format("%Y%m%dT%H%M%S")
        ));
        fs::write(&path, self.to_json()?)?;
        Ok(path)
    }
}

/// Orchestrates load, trigger, optimize, validate and deploy for a horizon
pub struct OptimizationPipeline {
    settings: PipelineSettings,
    history: Arc<dyn HistoryProvider>,
    evaluator: Arc<dyn ConfigEvaluator>,
    optimizer: Arc<dyn HyperparameterOptimizer>,
    deployment: Arc<dyn DeploymentManager>,
    monitor: Arc<PerformanceMonitor>,
    default_models: ModelConfig,
    cooldowns: Mutex<HashMap<Horizon, CooldownState>>,
}

impl std::fmt::Debug for OptimizationPipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OptimizationPipeline")
            .field("settings", &self.settings)
            .field("monitor", &self.monitor)
            .finish()
    }
}

impl OptimizationPipeline {
    pub fn new(
        settings: PipelineSettings,
        history: Arc<dyn HistoryProvider>,
        evaluator: Arc<dyn ConfigEvaluator>,
        optimizer: Arc<dyn HyperparameterOptimizer>,
        deployment: Arc<dyn DeploymentManager>,
        monitor: Arc<PerformanceMonitor>,
    ) -> Self {
        Self {
            settings,
            history,
            evaluator,
            optimizer,
            deployment,
            monitor,
            default_models: ModelConfig::default(),
            cooldowns: Mutex::new(HashMap::new()),
        }
    }

    /// Configuration scored as production while nothing is deployed
    pub fn with_default_models(mut self, config: ModelConfig) -> Self {
        self.default_models = config;
        self
    }

    /// Wire the default collaborators from application configuration
    pub fn from_config(config: &AppConfig, history: Arc<dyn HistoryProvider>) -> Result<Self> {
        config.validate()?;
        let settings = config.pipeline.clone();
        let evaluator = WalkForwardEvaluator::new(&settings.target, &settings.exog, settings.n_folds)
            .with_validation_split(config.ensemble.validation_split);
        let optimizer = RandomSearchOptimizer::new(config.search.clone());
        let deployment = FileDeploymentManager::new(&config.storage.deployment_dir)?;
        let monitor =
            PerformanceMonitor::with_json_store(&config.storage.baseline_dir, config.monitor.clone())?;

        Ok(Self::new(
            settings,
            history,
            Arc::new(evaluator),
            Arc::new(optimizer),
            Arc::new(deployment),
            Arc::new(monitor),
        )
        .with_default_models(config.ensemble.default_models.clone()))
    }

    pub fn settings(&self) -> &PipelineSettings {
        &self.settings
    }

    pub fn monitor(&self) -> &PerformanceMonitor {
        &self.monitor
    }

    /// Cooldown bookkeeping of a horizon
    pub fn cooldown_state(&self, horizon: Horizon) -> CooldownState {
        self.cooldowns
            .lock()
            .get(&horizon)
            .copied()
            .unwrap_or_default()
    }

    /// Run all stages for `horizon` now
    pub fn run(&self, horizon: Horizon) -> OptimizationResult {
        self.run_at(horizon, Utc::now())
    }

    /// Run all stages for `horizon` as of `now`
    pub fn run_at(&self, horizon: Horizon, now: DateTime<Utc>) -> OptimizationResult {
        let mut result = OptimizationResult::start(horizon, now, self.settings.dry_run);
        info!(horizon = %horizon, dry_run = self.settings.dry_run, "optimization run started");

        // Load
        let data = match self
            .history
            .load_history(horizon, self.settings.lookback_days)
        {
            Ok(d) => d,
            Err(e) => return result.fail(format!("Loading history failed: {}", e)),
        };
        result.data_rows = data.len();
        if data.len() < self.settings.recommended_history_days {
            let message = format!(
                "History has {} rows, fewer than the recommended {}",
                data.len(),
                self.settings.recommended_history_days
            );
            warn!(horizon = %horizon, rows = data.len(), "short history");
            result.warnings.push(message);
        }

        if let Some(until) = self.cooldown_state(horizon).active_until(now) {
            info!(horizon = %horizon, %until, "run suppressed by cooldown");
            result.trigger = Some(TriggerReport::suppressed(until));
            return result.finish(true);
        }

        // Trigger
        let deployed = match self.deployment.get_current_config(horizon) {
            Ok(d) => d,
            Err(e) => {
                result
                    .warnings
                    .push(format!("Could not read deployed configuration: {}", e));
                None
            }
        };
        let trigger = self.evaluate_triggers(&data, horizon, deployed.as_ref(), now, &mut result);
        result.triggered = trigger.triggered;
        let triggered = trigger.triggered;
        result.trigger = Some(trigger);
        if !triggered {
            info!(horizon = %horizon, "no trigger fired");
            return result.finish(true);
        }

        // Optimize
        let production_config = deployed.as_ref().map(|d| &d.config);
        let report = match self.optimizer.optimize(
            &data,
            horizon,
            production_config,
            self.evaluator.as_ref(),
        ) {
            Ok(r) => r,
            Err(e) => return result.fail(format!("Hyperparameter search failed: {}", e)),
        };
        result.optimized = true;
        if report.timed_out {
            result.warnings.push(format!(
                "Search stopped at the time limit after {} trials",
                report.trials_run
            ));
        }

        // Validate
        let production = match (production_config, report.production_metrics.as_ref()) {
            (None, _) => ProductionScore::NotDeployed,
            (Some(_), None) => ProductionScore::Unscored,
            (Some(_), Some(m)) => ProductionScore::Scored(m),
        };
        let validation = validate_candidate(
            &report.best_metrics,
            production,
            self.settings.min_improvement,
            self.monitor.settings().warning_threshold,
        );
        result.validated = validation.validated;
        let candidate = report.best_config.clone();
        let candidate_metrics = report.best_metrics;
        result.optimization = Some(report);

        if !validation.validated {
            let mut alert = ModelAlert::new(
                AlertType::CandidateRejected,
                Severity::Info,
                MONITORED_MODEL,
                &horizon.label(),
                validation.reason.clone(),
            );
            alert.current_metrics = Some(candidate_metrics);
            result.alerts.push(alert);
            result.validation = Some(validation);

            let mut cooldowns = self.cooldowns.lock();
            let state = cooldowns.entry(horizon).or_default();
            state.record_rejection(&self.settings.cooldown_policy(), now);
            info!(
                horizon = %horizon,
                rejections = state.consecutive_rejections,
                until = ?state.until,
                "candidate rejected"
            );
            return result.finish(true);
        }
        result.validation = Some(validation);

        // Deploy
        if self.settings.dry_run {
            info!(horizon = %horizon, "dry run, skipping deployment");
            return result.finish(true);
        }

        let deploy_report = self
            .deployment
            .deploy(horizon, &candidate, Some(candidate_metrics.rmse));
        let deployed_ok = deploy_report.success;
        result.deployment = Some(deploy_report.clone());

        if !deployed_ok {
            let alert = ModelAlert::new(
                AlertType::DeploymentFailed,
                Severity::Critical,
                MONITORED_MODEL,
                &horizon.label(),
                deploy_report.message.clone(),
            );
            result.alerts.push(alert);
            return result.fail(deploy_report.message);
        }

        result.deployed = true;
        self.cooldowns.lock().remove(&horizon);
        if let Err(e) = self.monitor.update_baseline(
            MONITORED_MODEL,
            &horizon.label(),
            &candidate_metrics,
            UpdateStrategy::Replace,
        ) {
            result
                .warnings
                .push(format!("Baseline not updated after deployment: {}", e));
        }

        info!(
            horizon = %horizon,
            version = ?deploy_report.version,
            rmse = candidate_metrics.rmse,
            "optimization run deployed a new configuration"
        );
        result.finish(true)
    }

    fn evaluate_triggers(
        &self,
        data: &TimeSeriesData,
        horizon: Horizon,
        deployed: Option<&DeployedConfig>,
        now: DateTime<Utc>,
        result: &mut OptimizationResult,
    ) -> TriggerReport {
        let mut report = TriggerReport::default();
        let label = horizon.label();

        // Drift
        match data
            .column(&self.settings.target)
            .and_then(|levels| detect_drift(levels, &self.settings.drift_thresholds()))
        {
            Ok(drift) => {
                if drift.detected {
                    report.reasons.push(TriggerReason::DataDrift);
                    let mut alert = ModelAlert::new(
                        AlertType::DataDrift,
                        Severity::Warning,
                        MONITORED_MODEL,
                        &label,
                        format!(
                            "Recent returns drifted (p = {:.4}, volatility ratio = {:.2})",
                            drift.p_value, drift.volatility_ratio
                        ),
                    );
                    alert.degradation_pct = Some((drift.volatility_ratio - 1.0) * 100.0);
                    result.alerts.push(alert);
                }
                report.drift = Some(drift);
            }
            Err(e) => result.warnings.push(format!("Drift check skipped: {}", e)),
        }

        // Degradation of the production configuration
        let production = deployed
            .map(|d| d.config.clone())
            .unwrap_or_else(|| self.default_models.clone());
        match self.evaluator.evaluate(data, horizon, &production) {
            Ok(metrics) => {
                report.production_metrics = Some(metrics);
                match self
                    .monitor
                    .check_degradation(MONITORED_MODEL, &label, &metrics)
                {
                    Ok(alerts) => {
                        let missing = alerts
                            .iter()
                            .any(|a| a.alert_type == AlertType::BaselineMissing);
                        if missing {
                            match self.monitor.save_baseline(MONITORED_MODEL, &label, &metrics) {
                                Ok(_) => report.baseline_seeded = true,
                                Err(e) => result
                                    .warnings
                                    .push(format!("Baseline could not be seeded: {}", e)),
                            }
                        }
                        if alerts
                            .iter()
                            .any(|a| a.alert_type == AlertType::PerformanceDegradation)
                        {
                            report.reasons.push(TriggerReason::PerformanceDegradation);
                        }
                        result.alerts.extend(alerts.iter().cloned());
                        report.degradation_alerts = alerts;
                    }
                    Err(e) => result
                        .warnings
                        .push(format!("Degradation check failed: {}", e)),
                }
            }
            Err(e) => result
                .warnings
                .push(format!("Production configuration could not be evaluated: {}", e)),
        }

        // Schedule
        let (due, age) = schedule_due(deployed, now, self.settings.max_config_age_days);
        report.config_age_days = age;
        if let Some(reason) = due {
            report.reasons.push(reason);
        }

        report.triggered = !report.reasons.is_empty();
        info!(
            horizon = %horizon,
            triggered = report.triggered,
            reasons = ?report.reasons,
            "trigger stage evaluated"
        );
        report
    }
}
