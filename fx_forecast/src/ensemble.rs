//! Horizon-weighted ensemble of the two point forecasters
//!
//! The ensemble trains both components on the same time-ordered split,
//! combines them with the horizon's weights (renormalised over whichever
//! components are healthy) and wraps the mean in confidence bands taken from
//! the residual volatility model, the residual spread, or a flat heuristic,
//! in that order of preference.

use crate::data::TimeSeriesData;
use crate::error::{ForecastError, Result};
use crate::horizon::{EnsembleWeights, Horizon};
use crate::metrics::{evaluate_forecast, ForecastMetrics};
use crate::models::{
    build_forecaster, ComponentStatus, ExogForecast, ForecasterKind, ModelConfig,
    PointForecaster,
};
use crate::optimization::deployment::DeploymentManager;
use crate::volatility::{VolatilityForecast, VolatilityModel, VolatilityModelKind};
use chrono::{DateTime, NaiveDate, Utc};
use fx_math::RollingStd;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Fewest rows accepted by [`EnsembleForecaster::train`]
pub const MIN_TRAINING_ROWS: usize = 100;

/// Fraction of rows held out for validation unless configured otherwise
pub const DEFAULT_VALIDATION_SPLIT: f64 = 0.2;

/// Number of trailing residuals behind the residual-std band
const RESIDUAL_WINDOW: usize = 20;

/// Band half-width as a share of the mean when nothing better is available
const HEURISTIC_BAND_FRACTION: f64 = 0.01;

const MODEL_A_FILE: &str = "model_a.json";
const MODEL_B_FILE: &str = "model_b.json";
const VOLATILITY_FILE: &str = "volatility.json";
const METADATA_FILE: &str = "metadata.json";

/// Where the confidence bands of a forecast came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BandSource {
    /// Conditional volatility model of the residuals
    Volatility,
    /// Rolling std of the most recent validation residuals
    ResidualStd,
    /// Fixed fraction of the forecast mean
    Heuristic,
}

/// Validation results of one training run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnsembleMetrics {
    /// Horizon the ensemble serves
    pub horizon_days: u32,
    /// Ensemble accuracy on the validation segment
    pub ensemble: ForecastMetrics,
    /// Component A accuracy, if it trained
    pub model_a: Option<ForecastMetrics>,
    /// Component B accuracy, if it trained
    pub model_b: Option<ForecastMetrics>,
    /// Weight of A actually applied
    pub weight_a: f64,
    /// Weight of B actually applied
    pub weight_b: f64,
    /// Rows in the training segment
    pub n_train: usize,
    /// Rows in the validation segment
    pub n_test: usize,
    /// Rolling std of the last validation residuals
    pub residual_std: Option<f64>,
    /// Whether the residual volatility model fitted
    pub volatility_fitted: bool,
    /// When training finished
    pub trained_at: DateTime<Utc>,
}

/// One forecast date
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ForecastPoint {
    pub date: NaiveDate,
    pub mean: f64,
    pub model_a: Option<f64>,
    pub model_b: Option<f64>,
    pub lower_1sigma: f64,
    pub upper_1sigma: f64,
    pub lower_2sigma: f64,
    pub upper_2sigma: f64,
}

/// Result of [`EnsembleForecaster::predict`]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnsembleForecast {
    /// Horizon the ensemble serves
    pub horizon_days: u32,
    /// Forecast dates in order
    pub points: Vec<ForecastPoint>,
    /// Weight of A used for this forecast
    pub weight_a: f64,
    /// Weight of B used for this forecast
    pub weight_b: f64,
    /// Tier the bands were taken from
    pub band_source: BandSource,
    /// Volatility at the last step, when the volatility tier was used
    pub volatility: Option<VolatilityForecast>,
}

impl EnsembleForecast {
    /// Ensemble means in date order
    pub fn means(&self) -> Vec<f64> {
        self.points.iter().map(|p| p.mean).collect()
    }
}

/// Read-only view of the ensemble's current composition
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ModelContributions {
    pub horizon_days: u32,
    pub nominal_weights: (f64, f64),
    pub effective_weights: Option<(f64, f64)>,
    pub model_a_name: String,
    pub model_b_name: String,
    pub model_a_status: ComponentStatus,
    pub model_b_status: ComponentStatus,
    pub volatility_model_kind: VolatilityModelKind,
    pub band_source: BandSource,
    pub last_metrics: Option<EnsembleMetrics>,
}

/// Contents of `metadata.json`
#[derive(Debug, Serialize, Deserialize)]
struct EnsembleMetadata {
    horizon_days: u32,
    target: String,
    exog: Vec<String>,
    config: ModelConfig,
    model_a_status: ComponentStatus,
    model_b_status: ComponentStatus,
    has_volatility: bool,
    residual_std: Option<f64>,
    effective_weights: Option<(f64, f64)>,
    metrics: Option<EnsembleMetrics>,
    saved_at: DateTime<Utc>,
}

/// Two-model ensemble for one horizon
#[derive(Debug)]
pub struct EnsembleForecaster {
    horizon: Horizon,
    config: ModelConfig,
    weights: EnsembleWeights,
    model_a: Box<dyn PointForecaster>,
    model_b: Box<dyn PointForecaster>,
    status_a: ComponentStatus,
    status_b: ComponentStatus,
    volatility: VolatilityModel,
    residual_std: Option<f64>,
    target: Option<String>,
    exog: Vec<String>,
    effective_weights: Option<(f64, f64)>,
    last_metrics: Option<EnsembleMetrics>,
}

impl EnsembleForecaster {
    /// Ensemble with default hyperparameters
    pub fn new(horizon: Horizon) -> Self {
        Self::with_config(horizon, &ModelConfig::default())
    }

    /// Ensemble with explicit hyperparameters
    pub fn with_config(horizon: Horizon, config: &ModelConfig) -> Self {
        let weights = EnsembleWeights::for_horizon(horizon);
        Self {
            horizon,
            config: config.clone(),
            weights,
            model_a: build_forecaster(ForecasterKind::BoostedTrees, config),
            model_b: build_forecaster(ForecasterKind::SeasonalRegression, config),
            status_a: ComponentStatus::Untrained,
            status_b: ComponentStatus::Untrained,
            volatility: VolatilityModel::new(weights.volatility_model_kind),
            residual_std: None,
            target: None,
            exog: Vec::new(),
            effective_weights: None,
            last_metrics: None,
        }
    }

    /// Ensemble using the configuration currently deployed for `horizon`
    pub fn from_deployment(manager: &dyn DeploymentManager, horizon: Horizon) -> Self {
        match manager.get_current_config(horizon) {
            Ok(Some(deployed)) => {
                debug!(horizon = %horizon, version = deployed.version, "using deployed config");
                Self::with_config(horizon, &deployed.config)
            }
            Ok(None) => Self::new(horizon),
            Err(e) => {
                warn!(horizon = %horizon, error = %e, "could not read deployed config, using defaults");
                Self::new(horizon)
            }
        }
    }

    /// Horizon served
    pub fn horizon(&self) -> Horizon {
        self.horizon
    }

    /// Hyperparameters in use
    pub fn config(&self) -> &ModelConfig {
        &self.config
    }

    /// Nominal weights for the horizon
    pub fn weights(&self) -> &EnsembleWeights {
        &self.weights
    }

    /// Residual volatility model
    pub fn volatility_model(&self) -> &VolatilityModel {
        &self.volatility
    }

    /// Rolling std of the last validation residuals
    pub fn residual_std(&self) -> Option<f64> {
        self.residual_std
    }

    /// Whether at least one component can forecast
    pub fn is_fitted(&self) -> bool {
        self.status_a.is_fitted() || self.status_b.is_fitted()
    }

    /// Train both components and the residual volatility model
    ///
    /// On `BothModelsFailed` the ensemble is left exactly as it was before the
    /// call, so a previously trained ensemble keeps forecasting.
    pub fn train(
        &mut self,
        data: &TimeSeriesData,
        target: &str,
        exog: &[String],
        validation_split: f64,
    ) -> Result<EnsembleMetrics> {
        if data.len() < MIN_TRAINING_ROWS {
            return Err(ForecastError::InsufficientData {
                required: MIN_TRAINING_ROWS,
                actual: data.len(),
            });
        }
        if !data.has_column(target) {
            return Err(ForecastError::MissingColumn(target.to_string()));
        }

        let (train, test) = data.train_test_split(validation_split)?;
        let n_train = train.len();
        let actual = test.column(target)?.to_vec();

        info!(
            horizon = %self.horizon,
            rows = data.len(),
            n_train,
            n_test = test.len(),
            "training ensemble"
        );

        let mut model_a = build_forecaster(ForecasterKind::BoostedTrees, &self.config);
        let mut model_b = build_forecaster(ForecasterKind::SeasonalRegression, &self.config);
        let outcome_a = train_component(model_a.as_mut(), data, &train, n_train, target, exog);
        let outcome_b = train_component(model_b.as_mut(), data, &train, n_train, target, exog);

        let (preds_a, status_a) = split_outcome(outcome_a, model_a.name(), self.horizon);
        let (preds_b, status_b) = split_outcome(outcome_b, model_b.name(), self.horizon);

        let (weight_a, weight_b) = match self
            .weights
            .effective(preds_a.is_some(), preds_b.is_some())
        {
            Some(w) => w,
            None => {
                // The previous fit, if any, stays in service
                warn!(horizon = %self.horizon, "both components failed, keeping previous fit");
                return Err(ForecastError::BothModelsFailed {
                    model_a: failure_reason(&status_a),
                    model_b: failure_reason(&status_b),
                });
            }
        };

        let ensemble_preds = combine(
            preds_a.as_deref(),
            preds_b.as_deref(),
            weight_a,
            weight_b,
            actual.len(),
        );

        let metrics_a = preds_a
            .as_deref()
            .map(|p| evaluate_forecast(p, &actual))
            .transpose()?;
        let metrics_b = preds_b
            .as_deref()
            .map(|p| evaluate_forecast(p, &actual))
            .transpose()?;
        let ensemble_metrics = evaluate_forecast(&ensemble_preds, &actual)?;

        let residuals: Vec<f64> = actual
            .iter()
            .zip(ensemble_preds.iter())
            .map(|(a, p)| a - p)
            .collect();

        let mut rolling = RollingStd::new(RESIDUAL_WINDOW)?;
        rolling.extend(&residuals);
        let residual_std = rolling.value().ok().filter(|s| s.is_finite() && *s > 0.0);

        let mut volatility = VolatilityModel::new(self.weights.volatility_model_kind);
        if let Err(e) = volatility.fit(&residuals) {
            warn!(
                horizon = %self.horizon,
                error = %e,
                "volatility model fit failed, bands fall back to residual std"
            );
        }

        let metrics = EnsembleMetrics {
            horizon_days: self.horizon.days(),
            ensemble: ensemble_metrics,
            model_a: metrics_a,
            model_b: metrics_b,
            weight_a,
            weight_b,
            n_train,
            n_test: actual.len(),
            residual_std,
            volatility_fitted: volatility.is_fitted(),
            trained_at: Utc::now(),
        };

        self.model_a = model_a;
        self.model_b = model_b;
        self.status_a = status_a;
        self.status_b = status_b;
        self.volatility = volatility;
        self.residual_std = residual_std;
        self.target = Some(target.to_string());
        self.exog = exog.to_vec();
        self.effective_weights = Some((weight_a, weight_b));
        self.last_metrics = Some(metrics.clone());

        info!(
            horizon = %self.horizon,
            rmse = metrics.ensemble.rmse,
            directional_accuracy = metrics.ensemble.directional_accuracy,
            weight_a,
            weight_b,
            "ensemble trained"
        );

        Ok(metrics)
    }

    /// Forecast `steps` days (the horizon length by default) after `data`
    pub fn predict(
        &self,
        data: &TimeSeriesData,
        steps: Option<usize>,
        exog_forecast: Option<&ExogForecast>,
    ) -> Result<EnsembleForecast> {
        if !self.is_fitted() {
            return Err(ForecastError::NotFitted(format!(
                "ensemble for horizon {}",
                self.horizon
            )));
        }

        let steps = steps.unwrap_or(self.horizon.days() as usize);
        if steps == 0 {
            return Err(ForecastError::InvalidParameter(
                "Forecast steps must be at least one".to_string(),
            ));
        }

        let preds_a = self.component_forecast(
            self.model_a.as_ref(),
            &self.status_a,
            data,
            steps,
            exog_forecast,
        );
        let preds_b = self.component_forecast(
            self.model_b.as_ref(),
            &self.status_b,
            data,
            steps,
            exog_forecast,
        );

        let (weight_a, weight_b) = self
            .weights
            .effective(preds_a.is_ok(), preds_b.is_ok())
            .ok_or_else(|| ForecastError::BothModelsFailed {
                model_a: preds_a
                    .as_ref()
                    .err()
                    .map(|e| e.to_string())
                    .unwrap_or_default(),
                model_b: preds_b
                    .as_ref()
                    .err()
                    .map(|e| e.to_string())
                    .unwrap_or_default(),
            })?;

        let preds_a = preds_a.ok();
        let preds_b = preds_b.ok();
        let means = combine(
            preds_a.as_deref(),
            preds_b.as_deref(),
            weight_a,
            weight_b,
            steps,
        );

        let dates = data.future_dates(steps)?;
        let (band_source, sigmas, volatility) = self.band_widths(&means);

        let points = dates
            .into_iter()
            .enumerate()
            .map(|(i, date)| {
                let mean = means[i];
                let sigma = sigmas[i];
                ForecastPoint {
                    date,
                    mean,
                    model_a: preds_a.as_ref().map(|p| p[i]),
                    model_b: preds_b.as_ref().map(|p| p[i]),
                    lower_1sigma: mean - sigma,
                    upper_1sigma: mean + sigma,
                    lower_2sigma: mean - 2.0 * sigma,
                    upper_2sigma: mean + 2.0 * sigma,
                }
            })
            .collect();

        Ok(EnsembleForecast {
            horizon_days: self.horizon.days(),
            points,
            weight_a,
            weight_b,
            band_source,
            volatility,
        })
    }

    /// Current weights, statuses and last metrics
    pub fn get_model_contributions(&self) -> ModelContributions {
        ModelContributions {
            horizon_days: self.horizon.days(),
            nominal_weights: (self.weights.weight_a, self.weights.weight_b),
            effective_weights: self.effective_weights,
            model_a_name: self.model_a.name().to_string(),
            model_b_name: self.model_b.name().to_string(),
            model_a_status: self.status_a.clone(),
            model_b_status: self.status_b.clone(),
            volatility_model_kind: self.weights.volatility_model_kind,
            band_source: self.preferred_band_source(),
            last_metrics: self.last_metrics.clone(),
        }
    }

    /// Persist all fitted parts under `dir`, replacing any previous contents
    pub fn save_models<P: AsRef<Path>>(&self, dir: P) -> Result<()> {
        let dir = dir.as_ref();
        let target = self.target.clone().ok_or_else(|| {
            ForecastError::NotFitted(format!("ensemble for horizon {}", self.horizon))
        })?;
        if !self.is_fitted() {
            return Err(ForecastError::NotFitted(format!(
                "ensemble for horizon {}",
                self.horizon
            )));
        }

        let staging = sibling_path(dir, "staging")?;
        if staging.exists() {
            fs::remove_dir_all(&staging)?;
        }
        fs::create_dir_all(&staging)?;

        if self.status_a.is_fitted() {
            write_json(&staging.join(MODEL_A_FILE), &self.model_a.save_state()?)?;
        }
        if self.status_b.is_fitted() {
            write_json(&staging.join(MODEL_B_FILE), &self.model_b.save_state()?)?;
        }
        let has_volatility = self.volatility.is_fitted();
        if has_volatility {
            write_json(&staging.join(VOLATILITY_FILE), &self.volatility.save_state()?)?;
        }

        let metadata = EnsembleMetadata {
            horizon_days: self.horizon.days(),
            target,
            exog: self.exog.clone(),
            config: self.config.clone(),
            model_a_status: self.status_a.clone(),
            model_b_status: self.status_b.clone(),
            has_volatility,
            residual_std: self.residual_std,
            effective_weights: self.effective_weights,
            metrics: self.last_metrics.clone(),
            saved_at: Utc::now(),
        };
        write_json(&staging.join(METADATA_FILE), &metadata)?;

        // Swap the staged directory into place
        let previous = sibling_path(dir, "previous")?;
        if previous.exists() {
            fs::remove_dir_all(&previous)?;
        }
        if dir.exists() {
            fs::rename(dir, &previous)?;
        }
        if let Err(e) = fs::rename(&staging, dir) {
            if previous.exists() {
                fs::rename(&previous, dir)?;
            }
            return Err(e.into());
        }
        if previous.exists() {
            fs::remove_dir_all(&previous)?;
        }

        info!(horizon = %self.horizon, path = %dir.display(), "ensemble saved");
        Ok(())
    }

    /// Restore an ensemble saved by [`save_models`](Self::save_models)
    pub fn load_models<P: AsRef<Path>>(dir: P) -> Result<Self> {
        let dir = dir.as_ref();
        let metadata: EnsembleMetadata = read_json(&dir.join(METADATA_FILE))?;
        let horizon = Horizon::new(metadata.horizon_days)?;
        let mut ensemble = Self::with_config(horizon, &metadata.config);

        ensemble.status_a = load_component(
            ensemble.model_a.as_mut(),
            &metadata.model_a_status,
            &dir.join(MODEL_A_FILE),
        );
        ensemble.status_b = load_component(
            ensemble.model_b.as_mut(),
            &metadata.model_b_status,
            &dir.join(MODEL_B_FILE),
        );
        if !ensemble.is_fitted() {
            return Err(ForecastError::ModelError(format!(
                "No loadable component in {}",
                dir.display()
            )));
        }

        if metadata.has_volatility {
            let loaded = read_json::<serde_json::Value>(&dir.join(VOLATILITY_FILE))
                .and_then(|state| ensemble.volatility.load_state(state));
            if let Err(e) = loaded {
                warn!(horizon = %horizon, error = %e, "volatility state not restored");
            }
        }

        ensemble.residual_std = metadata.residual_std;
        ensemble.target = Some(metadata.target);
        ensemble.exog = metadata.exog;
        ensemble.effective_weights = metadata.effective_weights;
        ensemble.last_metrics = metadata.metrics;

        info!(horizon = %horizon, path = %dir.display(), "ensemble loaded");
        Ok(ensemble)
    }

    fn component_forecast(
        &self,
        model: &dyn PointForecaster,
        status: &ComponentStatus,
        data: &TimeSeriesData,
        steps: usize,
        exog_forecast: Option<&ExogForecast>,
    ) -> Result<Vec<f64>> {
        if !status.is_fitted() {
            return Err(ForecastError::NotFitted(model.name().to_string()));
        }
        model
            .predict(data, steps, exog_forecast)
            .map_err(|e| {
                warn!(
                    horizon = %self.horizon,
                    model = model.name(),
                    error = %e,
                    "component inference failed"
                );
                e
            })
    }

    fn preferred_band_source(&self) -> BandSource {
        if self.volatility.is_fitted() {
            BandSource::Volatility
        } else if self.residual_std.is_some() {
            BandSource::ResidualStd
        } else {
            BandSource::Heuristic
        }
    }

    /// Per-step sigma from the best available tier
    fn band_widths(&self, means: &[f64]) -> (BandSource, Vec<f64>, Option<VolatilityForecast>) {
        if self.volatility.is_fitted() {
            let forecasts: Result<Vec<VolatilityForecast>> = means
                .iter()
                .enumerate()
                .map(|(i, &mean)| self.volatility.forecast_volatility(mean, i + 1))
                .collect();
            match forecasts {
                Ok(forecasts) => {
                    let sigmas = forecasts.iter().map(|f| f.volatility).collect();
                    return (BandSource::Volatility, sigmas, forecasts.last().cloned());
                }
                Err(e) => {
                    warn!(horizon = %self.horizon, error = %e, "volatility bands unavailable");
                }
            }
        }

        if let Some(std) = self.residual_std {
            return (BandSource::ResidualStd, vec![std; means.len()], None);
        }

        let sigmas = means
            .iter()
            .map(|m| HEURISTIC_BAND_FRACTION * m.abs())
            .collect();
        (BandSource::Heuristic, sigmas, None)
    }
}

/// Train one component and produce its rolling one-step validation forecasts
fn train_component(
    model: &mut dyn PointForecaster,
    full: &TimeSeriesData,
    train: &TimeSeriesData,
    n_train: usize,
    target: &str,
    exog: &[String],
) -> Result<Vec<f64>> {
    model.train(train, target, exog)?;

    let mut predictions = Vec::with_capacity(full.len() - n_train);
    for t in n_train..full.len() {
        let history = full.slice(0, Some(t))?;
        let mut next_exog = ExogForecast::new();
        for name in exog {
            next_exog.insert(name.clone(), vec![full.column(name)?[t]]);
        }
        let step = model.predict(&history, 1, Some(&next_exog))?;
        let value = step.first().copied().ok_or_else(|| {
            ForecastError::ModelError(format!("{} returned an empty forecast", model.name()))
        })?;
        predictions.push(value);
    }
    Ok(predictions)
}

fn split_outcome(
    outcome: Result<Vec<f64>>,
    name: &str,
    horizon: Horizon,
) -> (Option<Vec<f64>>, ComponentStatus) {
    match outcome {
        Ok(preds) => (Some(preds), ComponentStatus::Fitted),
        Err(e) => {
            warn!(horizon = %horizon, model = name, error = %e, "component training failed");
            (None, ComponentStatus::Failed(e.to_string()))
        }
    }
}

fn failure_reason(status: &ComponentStatus) -> String {
    match status {
        ComponentStatus::Failed(reason) => reason.clone(),
        other => format!("{:?}", other),
    }
}

/// Weighted sum of the available component forecasts
fn combine(
    a: Option<&[f64]>,
    b: Option<&[f64]>,
    weight_a: f64,
    weight_b: f64,
    len: usize,
) -> Vec<f64> {
    (0..len)
        .map(|i| {
            a.map_or(0.0, |p| weight_a * p[i]) + b.map_or(0.0, |p| weight_b * p[i])
        })
        .collect()
}

fn load_component(
    model: &mut dyn PointForecaster,
    saved_status: &ComponentStatus,
    path: &Path,
) -> ComponentStatus {
    if !saved_status.is_fitted() {
        return saved_status.clone();
    }
    match read_json::<serde_json::Value>(path).and_then(|state| model.load_state(state)) {
        Ok(()) => ComponentStatus::Fitted,
        Err(e) => {
            warn!(model = model.name(), error = %e, "component state not restored");
            ComponentStatus::Failed(e.to_string())
        }
    }
}

/// `.{name}.{suffix}` next to `dir`
fn sibling_path(dir: &Path, suffix: &str) -> Result<PathBuf> {
    let name = dir
        .file_name()
        .and_then(|n| n.to_str())
        .ok_or_else(|| {
            ForecastError::InvalidParameter(format!("Invalid model directory {}", dir.display()))
        })?;
    Ok(dir.with_file_name(format!(".{}.{}", name, suffix)))
}

fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    let file = fs::File::create(path)?;
    serde_json::to_writer_pretty(file, value)?;
    Ok(())
}

fn read_json<T: serde::de::DeserializeOwned>(path: &Path) -> Result<T> {
    let file = fs::File::open(path)?;
    Ok(serde_json::from_reader(std::io::BufReader::new(file))?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::generate_rate_series;
    use approx::assert_relative_eq;

    fn fast_config() -> ModelConfig {
        let mut config = ModelConfig::default();
        config.boosted_trees.n_estimators = 15;
        config
    }

    #[test]
    fn test_requires_minimum_rows() {
        let data = generate_rate_series(99, 20.0, 0.004, 1);
        let mut ensemble = EnsembleForecaster::with_config(Horizon::new(7).unwrap(), &fast_config());
        assert!(matches!(
            ensemble.train(&data, "rate", &[], DEFAULT_VALIDATION_SPLIT),
            Err(ForecastError::InsufficientData { required: 100, actual: 99 })
        ));
    }

    #[test]
    fn test_missing_target() {
        let data = generate_rate_series(120, 20.0, 0.004, 1);
        let mut ensemble = EnsembleForecaster::with_config(Horizon::new(7).unwrap(), &fast_config());
        assert!(matches!(
            ensemble.train(&data, "eurusd", &[], DEFAULT_VALIDATION_SPLIT),
            Err(ForecastError::MissingColumn(_))
        ));
    }

    #[test]
    fn test_predict_before_train() {
        let data = generate_rate_series(120, 20.0, 0.004, 1);
        let ensemble = EnsembleForecaster::new(Horizon::new(7).unwrap());
        assert!(matches!(
            ensemble.predict(&data, None, None),
            Err(ForecastError::NotFitted(_))
        ));
    }

    #[test]
    fn test_heuristic_band_width() {
        let ensemble = EnsembleForecaster::new(Horizon::new(7).unwrap());
        let (source, sigmas, vol) = ensemble.band_widths(&[20.0, -10.0]);
        assert_eq!(source, BandSource::Heuristic);
        assert_relative_eq!(sigmas[0], 0.2, epsilon = 1e-12);
        assert_relative_eq!(sigmas[1], 0.1, epsilon = 1e-12);
        assert!(vol.is_none());
    }

    #[test]
    fn test_combine_uses_available_components() {
        let a = [1.0, 2.0];
        let b = [3.0, 4.0];
        assert_eq!(combine(Some(&a), Some(&b), 0.5, 0.5, 2), vec![2.0, 3.0]);
        assert_eq!(combine(None, Some(&b), 0.0, 1.0, 2), vec![3.0, 4.0]);
    }
}
