//! Point forecasters and the configuration that builds them
//!
//! The ensemble only talks to [`PointForecaster`]; concrete implementations
//! are picked by [`build_forecaster`] from a [`ForecasterKind`] and the
//! deployable [`ModelConfig`].

use crate::data::TimeSeriesData;
use crate::error::{ForecastError, Result};
use crate::metrics::ForecastMetrics;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt::Debug;

pub mod boosted_trees;
pub mod garch;
pub mod seasonal;

pub use boosted_trees::{BoostedTreesForecaster, BoostedTreesParams};
pub use seasonal::{SeasonalParams, SeasonalRegressionForecaster};

/// Future values of exogenous series, keyed by column name
pub type ExogForecast = BTreeMap<String, Vec<f64>>;

/// Which point forecaster to build
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ForecasterKind {
    /// Gradient-boosted regression trees on lagged differences (component A)
    BoostedTrees,
    /// Seasonal regression with exogenous variables (component B)
    SeasonalRegression,
}

impl ForecasterKind {
    /// Stable short name used in file names and alerts
    pub fn as_str(&self) -> &'static str {
        match self {
            ForecasterKind::BoostedTrees => "boosted_trees",
            ForecasterKind::SeasonalRegression => "seasonal_regression",
        }
    }
}

/// Availability of one ensemble component
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", content = "reason", rename_all = "snake_case")]
pub enum ComponentStatus {
    /// Never trained or loaded
    Untrained,
    /// Trained and usable
    Fitted,
    /// Training or loading failed
    Failed(String),
}

impl ComponentStatus {
    /// Whether the component can produce forecasts
    pub fn is_fitted(&self) -> bool {
        matches!(self, ComponentStatus::Fitted)
    }
}

/// Common interface for the ensemble's point forecasters
pub trait PointForecaster: Debug + Send + Sync {
    /// Human-readable model name
    fn name(&self) -> &str;

    /// Which implementation this is
    fn kind(&self) -> ForecasterKind;

    /// Fit on `data[target]` with optional exogenous columns; returns in-sample metrics
    fn train(&mut self, data: &TimeSeriesData, target: &str, exog: &[String])
        -> Result<ForecastMetrics>;

    /// Forecast `steps` values following the end of `history`
    fn predict(
        &self,
        history: &TimeSeriesData,
        steps: usize,
        exog_forecast: Option<&ExogForecast>,
    ) -> Result<Vec<f64>>;

    /// Whether `train` or `load_state` succeeded
    fn is_fitted(&self) -> bool;

    /// Serialize the fitted state
    fn save_state(&self) -> Result<serde_json::Value>;

    /// Restore a state produced by `save_state`
    fn load_state(&mut self, state: serde_json::Value) -> Result<()>;
}

/// Deployable hyperparameter set for both point forecasters
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelConfig {
    /// Component A hyperparameters
    pub boosted_trees: BoostedTreesParams,
    /// Component B hyperparameters
    pub seasonal: SeasonalParams,
}

impl ModelConfig {
    /// Check every hyperparameter against its allowed range
    pub fn validate(&self) -> Result<()> {
        self.boosted_trees.validate()?;
        self.seasonal.validate()?;
        Ok(())
    }
}

/// Build a forecaster from configuration
pub fn build_forecaster(kind: ForecasterKind, config: &ModelConfig) -> Box<dyn PointForecaster> {
    match kind {
        ForecasterKind::BoostedTrees => {
            Box::new(BoostedTreesForecaster::new(config.boosted_trees.clone()))
        }
        ForecasterKind::SeasonalRegression => {
            Box::new(SeasonalRegressionForecaster::new(config.seasonal.clone()))
        }
    }
}

/// Resolve the value of each exogenous column `step` periods past the history
///
/// Uses the caller's exogenous forecast when it covers the step, otherwise
/// carries the last observed value forward.
pub(crate) fn future_exog_value(
    name: &str,
    last_observed: f64,
    step: usize,
    exog_forecast: Option<&ExogForecast>,
) -> f64 {
    exog_forecast
        .and_then(|f| f.get(name))
        .and_then(|values| values.get(step))
        .copied()
        .filter(|v| v.is_finite())
        .unwrap_or(last_observed)
}

/// Collect the target and exogenous columns, checking they exist and are finite
pub(crate) fn collect_columns(
    data: &TimeSeriesData,
    target: &str,
    exog: &[String],
) -> Result<(Vec<f64>, Vec<Vec<f64>>)> {
    let y = data.column(target)?.to_vec();
    if y.iter().any(|v| !v.is_finite()) {
        return Err(ForecastError::DataError(format!(
            "Target column '{}' contains non-finite values",
            target
        )));
    }

    let mut exog_values = Vec::with_capacity(exog.len());
    for name in exog {
        let col = data.column(name)?.to_vec();
        if col.iter().any(|v| !v.is_finite()) {
            return Err(ForecastError::DataError(format!(
                "Exogenous column '{}' contains non-finite values",
                name
            )));
        }
        exog_values.push(col);
    }

    Ok((y, exog_values))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_factory_builds_requested_kind() {
        let config = ModelConfig::default();
        let a = build_forecaster(ForecasterKind::BoostedTrees, &config);
        let b = build_forecaster(ForecasterKind::SeasonalRegression, &config);
        assert_eq!(a.kind(), ForecasterKind::BoostedTrees);
        assert_eq!(b.kind(), ForecasterKind::SeasonalRegression);
        assert!(!a.is_fitted());
        assert!(!b.is_fitted());
    }

    #[test]
    fn test_future_exog_value_falls_back_to_last() {
        let mut forecast = ExogForecast::new();
        forecast.insert("oil".to_string(), vec![70.0, f64::NAN]);

        assert_eq!(future_exog_value("oil", 60.0, 0, Some(&forecast)), 70.0);
        assert_eq!(future_exog_value("oil", 60.0, 1, Some(&forecast)), 60.0);
        assert_eq!(future_exog_value("oil", 60.0, 5, Some(&forecast)), 60.0);
        assert_eq!(future_exog_value("rates", 3.0, 0, Some(&forecast)), 3.0);
        assert_eq!(future_exog_value("oil", 60.0, 0, None), 60.0);
    }

    #[test]
    fn test_default_config_is_valid() {
        assert!(ModelConfig::default().validate().is_ok());
    }
}
