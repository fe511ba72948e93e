//! Conditional volatility of ensemble residuals
//!
//! Wraps the GARCH engine with the residual preparation, the unit scaling and
//! the regime classification used for confidence bands.

use crate::error::{ForecastError, Result};
use crate::models::garch::{GarchModel, GarchParams};
use fx_math::stats::{finite_values, mean, std_dev};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Minimum number of finite residuals needed for a fit
pub const MIN_RESIDUALS: usize = 30;

/// Residuals are multiplied by this factor before fitting
const RESIDUAL_SCALE: f64 = 100.0;

/// Variance equation variant
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum VolatilityModelKind {
    /// GARCH(1,1)
    Symmetric,
    /// GJR-GARCH(1,1), reacting more to negative shocks
    Asymmetric,
}

impl fmt::Display for VolatilityModelKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            VolatilityModelKind::Symmetric => write!(f, "GARCH(1,1)"),
            VolatilityModelKind::Asymmetric => write!(f, "GJR-GARCH(1,1)"),
        }
    }
}

/// Volatility level relative to the historical mean
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Regime {
    /// Below half the historical level
    Low,
    /// Between 0.5x and 1.5x
    Normal,
    /// Between 1.5x and 2.5x
    High,
    /// Above 2.5x
    Extreme,
}

impl Regime {
    /// Classify a volatility-to-history ratio
    pub fn from_ratio(ratio: f64) -> Self {
        if ratio < 0.5 {
            Regime::Low
        } else if ratio < 1.5 {
            Regime::Normal
        } else if ratio < 2.5 {
            Regime::High
        } else {
            Regime::Extreme
        }
    }
}

/// Symmetric intervals around a point forecast
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ConfidenceIntervals {
    /// point ± 1 sigma
    pub one_sigma: (f64, f64),
    /// point ± 2 sigma
    pub two_sigma: (f64, f64),
    /// point ± 3 sigma
    pub three_sigma: (f64, f64),
}

impl ConfidenceIntervals {
    /// Intervals for a point and standard deviation
    pub fn around(point: f64, sigma: f64) -> Self {
        Self {
            one_sigma: (point - sigma, point + sigma),
            two_sigma: (point - 2.0 * sigma, point + 2.0 * sigma),
            three_sigma: (point - 3.0 * sigma, point + 3.0 * sigma),
        }
    }
}

/// Volatility forecast at one horizon
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VolatilityForecast {
    /// Steps ahead the forecast refers to
    pub horizon_days: usize,
    /// Forecast standard deviation, in residual units
    pub volatility: f64,
    /// Intervals around the supplied point forecast
    pub confidence_intervals: ConfidenceIntervals,
    /// Regime of the forecast volatility
    pub regime: Regime,
    /// Residual std at fit time
    pub historical_mean_volatility: f64,
    /// Variant that produced the forecast
    pub model_kind: VolatilityModelKind,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct FittedVolatility {
    garch: GarchModel,
    historical_volatility: f64,
}

/// GARCH-family model of the ensemble residuals
#[derive(Debug, Clone, PartialEq)]
pub struct VolatilityModel {
    kind: VolatilityModelKind,
    fitted: Option<FittedVolatility>,
}

impl VolatilityModel {
    /// Create an unfitted model of the given variant
    pub fn new(kind: VolatilityModelKind) -> Self {
        Self { kind, fitted: None }
    }

    /// Variant in use
    pub fn kind(&self) -> VolatilityModelKind {
        self.kind
    }

    /// Whether `fit` or `load_state` succeeded
    pub fn is_fitted(&self) -> bool {
        self.fitted.is_some()
    }

    /// Fitted coefficients
    pub fn params(&self) -> Option<&GarchParams> {
        self.fitted.as_ref().map(|f| f.garch.params())
    }

    /// Residual std seen at fit time
    pub fn historical_volatility(&self) -> Option<f64> {
        self.fitted.as_ref().map(|f| f.historical_volatility)
    }

    /// Fit on residuals; non-finite values are dropped first
    pub fn fit(&mut self, residuals: &[f64]) -> Result<()> {
        self.fitted = None;

        let clean = finite_values(residuals);
        if clean.len() < MIN_RESIDUALS {
            return Err(ForecastError::InsufficientData {
                required: MIN_RESIDUALS,
                actual: clean.len(),
            });
        }

        let center = mean(&clean)?;
        let historical_volatility = std_dev(&clean)?;
        let shocks: Vec<f64> = clean
            .iter()
            .map(|r| (r - center) * RESIDUAL_SCALE)
            .collect();

        let garch = GarchModel::fit(&shocks, self.kind)?;
        tracing::debug!(
            model = %self.kind,
            alpha = garch.params().alpha,
            beta = garch.params().beta,
            gamma = garch.params().gamma,
            persistence = garch.params().persistence(),
            "volatility model fitted"
        );

        self.fitted = Some(FittedVolatility {
            garch,
            historical_volatility,
        });
        Ok(())
    }

    /// Volatility `steps` periods ahead with intervals around `point_forecast`
    pub fn forecast_volatility(
        &self,
        point_forecast: f64,
        steps: usize,
    ) -> Result<VolatilityForecast> {
        let fitted = self
            .fitted
            .as_ref()
            .ok_or_else(|| ForecastError::NotFitted(self.kind.to_string()))?;
        if steps == 0 {
            return Err(ForecastError::InvalidParameter(
                "Volatility horizon must be at least one step".to_string(),
            ));
        }

        let variance = fitted
            .garch
            .forecast_variance(steps)
            .last()
            .copied()
            .unwrap_or(f64::NAN);
        let volatility = variance.sqrt() / RESIDUAL_SCALE;
        if !(volatility.is_finite() && volatility > 0.0) {
            return Err(ForecastError::VolatilityFit(format!(
                "Forecast volatility {} is not positive and finite",
                volatility
            )));
        }

        Ok(VolatilityForecast {
            horizon_days: steps,
            volatility,
            confidence_intervals: ConfidenceIntervals::around(point_forecast, volatility),
            regime: self.detect_regime(volatility),
            historical_mean_volatility: fitted.historical_volatility,
            model_kind: self.kind,
        })
    }

    /// Classify `volatility` against the fit-time history; NORMAL without history
    pub fn detect_regime(&self, volatility: f64) -> Regime {
        match self.historical_volatility() {
            Some(historical) if historical > 0.0 && historical.is_finite() => {
                Regime::from_ratio(volatility / historical)
            }
            _ => Regime::Normal,
        }
    }

    /// Serialize the fitted state
    pub fn save_state(&self) -> Result<serde_json::Value> {
        let fitted = self
            .fitted
            .as_ref()
            .ok_or_else(|| ForecastError::NotFitted(self.kind.to_string()))?;
        Ok(serde_json::to_value(fitted)?)
    }

    /// Restore a state produced by `save_state`
    pub fn load_state(&mut self, state: serde_json::Value) -> Result<()> {
        let fitted: FittedVolatility = serde_json::from_value(state)?;
        self.kind = fitted.garch.kind();
        self.fitted = Some(fitted);
        Ok(())
    }
}
