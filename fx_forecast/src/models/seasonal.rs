//! Seasonal regression with exogenous regressors
//!
//! A ridge least-squares fit on a linear trend, Fourier seasonal terms,
//! autoregressive lags of the rate and the current value of each exogenous
//! series. The time index is the number of calendar days since the first
//! training date, so gaps in the history keep their real spacing.

use crate::data::TimeSeriesData;
use crate::error::{ForecastError, Result};
use crate::metrics::{evaluate_forecast, ForecastMetrics};
use crate::models::{
    collect_columns, future_exog_value, ExogForecast, ForecasterKind, PointForecaster,
};
use chrono::NaiveDate;
use fx_math::LeastSquares;
use serde::{Deserialize, Serialize};
use std::f64::consts::PI;

/// Days per unit of the trend regressor
const TREND_SCALE_DAYS: f64 = 365.0;

/// Hyperparameters of the seasonal regression forecaster
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SeasonalParams {
    /// Length of the seasonal cycle in days
    pub seasonal_period: usize,
    /// Number of sine/cosine pairs
    pub fourier_order: usize,
    /// Number of autoregressive lags
    pub ar_lags: usize,
    /// L2 penalty on the non-intercept coefficients
    pub ridge_lambda: f64,
}

impl Default for SeasonalParams {
    fn default() -> Self {
        Self {
            seasonal_period: 7,
            fourier_order: 2,
            ar_lags: 2,
            ridge_lambda: 0.1,
        }
    }
}

impl SeasonalParams {
    /// Validate parameter ranges
    pub fn validate(&self) -> Result<()> {
        if self.seasonal_period < 2 {
            return Err(ForecastError::InvalidParameter(format!(
                "seasonal_period must be at least 2, got {}",
                self.seasonal_period
            )));
        }
        if self.fourier_order > self.seasonal_period / 2 {
            return Err(ForecastError::InvalidParameter(format!(
                "fourier_order {} exceeds half the seasonal period {}",
                self.fourier_order, self.seasonal_period
            )));
        }
        if self.ar_lags > 30 {
            return Err(ForecastError::InvalidParameter(format!(
                "ar_lags must be at most 30, got {}",
                self.ar_lags
            )));
        }
        if !(self.ridge_lambda.is_finite() && self.ridge_lambda >= 0.0) {
            return Err(ForecastError::InvalidParameter(format!(
                "ridge_lambda must be a non-negative number, got {}",
                self.ridge_lambda
            )));
        }
        Ok(())
    }

    fn n_regressors(&self, n_exog: usize) -> usize {
        2 + 2 * self.fourier_order + self.ar_lags + n_exog
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct FittedSeasonal {
    target: String,
    exog: Vec<String>,
    origin: NaiveDate,
    regression: LeastSquares,
}

#[derive(Serialize, Deserialize)]
struct SavedState {
    params: SeasonalParams,
    fitted: FittedSeasonal,
}

/// Seasonal regression point forecaster (ensemble component B)
#[derive(Debug, Clone)]
pub struct SeasonalRegressionForecaster {
    name: String,
    params: SeasonalParams,
    fitted: Option<FittedSeasonal>,
}

impl SeasonalRegressionForecaster {
    /// Create an untrained forecaster
    pub fn new(params: SeasonalParams) -> Self {
        Self {
            name: format!(
                "SeasonalRegression(period={}, order={}, ar={})",
                params.seasonal_period, params.fourier_order, params.ar_lags
            ),
            params,
            fitted: None,
        }
    }

    /// Hyperparameters in use
    pub fn params(&self) -> &SeasonalParams {
        &self.params
    }

    /// Fitted coefficients, intercept first
    pub fn coefficients(&self) -> Option<&[f64]> {
        self.fitted.as_ref().map(|f| f.regression.coefficients())
    }

    /// Regressor row for a day offset, given the preceding levels and exogenous values
    fn regressor_row(&self, day: i64, recent: &[f64], exog: &[f64]) -> Vec<f64> {
        let mut row = Vec::with_capacity(self.params.n_regressors(exog.len()));
        row.push(1.0);
        row.push(day as f64 / TREND_SCALE_DAYS);

        let period = self.params.seasonal_period as f64;
        for k in 1..=self.params.fourier_order {
            let angle = 2.0 * PI * k as f64 * day as f64 / period;
            row.push(angle.sin());
            row.push(angle.cos());
        }

        // recent is ordered oldest to newest
        for lag in 1..=self.params.ar_lags {
            row.push(recent[recent.len() - lag]);
        }

        row.extend_from_slice(exog);
        row
    }
}

impl PointForecaster for SeasonalRegressionForecaster {
    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> ForecasterKind {
        ForecasterKind::SeasonalRegression
    }

    fn train(
        &mut self,
        data: &TimeSeriesData,
        target: &str,
        exog: &[String],
    ) -> Result<ForecastMetrics> {
        self.params.validate()?;
        self.fitted = None;

        let (y, exog_values) = collect_columns(data, target, exog)?;
        let ar = self.params.ar_lags;
        let required = (ar + self.params.n_regressors(exog.len()) + 10).max(30);
        if y.len() < required {
            return Err(ForecastError::InsufficientData {
                required,
                actual: y.len(),
            });
        }

        let origin = data.dates()[0];
        let mut rows = Vec::with_capacity(y.len() - ar);
        for t in ar..y.len() {
            let day = (data.dates()[t] - origin).num_days();
            let exog_t: Vec<f64> = exog_values.iter().map(|s| s[t]).collect();
            rows.push(self.regressor_row(day, &y[..t], &exog_t));
        }
        let targets = &y[ar..];

        let regression = LeastSquares::fit(&rows, targets, self.params.ridge_lambda)?;

        let fitted_values = rows
            .iter()
            .map(|row| regression.predict(row))
            .collect::<fx_math::Result<Vec<f64>>>()?;
        let metrics = evaluate_forecast(&fitted_values, targets)?;

        self.fitted = Some(FittedSeasonal {
            target: target.to_string(),
            exog: exog.to_vec(),
            origin,
            regression,
        });

        Ok(metrics)
    }

    fn predict(
        &self,
        history: &TimeSeriesData,
        steps: usize,
        exog_forecast: Option<&ExogForecast>,
    ) -> Result<Vec<f64>> {
        let fitted = self
            .fitted
            .as_ref()
            .ok_or_else(|| ForecastError::NotFitted(self.name.clone()))?;

        let (y, exog_values) = collect_columns(history, &fitted.target, &fitted.exog)?;
        if y.len() < self.params.ar_lags.max(1) {
            return Err(ForecastError::InsufficientData {
                required: self.params.ar_lags.max(1),
                actual: y.len(),
            });
        }

        let last_exog: Vec<f64> = exog_values.iter().map(|s| s[s.len() - 1]).collect();
        let future_dates = history.future_dates(steps)?;
        let mut levels = y;
        let mut out = Vec::with_capacity(steps);

        for (step, date) in future_dates.iter().enumerate() {
            let day = (*date - fitted.origin).num_days();
            let exog_t: Vec<f64> = fitted
                .exog
                .iter()
                .zip(last_exog.iter())
                .map(|(name, &last)| future_exog_value(name, last, step, exog_forecast))
                .collect();

            let row = self.regressor_row(day, &levels, &exog_t);
            let value = fitted.regression.predict(&row)?;
            if !value.is_finite() {
                return Err(ForecastError::ModelError(
                    "Seasonal regression produced a non-finite forecast".to_string(),
                ));
            }
            levels.push(value);
            out.push(value);
        }

        Ok(out)
    }

    fn is_fitted(&self) -> bool {
        self.fitted.is_some()
    }

    fn save_state(&self) -> Result<serde_json::Value> {
        let fitted = self
            .fitted
            .clone()
            .ok_or_else(|| ForecastError::NotFitted(self.name.clone()))?;
        Ok(serde_json::to_value(SavedState {
            params: self.params.clone(),
            fitted,
        })?)
    }

    fn load_state(&mut self, state: serde_json::Value) -> Result<()> {
        let saved: SavedState = serde_json::from_value(state)?;
        saved.params.validate()?;
        *self = SeasonalRegressionForecaster::new(saved.params);
        self.fitted = Some(saved.fitted);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use chrono::Days;

    fn weekly_series(n: usize) -> TimeSeriesData {
        let start = NaiveDate::from_ymd_opt(2022, 1, 3).unwrap();
        let dates: Vec<NaiveDate> = (0..n as u64)
            .map(|d| start.checked_add_days(Days::new(d)).unwrap())
            .collect();
        let values: Vec<f64> = (0..n)
            .map(|t| 20.0 + 0.01 * t as f64 + 0.3 * (2.0 * PI * t as f64 / 7.0).sin())
            .collect();
        TimeSeriesData::from_series(dates, "rate", values).unwrap()
    }

    #[test]
    fn test_recovers_weekly_pattern() {
        let data = weekly_series(140);
        let (train, test) = data.train_test_split(0.05).unwrap();

        let mut model = SeasonalRegressionForecaster::new(SeasonalParams {
            ar_lags: 0,
            fourier_order: 1,
            ridge_lambda: 0.0,
            ..SeasonalParams::default()
        });
        let metrics = model.train(&train, "rate", &[]).unwrap();
        assert!(metrics.rmse < 1e-6);

        let forecast = model.predict(&train, test.len(), None).unwrap();
        for (f, a) in forecast.iter().zip(test.column("rate").unwrap()) {
            assert_relative_eq!(*f, *a, epsilon = 1e-6);
        }
    }

    #[test]
    fn test_exogenous_forecast_is_used() {
        let data = weekly_series(120);
        let oil: Vec<f64> = (0..120).map(|t| 60.0 + (t % 5) as f64).collect();
        let rate: Vec<f64> = data
            .column("rate")
            .unwrap()
            .iter()
            .zip(oil.iter())
            .map(|(r, o)| r + 0.05 * o)
            .collect();
        let data = TimeSeriesData::new(
            data.dates().to_vec(),
            vec![("rate".to_string(), rate), ("oil".to_string(), oil)],
        )
        .unwrap();

        let mut model = SeasonalRegressionForecaster::new(SeasonalParams::default());
        model.train(&data, "rate", &["oil".to_string()]).unwrap();

        let mut high = ExogForecast::new();
        high.insert("oil".to_string(), vec![100.0; 3]);
        let base = model.predict(&data, 3, None).unwrap();
        let shocked = model.predict(&data, 3, Some(&high)).unwrap();
        assert!(shocked[0] > base[0]);
    }

    #[test]
    fn test_missing_exogenous_column() {
        let data = weekly_series(60);
        let mut model = SeasonalRegressionForecaster::new(SeasonalParams::default());
        assert!(matches!(
            model.train(&data, "rate", &["oil".to_string()]),
            Err(ForecastError::MissingColumn(_))
        ));
    }

    #[test]
    fn test_invalid_fourier_order() {
        let params = SeasonalParams {
            seasonal_period: 4,
            fourier_order: 3,
            ..SeasonalParams::default()
        };
        assert!(params.validate().is_err());
    }

    #[test]
    fn test_state_round_trip() {
        let data = weekly_series(90);
        let mut model = SeasonalRegressionForecaster::new(SeasonalParams::default());
        model.train(&data, "rate", &[]).unwrap();

        let mut restored = SeasonalRegressionForecaster::new(SeasonalParams::default());
        restored.load_state(model.save_state().unwrap()).unwrap();
        assert_eq!(restored.coefficients(), model.coefficients());
        assert_eq!(
            restored.predict(&data, 5, None).unwrap(),
            model.predict(&data, 5, None).unwrap()
        );
    }
}
