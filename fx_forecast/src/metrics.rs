//! Metrics for evaluating forecast performance

use crate::error::{ForecastError, Result};
use serde::{Deserialize, Serialize};

/// Forecast performance metrics
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ForecastMetrics {
    /// Root Mean Squared Error
    pub rmse: f64,
    /// Mean Absolute Error
    pub mae: f64,
    /// Mean Absolute Percentage Error, in percent
    pub mape: f64,
    /// Share of correctly predicted moves, in percent
    pub directional_accuracy: f64,
    /// Number of evaluated points
    pub n_samples: usize,
}

/// Evaluate forecast accuracy against actual values
pub fn evaluate_forecast(forecast: &[f64], actual: &[f64]) -> Result<ForecastMetrics> {
    if forecast.len() != actual.len() || forecast.is_empty() {
        return Err(ForecastError::ValidationError(
            "Forecast and actual values must have the same non-zero length".to_string(),
        ));
    }

    let n = forecast.len() as f64;
    let errors: Vec<f64> = actual
        .iter()
        .zip(forecast.iter())
        .map(|(&a, &f)| a - f)
        .collect();

    let mae = errors.iter().map(|e| e.abs()).sum::<f64>() / n;
    let rmse = (errors.iter().map(|e| e.powi(2)).sum::<f64>() / n).sqrt();

    // Zero actuals are skipped rather than blowing up the ratio
    let (ape_sum, ape_count) = actual
        .iter()
        .zip(errors.iter())
        .filter(|(&a, _)| a != 0.0)
        .fold((0.0, 0usize), |(sum, count), (&a, &e)| {
            (sum + e.abs() / a.abs() * 100.0, count + 1)
        });
    let mape = if ape_count > 0 {
        ape_sum / ape_count as f64
    } else {
        0.0
    };

    let directional_accuracy = if actual.len() >= 2 {
        fx_math::stats::directional_accuracy(actual, forecast)?
    } else {
        0.0
    };

    Ok(ForecastMetrics {
        rmse,
        mae,
        mape,
        directional_accuracy,
        n_samples: forecast.len(),
    })
}

/// Sample-weighted average of several evaluations, e.g. walk-forward folds
pub fn average_metrics(folds: &[ForecastMetrics]) -> Result<ForecastMetrics> {
    let total: usize = folds.iter().map(|m| m.n_samples).sum();
    if folds.is_empty() || total == 0 {
        return Err(ForecastError::ValidationError(
            "Cannot average an empty set of metrics".to_string(),
        ));
    }

    Ok(ForecastMetrics {
        rmse: weighted_mean(folds, total, |m| m.rmse),
        mae: weighted_mean(folds, total, |m| m.mae),
        mape: weighted_mean(folds, total, |m| m.mape),
        directional_accuracy: weighted_mean(folds, total, |m| m.directional_accuracy),
        n_samples: total,
    })
}

fn weighted_mean<F>(folds: &[ForecastMetrics], total: usize, field: F) -> f64
where
    F: Fn(&ForecastMetrics) -> f64,
{
    folds
        .iter()
        .map(|m| field(m) * m.n_samples as f64)
        .sum::<f64>()
        / total as f64
}

impl std::fmt::Display for ForecastMetrics {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "Forecast Performance Metrics:")?;
        writeln!(f, "  RMSE:      {:.6}", self.rmse)?;
        writeln!(f, "  MAE:       {:.6}", self.mae)?;
        writeln!(f, "  MAPE:      {:.4}%", self.mape)?;
        writeln!(f, "  Direction: {:.2}%", self.directional_accuracy)?;
        writeln!(f, "  Samples:   {}", self.n_samples)?;
        Ok(())
    }
}
