//! Descriptive statistics over plain `f64` slices
//!
//! All functions ignore nothing: callers are expected to strip non-finite
//! values first (see [`finite_values`]).

use crate::{MathError, Result};

/// Keep only finite values, preserving order
pub fn finite_values(values: &[f64]) -> Vec<f64> {
    values.iter().copied().filter(|v| v.is_finite()).collect()
}

/// Arithmetic mean
pub fn mean(values: &[f64]) -> Result<f64> {
    if values.is_empty() {
        return Err(MathError::InsufficientData(
            "Cannot calculate mean of an empty series".to_string(),
        ));
    }

    Ok(values.iter().sum::<f64>() / values.len() as f64)
}

/// Sample variance (n - 1 denominator)
pub fn variance(values: &[f64]) -> Result<f64> {
    if values.len() < 2 {
        return Err(MathError::InsufficientData(format!(
            "Variance needs at least 2 values, have {}",
            values.len()
        )));
    }

    let m = mean(values)?;
    let sum_sq: f64 = values.iter().map(|&v| (v - m).powi(2)).sum();

    Ok(sum_sq / (values.len() - 1) as f64)
}

/// Sample standard deviation (n - 1 denominator)
pub fn std_dev(values: &[f64]) -> Result<f64> {
    Ok(variance(values)?.sqrt())
}

/// Simple percentage returns `p[t] / p[t-1] - 1`
pub fn pct_returns(prices: &[f64]) -> Result<Vec<f64>> {
    if prices.len() < 2 {
        return Err(MathError::InsufficientData(
            "Returns need at least 2 prices".to_string(),
        ));
    }

    prices
        .windows(2)
        .map(|w| {
            if w[0] == 0.0 {
                Err(MathError::CalculationError(
                    "Cannot compute return from a zero price".to_string(),
                ))
            } else {
                Ok(w[1] / w[0] - 1.0)
            }
        })
        .collect()
}

/// First differences `x[t] - x[t-1]`
pub fn differences(values: &[f64]) -> Vec<f64> {
    values.windows(2).map(|w| w[1] - w[0]).collect()
}

/// Fraction of steps where the predicted move has the same sign as the actual move
///
/// Moves are measured against the previous *actual* value, so the first
/// point only anchors the comparison. Returned as a percentage in `[0, 100]`.
pub fn directional_accuracy(actual: &[f64], predicted: &[f64]) -> Result<f64> {
    if actual.len() != predicted.len() {
        return Err(MathError::InvalidInput(format!(
            "Length mismatch: actual {} vs predicted {}",
            actual.len(),
            predicted.len()
        )));
    }
    if actual.len() < 2 {
        return Err(MathError::InsufficientData(
            "Directional accuracy needs at least 2 points".to_string(),
        ));
    }

    let mut hits = 0usize;
    let mut total = 0usize;
    for i in 1..actual.len() {
        let actual_move = actual[i] - actual[i - 1];
        let predicted_move = predicted[i] - actual[i - 1];
        if actual_move == 0.0 {
            continue;
        }
        total += 1;
        if actual_move.signum() == predicted_move.signum() {
            hits += 1;
        }
    }

    if total == 0 {
        return Ok(0.0);
    }

    Ok(hits as f64 / total as f64 * 100.0)
}
