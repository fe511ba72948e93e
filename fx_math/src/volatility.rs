//! Streaming rolling standard deviation

use crate::{MathError, Result};
use std::collections::VecDeque;

/// Streaming rolling standard deviation over a fixed window
#[derive(Debug, Clone)]
pub struct RollingStd {
    period: usize,
    values: VecDeque<f64>,
}

impl RollingStd {
    /// Create a new rolling standard deviation with the specified period
    pub fn new(period: usize) -> Result<Self> {
        if period < 2 {
            return Err(MathError::InvalidInput(
                "Period must be at least 2".to_string(),
            ));
        }

        Ok(Self {
            period,
            values: VecDeque::with_capacity(period),
        })
    }

    /// Push a new observation; non-finite values are ignored
    pub fn update(&mut self, value: f64) {
        if !value.is_finite() {
            return;
        }

        self.values.push_back(value);
        if self.values.len() > self.period {
            self.values.pop_front();
        }
    }

    /// Feed every value of a slice
    pub fn extend(&mut self, values: &[f64]) {
        for &v in values {
            self.update(v);
        }
    }

    /// Sample standard deviation of the current window
    ///
    /// Uses whatever is in the window once at least two values are present,
    /// so a short series still yields an estimate.
    pub fn value(&self) -> Result<f64> {
        if self.values.len() < 2 {
            return Err(MathError::InsufficientData(format!(
                "Not enough data to calculate standard deviation. Need 2 values, have {}.",
                self.values.len()
            )));
        }

        let n = self.values.len() as f64;
        let mean = self.values.iter().sum::<f64>() / n;
        let variance = self
            .values
            .iter()
            .map(|&v| (v - mean).powi(2))
            .sum::<f64>()
            / (n - 1.0);

        Ok(variance.sqrt())
    }

    /// Whether the window is full
    pub fn is_ready(&self) -> bool {
        self.values.len() == self.period
    }

    /// Clear all values
    pub fn reset(&mut self) {
        self.values.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_rolling_std_window() {
        let mut rs = RollingStd::new(3).unwrap();
        assert!(rs.value().is_err());

        rs.extend(&[1.0, 2.0, 3.0]);
        assert!(rs.is_ready());
        assert_relative_eq!(rs.value().unwrap(), 1.0);

        // Oldest value falls out of the window
        rs.update(5.0);
        assert_relative_eq!(rs.value().unwrap(), (7.0f64 / 3.0).sqrt(), epsilon = 1e-12);

        rs.update(f64::NAN);
        assert_relative_eq!(rs.value().unwrap(), (7.0f64 / 3.0).sqrt(), epsilon = 1e-12);

        rs.reset();
        assert!(!rs.is_ready());
    }
}
