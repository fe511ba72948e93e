//! Forecast horizons and the horizon-keyed ensemble configuration
//!
//! Weights and the volatility model variant are looked up from a fixed table
//! by horizon bucket. Nothing here is learned online.

use crate::error::{ForecastError, Result};
use crate::volatility::VolatilityModelKind;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Forecast distance in days
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Horizon(u32);

impl Horizon {
    /// Create a horizon of `days` days
    pub fn new(days: u32) -> Result<Self> {
        if days == 0 {
            return Err(ForecastError::InvalidParameter(
                "Horizon must be at least one day".to_string(),
            ));
        }
        Ok(Self(days))
    }

    /// Number of days ahead
    pub fn days(&self) -> u32 {
        self.0
    }

    /// Storage label, e.g. `7d`
    pub fn label(&self) -> String {
        format!("{}d", self.0)
    }

    /// Weight-table bucket this horizon falls into
    pub fn bucket(&self) -> HorizonBucket {
        HorizonBucket::from_days(self.0)
    }
}

impl fmt::Display for Horizon {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}d", self.0)
    }
}

impl FromStr for Horizon {
    type Err = ForecastError;

    fn from_str(s: &str) -> Result<Self> {
        let trimmed = s.trim();
        let digits = trimmed.strip_suffix('d').unwrap_or(trimmed);
        let days: u32 = digits.parse().map_err(|_| {
            ForecastError::InvalidParameter(format!("Invalid horizon '{}'", s))
        })?;
        Horizon::new(days)
    }
}

/// Horizon buckets of the weight table
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum HorizonBucket {
    /// Up to 7 days
    Week,
    /// 8 to 15 days
    Fortnight,
    /// 16 to 30 days
    Month,
    /// Beyond 30 days
    Long,
}

impl HorizonBucket {
    /// Bucket for a number of days
    pub fn from_days(days: u32) -> Self {
        match days {
            0..=7 => HorizonBucket::Week,
            8..=15 => HorizonBucket::Fortnight,
            16..=30 => HorizonBucket::Month,
            _ => HorizonBucket::Long,
        }
    }

    /// Nominal (tree model, seasonal model) weights
    fn nominal_weights(&self) -> (f64, f64) {
        match self {
            HorizonBucket::Week => (0.70, 0.30),
            HorizonBucket::Fortnight => (0.60, 0.40),
            HorizonBucket::Month => (0.45, 0.55),
            HorizonBucket::Long => (0.30, 0.70),
        }
    }

    /// Asymmetric variance for short horizons, symmetric beyond two weeks
    fn volatility_kind(&self) -> VolatilityModelKind {
        match self {
            HorizonBucket::Week | HorizonBucket::Fortnight => VolatilityModelKind::Asymmetric,
            HorizonBucket::Month | HorizonBucket::Long => VolatilityModelKind::Symmetric,
        }
    }
}

/// Weights applied to the two point forecasters for one horizon
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EnsembleWeights {
    /// Horizon the weights belong to
    pub horizon_days: u32,
    /// Weight of the boosted-tree forecaster
    pub weight_a: f64,
    /// Weight of the seasonal-regression forecaster
    pub weight_b: f64,
    /// Variance model used for confidence bands
    pub volatility_model_kind: VolatilityModelKind,
}

impl EnsembleWeights {
    /// Table lookup for a horizon
    pub fn for_horizon(horizon: Horizon) -> Self {
        let bucket = horizon.bucket();
        let (weight_a, weight_b) = bucket.nominal_weights();
        Self {
            horizon_days: horizon.days(),
            weight_a,
            weight_b,
            volatility_model_kind: bucket.volatility_kind(),
        }
    }

    /// Weights after dropping failed components, renormalised to sum to one
    ///
    /// Returns `None` when neither component is available.
    pub fn effective(&self, a_available: bool, b_available: bool) -> Option<(f64, f64)> {
        match (a_available, b_available) {
            (true, true) => {
                let total = self.weight_a + self.weight_b;
                Some((self.weight_a / total, self.weight_b / total))
            }
            (true, false) => Some((1.0, 0.0)),
            (false, true) => Some((0.0, 1.0)),
            (false, false) => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case(1)]
    #[case(7)]
    #[case(8)]
    #[case(15)]
    #[case(16)]
    #[case(30)]
    #[case(31)]
    #[case(365)]
    fn test_weights_sum_to_one(#[case] days: u32) {
        let weights = EnsembleWeights::for_horizon(Horizon::new(days).unwrap());
        let (a, b) = weights.effective(true, true).unwrap();
        assert!((a + b - 1.0).abs() < 1e-9);
        assert_eq!(weights.effective(true, false), Some((1.0, 0.0)));
        assert_eq!(weights.effective(false, true), Some((0.0, 1.0)));
        assert_eq!(weights.effective(false, false), None);
    }

    #[test]
    fn test_short_horizons_favor_trees() {
        let short = EnsembleWeights::for_horizon(Horizon::new(7).unwrap());
        let long = EnsembleWeights::for_horizon(Horizon::new(90).unwrap());
        assert!(short.weight_a > short.weight_b);
        assert!(long.weight_b > long.weight_a);
        assert_eq!(short.volatility_model_kind, VolatilityModelKind::Asymmetric);
        assert_eq!(long.volatility_model_kind, VolatilityModelKind::Symmetric);
    }

    #[test]
    fn test_horizon_parsing() {
        assert_eq!("7d".parse::<Horizon>().unwrap().days(), 7);
        assert_eq!("30".parse::<Horizon>().unwrap().label(), "30d");
        assert!("0d".parse::<Horizon>().is_err());
        assert!("week".parse::<Horizon>().is_err());
    }
}
