//! Signals that decide whether a re-optimization run is warranted

use crate::error::{ForecastError, Result};
use crate::metrics::ForecastMetrics;
use crate::monitor::ModelAlert;
use crate::optimization::deployment::DeployedConfig;
use chrono::{DateTime, Duration, Utc};
use fx_math::stats::{mean, pct_returns, variance};
use serde::{Deserialize, Serialize};
use statrs::distribution::{ContinuousCDF, StudentsT};

/// Why a run was triggered
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TriggerReason {
    DataDrift,
    PerformanceDegradation,
    ScheduledRefresh,
    NoDeployedConfig,
}

/// Comparison of recent returns with the reference window
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DriftReport {
    pub t_statistic: f64,
    pub p_value: f64,
    /// Recent std divided by reference std
    pub volatility_ratio: f64,
    pub recent_size: usize,
    pub reference_size: usize,
    pub detected: bool,
}

/// Thresholds of the drift detector
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DriftThresholds {
    /// Number of most recent returns compared against the rest
    pub window: usize,
    /// Mean shift is significant below this p-value
    pub p_value: f64,
    /// Volatility shift is flagged above this ratio or below its inverse
    pub volatility_ratio: f64,
}

/// Welch t-test on mean returns plus a volatility-ratio check
pub fn detect_drift(levels: &[f64], thresholds: &DriftThresholds) -> Result<DriftReport> {
    let returns = pct_returns(levels)?;
    if thresholds.window < 2 || returns.len() < 2 * thresholds.window {
        return Err(ForecastError::InsufficientData {
            required: 2 * thresholds.window.max(2) + 1,
            actual: levels.len(),
        });
    }

    let split = returns.len() - thresholds.window;
    let reference = &returns[..split];
    let recent = &returns[split..];

    let (n1, n2) = (recent.len() as f64, reference.len() as f64);
    let (m1, m2) = (mean(recent)?, mean(reference)?);
    let (v1, v2) = (variance(recent)?, variance(reference)?);

    let se1 = v1 / n1;
    let se2 = v2 / n2;
    let se = (se1 + se2).sqrt();

    let (t_statistic, p_value) = if se > 0.0 && se.is_finite() {
        let t = (m1 - m2) / se;
        let df = (se1 + se2).powi(2) / (se1.powi(2) / (n1 - 1.0) + se2.powi(2) / (n2 - 1.0));
        let dist = StudentsT::new(0.0, 1.0, df)
            .map_err(|e| ForecastError::ValidationError(format!("Student-t: {}", e)))?;
        (t, 2.0 * (1.0 - dist.cdf(t.abs())))
    } else {
        (0.0, 1.0)
    };

    let volatility_ratio = if v2 > 0.0 { (v1 / v2).sqrt() } else { 1.0 };
    let detected = p_value < thresholds.p_value
        || volatility_ratio > thresholds.volatility_ratio
        || volatility_ratio < 1.0 / thresholds.volatility_ratio;

    Ok(DriftReport {
        t_statistic,
        p_value,
        volatility_ratio,
        recent_size: recent.len(),
        reference_size: reference.len(),
        detected,
    })
}

/// Whether the deployed configuration is missing or older than `max_age_days`
///
/// Returns the reason, if due, and the configuration age in days.
pub fn schedule_due(
    deployed: Option<&DeployedConfig>,
    now: DateTime<Utc>,
    max_age_days: i64,
) -> (Option<TriggerReason>, Option<i64>) {
    match deployed {
        None => (Some(TriggerReason::NoDeployedConfig), None),
        Some(d) => {
            let age = (now - d.deployed_at).num_days();
            let reason = (age >= max_age_days).then_some(TriggerReason::ScheduledRefresh);
            (reason, Some(age))
        }
    }
}

/// Record of the trigger stage
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct TriggerReport {
    pub triggered: bool,
    pub reasons: Vec<TriggerReason>,
    pub drift: Option<DriftReport>,
    pub production_metrics: Option<ForecastMetrics>,
    pub degradation_alerts: Vec<ModelAlert>,
    /// True when this run established the first baseline
    pub baseline_seeded: bool,
    pub config_age_days: Option<i64>,
    /// Set when the run was suppressed by the cooldown
    pub cooldown_until: Option<DateTime<Utc>>,
}

impl TriggerReport {
    /// Report for a run suppressed until `until`
    pub fn suppressed(until: DateTime<Utc>) -> Self {
        Self {
            cooldown_until: Some(until),
            ..Self::default()
        }
    }
}

/// Exponential backoff after rejected candidates
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CooldownPolicy {
    pub cooldown_days: i64,
    pub max_cooldown_days: i64,
}

impl CooldownPolicy {
    /// `cooldown_days * 2^(rejections - 1)`, capped; zero without rejections
    pub fn duration(&self, consecutive_rejections: u32) -> Duration {
        if consecutive_rejections == 0 || self.cooldown_days <= 0 {
            return Duration::zero();
        }
        let exponent = (consecutive_rejections - 1).min(20);
        let days = self
            .cooldown_days
            .saturating_mul(1i64 << exponent)
            .min(self.max_cooldown_days);
        Duration::days(days)
    }
}

/// Rejection streak of one horizon
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct CooldownState {
    pub consecutive_rejections: u32,
    pub until: Option<DateTime<Utc>>,
}

impl CooldownState {
    /// Register a rejected candidate at `now`
    pub fn record_rejection(&mut self, policy: &CooldownPolicy, now: DateTime<Utc>) {
        self.consecutive_rejections += 1;
        self.until = Some(now + policy.duration(self.consecutive_rejections));
    }

    /// Whether runs are still suppressed at `now`
    pub fn active_until(&self, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
        self.until.filter(|until| now < *until)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ModelConfig;
    use rstest::rstest;

    fn thresholds() -> DriftThresholds {
        DriftThresholds {
            window: 20,
            p_value: 0.01,
            volatility_ratio: 1.5,
        }
    }

    #[test]
    fn test_volatility_jump_is_drift() {
        // Alternating moves, four times larger in the last 20 returns
        let mut levels = vec![100.0];
        for i in 0..100 {
            let size = if i >= 80 { 0.04 } else { 0.01 };
            let step = if i % 2 == 0 { 1.0 + size } else { 1.0 - size };
            let last = *levels.last().unwrap();
            levels.push(last * step);
        }

        let report = detect_drift(&levels, &thresholds()).unwrap();
        assert!(report.volatility_ratio > 3.0);
        assert!(report.detected);
    }

    #[test]
    fn test_stable_alternating_series_has_no_drift() {
        let levels: Vec<f64> = (0..101)
            .map(|i| if i % 2 == 0 { 100.0 } else { 101.0 })
            .collect();
        let report = detect_drift(&levels, &thresholds()).unwrap();
        assert!(!report.detected);
    }

    #[test]
    fn test_short_series_is_rejected() {
        assert!(detect_drift(&[1.0, 1.1, 1.2], &thresholds()).is_err());
    }

    #[rstest]
    #[case(0, 0)]
    #[case(1, 3)]
    #[case(2, 6)]
    #[case(3, 12)]
    #[case(4, 24)]
    #[case(5, 30)]
    #[case(30, 30)]
    fn test_backoff_doubles_until_cap(#[case] rejections: u32, #[case] days: i64) {
        let policy = CooldownPolicy {
            cooldown_days: 3,
            max_cooldown_days: 30,
        };
        assert_eq!(policy.duration(rejections), Duration::days(days));
    }

    #[test]
    fn test_schedule_due() {
        let now = Utc::now();
        let deployed = DeployedConfig {
            config: ModelConfig::default(),
            horizon_days: 7,
            deployed_at: now - Duration::days(40),
            validation_rmse: None,
            version: 1,
        };

        assert_eq!(
            schedule_due(None, now, 30),
            (Some(TriggerReason::NoDeployedConfig), None)
        );
        assert_eq!(
            schedule_due(Some(&deployed), now, 30),
            (Some(TriggerReason::ScheduledRefresh), Some(40))
        );
        assert_eq!(schedule_due(Some(&deployed), now, 60), (None, Some(40)));
    }
}
