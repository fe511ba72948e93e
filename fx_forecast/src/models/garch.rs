//! GARCH(1,1) and GJR-GARCH(1,1) conditional variance models
//!
//! Parameters are estimated by Gaussian maximum likelihood with variance
//! targeting: omega is pinned so the unconditional variance equals the sample
//! variance, leaving alpha, beta and (for the asymmetric variant) gamma to a
//! coarse grid search followed by a pattern-search refinement.

use crate::error::{ForecastError, Result};
use crate::volatility::VolatilityModelKind;
use serde::{Deserialize, Serialize};

/// Upper bound on persistence to keep the process covariance-stationary
const MAX_PERSISTENCE: f64 = 0.999;

/// Smallest step of the pattern search
const MIN_STEP: f64 = 1e-4;

/// Iteration cap of the pattern search
const MAX_ITERATIONS: usize = 500;

const ALPHA_GRID: [f64; 5] = [0.02, 0.05, 0.08, 0.12, 0.18];
const BETA_GRID: [f64; 6] = [0.60, 0.70, 0.80, 0.85, 0.90, 0.94];
const GAMMA_GRID: [f64; 4] = [0.0, 0.05, 0.10, 0.20];

/// Estimated variance equation coefficients
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GarchParams {
    /// Constant term
    pub omega: f64,
    /// Reaction to the previous squared shock
    pub alpha: f64,
    /// Extra reaction to negative shocks (zero for the symmetric model)
    pub gamma: f64,
    /// Weight of the previous variance
    pub beta: f64,
    /// Maximised Gaussian log-likelihood
    pub log_likelihood: f64,
}

impl GarchParams {
    /// `alpha + gamma / 2 + beta`
    pub fn persistence(&self) -> f64 {
        self.alpha + self.gamma / 2.0 + self.beta
    }
}

/// Fitted conditional variance model on a prepared (demeaned, scaled) series
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GarchModel {
    kind: VolatilityModelKind,
    params: GarchParams,
    sample_variance: f64,
    last_variance: f64,
    last_shock: f64,
}

impl GarchModel {
    /// Estimate the model on `shocks`
    pub fn fit(shocks: &[f64], kind: VolatilityModelKind) -> Result<Self> {
        if shocks.len() < 2 {
            return Err(ForecastError::InsufficientData {
                required: 2,
                actual: shocks.len(),
            });
        }
        if shocks.iter().any(|s| !s.is_finite()) {
            return Err(ForecastError::VolatilityFit(
                "Shock series contains non-finite values".to_string(),
            ));
        }

        let n = shocks.len() as f64;
        let sample_variance = shocks.iter().map(|s| s * s).sum::<f64>() / n;
        if !(sample_variance > 0.0 && sample_variance.is_finite()) {
            return Err(ForecastError::VolatilityFit(
                "Shock series has zero variance".to_string(),
            ));
        }

        let asymmetric = kind == VolatilityModelKind::Asymmetric;
        let gamma_grid: &[f64] = if asymmetric { &GAMMA_GRID } else { &[0.0] };

        // Coarse grid
        let mut best: Option<([f64; 3], f64)> = None;
        for &alpha in &ALPHA_GRID {
            for &beta in &BETA_GRID {
                for &gamma in gamma_grid {
                    let candidate = [alpha, gamma, beta];
                    let nll = negative_log_likelihood(shocks, sample_variance, candidate);
                    if nll.is_finite() && best.map_or(true, |(_, b)| nll < b) {
                        best = Some((candidate, nll));
                    }
                }
            }
        }

        let (mut point, mut score) = best.ok_or_else(|| {
            ForecastError::VolatilityFit("No feasible starting point in the grid".to_string())
        })?;

        // Pattern search refinement over (alpha, gamma, beta)
        let free: &[usize] = if asymmetric { &[0, 1, 2] } else { &[0, 2] };
        let mut step = 0.02;
        let mut iterations = 0;
        while step >= MIN_STEP && iterations < MAX_ITERATIONS {
            iterations += 1;
            let mut improved = false;
            for &i in free {
                for direction in [1.0, -1.0] {
                    let mut trial = point;
                    trial[i] += direction * step;
                    let nll = negative_log_likelihood(shocks, sample_variance, trial);
                    if nll < score {
                        point = trial;
                        score = nll;
                        improved = true;
                    }
                }
            }
            if !improved {
                step /= 2.0;
            }
        }

        let [alpha, gamma, beta] = point;
        let omega = sample_variance * (1.0 - (alpha + gamma / 2.0 + beta));
        let params = GarchParams {
            omega,
            alpha,
            gamma,
            beta,
            log_likelihood: -score,
        };

        let variances = conditional_variances(shocks, sample_variance, &params);
        if variances.iter().any(|v| !(v.is_finite() && *v > 0.0)) {
            return Err(ForecastError::VolatilityFit(
                "Conditional volatility is not positive and finite".to_string(),
            ));
        }

        Ok(Self {
            kind,
            params,
            sample_variance,
            last_variance: variances[variances.len() - 1],
            last_shock: shocks[shocks.len() - 1],
        })
    }

    /// Which variance equation was fitted
    pub fn kind(&self) -> VolatilityModelKind {
        self.kind
    }

    /// Estimated coefficients
    pub fn params(&self) -> &GarchParams {
        &self.params
    }

    /// Variance implied by the coefficients in the long run
    pub fn unconditional_variance(&self) -> f64 {
        self.sample_variance
    }

    /// Variance forecasts for 1..=steps periods ahead
    pub fn forecast_variance(&self, steps: usize) -> Vec<f64> {
        let p = &self.params;
        let mut out = Vec::with_capacity(steps);
        if steps == 0 {
            return out;
        }

        let leverage = if self.last_shock < 0.0 { p.gamma } else { 0.0 };
        let mut variance = p.omega
            + (p.alpha + leverage) * self.last_shock * self.last_shock
            + p.beta * self.last_variance;
        out.push(variance);

        let persistence = p.persistence();
        for _ in 1..steps {
            variance = p.omega + persistence * variance;
            out.push(variance);
        }
        out
    }
}

/// Variance recursion, seeded with the sample variance
fn conditional_variances(shocks: &[f64], sample_variance: f64, p: &GarchParams) -> Vec<f64> {
    let mut variances = Vec::with_capacity(shocks.len());
    let mut variance = sample_variance;
    variances.push(variance);
    for t in 1..shocks.len() {
        let prev = shocks[t - 1];
        let leverage = if prev < 0.0 { p.gamma } else { 0.0 };
        variance = p.omega + (p.alpha + leverage) * prev * prev + p.beta * variance;
        variances.push(variance);
    }
    variances
}

/// Gaussian negative log-likelihood (constant dropped); infinite when infeasible
fn negative_log_likelihood(shocks: &[f64], sample_variance: f64, point: [f64; 3]) -> f64 {
    let [alpha, gamma, beta] = point;
    if alpha < 0.0 || gamma < 0.0 || beta < 0.0 {
        return f64::INFINITY;
    }
    let persistence = alpha + gamma / 2.0 + beta;
    if persistence >= MAX_PERSISTENCE {
        return f64::INFINITY;
    }

    let params = GarchParams {
        omega: sample_variance * (1.0 - persistence),
        alpha,
        gamma,
        beta,
        log_likelihood: 0.0,
    };

    let mut total = 0.0;
    for (variance, shock) in conditional_variances(shocks, sample_variance, &params)
        .iter()
        .zip(shocks.iter())
    {
        if !(*variance > 0.0 && variance.is_finite()) {
            return f64::INFINITY;
        }
        total += variance.ln() + shock * shock / variance;
    }
    0.5 * total
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;
    use rand_distr::{Distribution, Normal};

    /// Simulate a GARCH(1,1) path with known coefficients
    fn simulate(n: usize, omega: f64, alpha: f64, beta: f64, seed: u64) -> Vec<f64> {
        let mut rng = StdRng::seed_from_u64(seed);
        let normal = Normal::new(0.0, 1.0).unwrap();
        let mut variance = omega / (1.0 - alpha - beta);
        let mut out = Vec::with_capacity(n);
        for _ in 0..n {
            let shock = variance.sqrt() * normal.sample(&mut rng);
            out.push(shock);
            variance = omega + alpha * shock * shock + beta * variance;
        }
        out
    }

    #[test]
    fn test_fit_recovers_persistent_process() {
        let shocks = simulate(1500, 0.05, 0.10, 0.85, 3);
        let model = GarchModel::fit(&shocks, VolatilityModelKind::Symmetric).unwrap();
        let p = model.params();

        assert_eq!(p.gamma, 0.0);
        assert!(p.persistence() > 0.7 && p.persistence() < MAX_PERSISTENCE);
        assert!(p.omega > 0.0);
    }

    #[test]
    fn test_forecast_reverts_to_unconditional_variance() {
        let shocks = simulate(800, 0.05, 0.10, 0.85, 9);
        let model = GarchModel::fit(&shocks, VolatilityModelKind::Asymmetric).unwrap();

        let path = model.forecast_variance(1000);
        assert_eq!(path.len(), 1000);
        let terminal = path[path.len() - 1];
        let target = model.unconditional_variance();
        assert!((terminal - target).abs() / target < 0.05);
    }

    #[test]
    fn test_constant_series_is_rejected() {
        let shocks = vec![0.0; 50];
        assert!(matches!(
            GarchModel::fit(&shocks, VolatilityModelKind::Symmetric),
            Err(ForecastError::VolatilityFit(_))
        ));
    }

    #[test]
    fn test_infeasible_points_have_infinite_likelihood() {
        let shocks = simulate(100, 0.05, 0.10, 0.85, 1);
        assert!(negative_log_likelihood(&shocks, 1.0, [0.5, 0.0, 0.6]).is_infinite());
        assert!(negative_log_likelihood(&shocks, 1.0, [-0.1, 0.0, 0.6]).is_infinite());
        assert!(negative_log_likelihood(&shocks, 1.0, [0.1, 0.0, 0.8]).is_finite());
    }
}
