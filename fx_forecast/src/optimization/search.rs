//! Walk-forward scoring and hyperparameter search

use crate::data::TimeSeriesData;
use crate::ensemble::{EnsembleForecaster, DEFAULT_VALIDATION_SPLIT, MIN_TRAINING_ROWS};
use crate::error::{ForecastError, Result};
use crate::horizon::Horizon;
use crate::metrics::{average_metrics, evaluate_forecast, ForecastMetrics};
use crate::models::{BoostedTreesParams, ModelConfig, SeasonalParams};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use std::thread;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Scores a configuration on historical data
pub trait ConfigEvaluator: Send + Sync {
    fn evaluate(
        &self,
        data: &TimeSeriesData,
        horizon: Horizon,
        config: &ModelConfig,
    ) -> Result<ForecastMetrics>;
}

/// Expanding-window backtest
///
/// Fold `k` trains an ensemble on every row before its test window and
/// forecasts the whole window in one go. Fold metrics are averaged with
/// sample weights.
#[derive(Debug, Clone)]
pub struct WalkForwardEvaluator {
    target: String,
    exog: Vec<String>,
    n_folds: usize,
    validation_split: f64,
}

impl WalkForwardEvaluator {
    pub fn new(target: &str, exog: &[String], n_folds: usize) -> Self {
        Self {
            target: target.to_string(),
            exog: exog.to_vec(),
            n_folds: n_folds.max(1),
            validation_split: DEFAULT_VALIDATION_SPLIT,
        }
    }

    /// Validation split used inside each fold's ensemble training
    pub fn with_validation_split(mut self, validation_split: f64) -> Self {
        self.validation_split = validation_split;
        self
    }

    /// `(train_end, test_end)` index pairs of every fold
    fn folds(&self, n_rows: usize, window: usize) -> Result<Vec<(usize, usize)>> {
        let needed = MIN_TRAINING_ROWS + self.n_folds * window;
        if n_rows < needed {
            return Err(ForecastError::InsufficientData {
                required: needed,
                actual: n_rows,
            });
        }
        Ok((0..self.n_folds)
            .map(|k| {
                let test_end = n_rows - (self.n_folds - 1 - k) * window;
                (test_end - window, test_end)
            })
            .collect())
    }
}

impl ConfigEvaluator for WalkForwardEvaluator {
    fn evaluate(
        &self,
        data: &TimeSeriesData,
        horizon: Horizon,
        config: &ModelConfig,
    ) -> Result<ForecastMetrics> {
        config.validate()?;
        let window = horizon.days() as usize;
        let target = data.column(&self.target)?;

        let mut fold_metrics = Vec::with_capacity(self.n_folds);
        for (train_end, test_end) in self.folds(data.len(), window)? {
            let history = data.slice(0, Some(train_end))?;
            let mut ensemble = EnsembleForecaster::with_config(horizon, config);
            ensemble.train(&history, &self.target, &self.exog, self.validation_split)?;

            let forecast = ensemble.predict(&history, Some(window), None)?;
            let metrics = evaluate_forecast(&forecast.means(), &target[train_end..test_end])?;
            debug!(horizon = %horizon, train_end, rmse = metrics.rmse, "fold scored");
            fold_metrics.push(metrics);
        }

        average_metrics(&fold_metrics)
    }
}

/// Ranges sampled by [`RandomSearchOptimizer`]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchSpace {
    pub n_estimators: (usize, usize),
    /// Sampled log-uniformly
    pub learning_rate: (f64, f64),
    pub max_depth: (usize, usize),
    pub n_lags: (usize, usize),
    pub min_samples_leaf: (usize, usize),
    pub seasonal_periods: Vec<usize>,
    pub fourier_order: (usize, usize),
    pub ar_lags: (usize, usize),
    /// Sampled log-uniformly
    pub ridge_lambda: (f64, f64),
}

impl Default for SearchSpace {
    fn default() -> Self {
        Self {
            n_estimators: (50, 300),
            learning_rate: (0.01, 0.2),
            max_depth: (2, 5),
            n_lags: (3, 10),
            min_samples_leaf: (3, 15),
            seasonal_periods: vec![5, 7, 30],
            fourier_order: (1, 3),
            ar_lags: (1, 5),
            ridge_lambda: (0.001, 10.0),
        }
    }
}

impl SearchSpace {
    pub fn validate(&self) -> Result<()> {
        let int_ranges = [
            ("n_estimators", self.n_estimators),
            ("max_depth", self.max_depth),
            ("n_lags", self.n_lags),
            ("min_samples_leaf", self.min_samples_leaf),
            ("fourier_order", self.fourier_order),
            ("ar_lags", self.ar_lags),
        ];
        for (name, (lo, hi)) in int_ranges {
            if lo > hi {
                return Err(ForecastError::Config(format!(
                    "search range {} is empty: {}..={}",
                    name, lo, hi
                )));
            }
        }
        for (name, (lo, hi)) in [
            ("learning_rate", self.learning_rate),
            ("ridge_lambda", self.ridge_lambda),
        ] {
            if !(lo > 0.0 && lo <= hi) {
                return Err(ForecastError::Config(format!(
                    "search range {} must be positive and ordered: {}..={}",
                    name, lo, hi
                )));
            }
        }
        if self.seasonal_periods.iter().all(|p| *p < 2) {
            return Err(ForecastError::Config(
                "search needs at least one seasonal period >= 2".to_string(),
            ));
        }
        Ok(())
    }

    /// Draw one configuration
    pub fn sample<R: Rng>(&self, rng: &mut R) -> ModelConfig {
        let periods: Vec<usize> = self
            .seasonal_periods
            .iter()
            .copied()
            .filter(|p| *p >= 2)
            .collect();
        let seasonal_period = if periods.is_empty() {
            SeasonalParams::default().seasonal_period
        } else {
            periods[rng.gen_range(0..periods.len())]
        };
        let fourier_order = rng
            .gen_range(self.fourier_order.0..=self.fourier_order.1)
            .min(seasonal_period / 2);

        ModelConfig {
            boosted_trees: BoostedTreesParams {
                n_estimators: rng.gen_range(self.n_estimators.0..=self.n_estimators.1),
                learning_rate: log_uniform(rng, self.learning_rate),
                max_depth: rng.gen_range(self.max_depth.0..=self.max_depth.1),
                n_lags: rng.gen_range(self.n_lags.0..=self.n_lags.1),
                min_samples_leaf: rng
                    .gen_range(self.min_samples_leaf.0..=self.min_samples_leaf.1),
            },
            seasonal: SeasonalParams {
                seasonal_period,
                fourier_order,
                ar_lags: rng.gen_range(self.ar_lags.0..=self.ar_lags.1),
                ridge_lambda: log_uniform(rng, self.ridge_lambda),
            },
        }
    }
}

fn log_uniform<R: Rng>(rng: &mut R, (lo, hi): (f64, f64)) -> f64 {
    if lo >= hi {
        return lo;
    }
    rng.gen_range(lo.ln()..=hi.ln()).exp()
}

/// Search budget and reproducibility settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchSettings {
    pub space: SearchSpace,
    pub max_trials: usize,
    /// Wall-clock cap of the whole search
    ///
    /// Checked before each batch against the mean batch duration so far; a
    /// batch already running is never interrupted.
    pub timeout_secs: u64,
    /// Trials evaluated concurrently
    pub workers: usize,
    pub seed: u64,
}

impl Default for SearchSettings {
    fn default() -> Self {
        Self {
            space: SearchSpace::default(),
            max_trials: 20,
            timeout_secs: 900,
            workers: 4,
            seed: 42,
        }
    }
}

impl SearchSettings {
    pub fn validate(&self) -> Result<()> {
        if self.max_trials == 0 {
            return Err(ForecastError::Config(
                "search.max_trials must be positive".to_string(),
            ));
        }
        if self.workers == 0 {
            return Err(ForecastError::Config(
                "search.workers must be positive".to_string(),
            ));
        }
        self.space.validate()
    }
}

/// Record of the optimize stage
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OptimizationReport {
    pub best_config: ModelConfig,
    pub best_metrics: ForecastMetrics,
    /// Production configuration scored on the same folds
    pub production_metrics: Option<ForecastMetrics>,
    pub trials_run: usize,
    pub trials_failed: usize,
    pub timed_out: bool,
    pub duration_ms: u64,
}

/// Proposes a better configuration for a horizon
pub trait HyperparameterOptimizer: Send + Sync {
    fn optimize(
        &self,
        data: &TimeSeriesData,
        horizon: Horizon,
        production: Option<&ModelConfig>,
        evaluator: &dyn ConfigEvaluator,
    ) -> Result<OptimizationReport>;
}

/// Seeded random search evaluated in parallel batches
#[derive(Debug, Clone, Default)]
pub struct RandomSearchOptimizer {
    settings: SearchSettings,
}

impl RandomSearchOptimizer {
    pub fn new(settings: SearchSettings) -> Self {
        Self { settings }
    }

    pub fn settings(&self) -> &SearchSettings {
        &self.settings
    }
}

impl HyperparameterOptimizer for RandomSearchOptimizer {
    fn optimize(
        &self,
        data: &TimeSeriesData,
        horizon: Horizon,
        production: Option<&ModelConfig>,
        evaluator: &dyn ConfigEvaluator,
    ) -> Result<OptimizationReport> {
        self.settings.validate()?;
        let started = Instant::now();
        let budget = Duration::from_secs(self.settings.timeout_secs);

        // All trials are drawn up front so the sequence only depends on the seed
        let mut rng = StdRng::seed_from_u64(self.settings.seed);
        let trials: Vec<ModelConfig> = (0..self.settings.max_trials)
            .map(|_| self.settings.space.sample(&mut rng))
            .collect();

        let mut best: Option<(ModelConfig, ForecastMetrics)> = None;
        let mut trials_run = 0;
        let mut trials_failed = 0;
        let mut timed_out = false;

        // A batch starts only while the mean duration of completed batches
        // still fits in the remaining budget
        let mut batches_done = 0u32;
        for batch in trials.chunks(self.settings.workers) {
            let elapsed = started.elapsed();
            let expected = if batches_done == 0 {
                Duration::ZERO
            } else {
                elapsed / batches_done
            };
            if elapsed >= budget || budget - elapsed < expected {
                debug!(horizon = %horizon, ?elapsed, ?expected, "search budget exhausted");
                timed_out = true;
                break;
            }

            let outcomes: Vec<Option<Result<ForecastMetrics>>> = thread::scope(|scope| {
                let handles: Vec<_> = batch
                    .iter()
                    .map(|config| scope.spawn(move || evaluator.evaluate(data, horizon, config)))
                    .collect();
                handles.into_iter().map(|h| h.join().ok()).collect()
            });

            batches_done += 1;

            for (config, outcome) in batch.iter().zip(outcomes) {
                trials_run += 1;
                match outcome {
                    Some(Ok(metrics)) if metrics.rmse.is_finite() => {
                        let better = best.as_ref().map_or(true, |(_, b)| metrics.rmse < b.rmse);
                        if better {
                            best = Some((config.clone(), metrics));
                        }
                    }
                    Some(Ok(_)) => trials_failed += 1,
                    Some(Err(e)) => {
                        debug!(horizon = %horizon, error = %e, "trial failed");
                        trials_failed += 1;
                    }
                    None => {
                        warn!(horizon = %horizon, "trial panicked");
                        trials_failed += 1;
                    }
                }
            }
        }

        let (best_config, best_metrics) = best.ok_or_else(|| {
            ForecastError::ModelError(format!(
                "No successful trial out of {} for {}",
                trials_run, horizon
            ))
        })?;

        let production_metrics = match production {
            Some(config) => match evaluator.evaluate(data, horizon, config) {
                Ok(m) => Some(m),
                Err(e) => {
                    warn!(horizon = %horizon, error = %e, "production config could not be scored");
                    None
                }
            },
            None => None,
        };

        let duration_ms = started.elapsed().as_millis() as u64;
        info!(
            horizon = %horizon,
            trials_run,
            trials_failed,
            timed_out,
            best_rmse = best_metrics.rmse,
            "search finished"
        );

        Ok(OptimizationReport {
            best_config,
            best_metrics,
            production_metrics,
            trials_run,
            trials_failed,
            timed_out,
            duration_ms,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Scores configurations by their distance from a preferred tree count
    struct DistanceEvaluator {
        preferred: usize,
    }

    impl ConfigEvaluator for DistanceEvaluator {
        fn evaluate(
            &self,
            _data: &TimeSeriesData,
            _horizon: Horizon,
            config: &ModelConfig,
        ) -> Result<ForecastMetrics> {
            let distance =
                (config.boosted_trees.n_estimators as f64 - self.preferred as f64).abs();
            Ok(ForecastMetrics {
                rmse: 1.0 + distance,
                mae: 1.0 + distance,
                mape: 1.0,
                directional_accuracy: 60.0,
                n_samples: 10,
            })
        }
    }

    /// Takes a fixed wall-clock time per trial
    struct SlowEvaluator {
        delay: Duration,
    }

    impl ConfigEvaluator for SlowEvaluator {
        fn evaluate(
            &self,
            data: &TimeSeriesData,
            horizon: Horizon,
            config: &ModelConfig,
        ) -> Result<ForecastMetrics> {
            thread::sleep(self.delay);
            DistanceEvaluator { preferred: 100 }.evaluate(data, horizon, config)
        }
    }

    fn tiny_data() -> TimeSeriesData {
        crate::utils::generate_rate_series(10, 20.0, 0.004, 1)
    }

    #[test]
    fn test_search_is_reproducible() {
        let settings = SearchSettings {
            max_trials: 12,
            workers: 3,
            ..SearchSettings::default()
        };
        let optimizer = RandomSearchOptimizer::new(settings);
        let evaluator = DistanceEvaluator { preferred: 120 };
        let data = tiny_data();
        let horizon = Horizon::new(7).unwrap();

        let first = optimizer.optimize(&data, horizon, None, &evaluator).unwrap();
        let second = optimizer.optimize(&data, horizon, None, &evaluator).unwrap();

        assert_eq!(first.best_config, second.best_config);
        assert_eq!(first.trials_run, 12);
        assert_eq!(first.trials_failed, 0);
        assert!(first.production_metrics.is_none());
    }

    #[test]
    fn test_production_scored_on_same_evaluator() {
        let optimizer = RandomSearchOptimizer::new(SearchSettings {
            max_trials: 4,
            ..SearchSettings::default()
        });
        let evaluator = DistanceEvaluator { preferred: 100 };
        let production = ModelConfig::default();

        let report = optimizer
            .optimize(&tiny_data(), Horizon::new(7).unwrap(), Some(&production), &evaluator)
            .unwrap();
        assert_eq!(report.production_metrics.unwrap().rmse, 1.0);
    }

    #[test]
    fn test_samples_stay_in_range() {
        let space = SearchSpace::default();
        let mut rng = StdRng::seed_from_u64(7);
        for _ in 0..50 {
            let config = space.sample(&mut rng);
            assert!(config.validate().is_ok());
            assert!(config.boosted_trees.learning_rate >= 0.01);
            assert!(config.boosted_trees.learning_rate <= 0.2 + 1e-12);
        }
    }

    #[test]
    fn test_walk_forward_folds() {
        let evaluator = WalkForwardEvaluator::new("rate", &[], 3);
        let folds = evaluator.folds(130, 7).unwrap();
        assert_eq!(folds, vec![(109, 116), (116, 123), (123, 130)]);
        assert!(evaluator.folds(110, 7).is_err());
    }

    #[test]
    fn test_batch_not_started_past_budget() {
        let optimizer = RandomSearchOptimizer::new(SearchSettings {
            max_trials: 5,
            workers: 1,
            timeout_secs: 1,
            ..SearchSettings::default()
        });
        let evaluator = SlowEvaluator {
            delay: Duration::from_millis(700),
        };

        let report = optimizer
            .optimize(&tiny_data(), Horizon::new(7).unwrap(), None, &evaluator)
            .unwrap();
        assert!(report.timed_out);
        assert_eq!(report.trials_run, 1);
    }

    #[test]
    fn test_zero_budget_runs_nothing() {
        let optimizer = RandomSearchOptimizer::new(SearchSettings {
            timeout_secs: 0,
            ..SearchSettings::default()
        });
        let result = optimizer.optimize(
            &tiny_data(),
            Horizon::new(7).unwrap(),
            None,
            &DistanceEvaluator { preferred: 100 },
        );
        assert!(matches!(result, Err(ForecastError::ModelError(_))));
    }

    #[test]
    fn test_walk_forward_scores_generated_series() {
        let data = crate::utils::generate_rate_series(160, 20.0, 0.004, 23);
        let evaluator = WalkForwardEvaluator::new("rate", &["oil".to_string()], 2);
        let horizon = Horizon::new(7).unwrap();

        let metrics = evaluator
            .evaluate(&data, horizon, &ModelConfig::default())
            .unwrap();
        assert_eq!(metrics.n_samples, 14);
        assert!(metrics.rmse.is_finite() && metrics.rmse > 0.0);
        assert!(metrics.mae <= metrics.rmse + 1e-12);
        assert!((0.0..=100.0).contains(&metrics.directional_accuracy));

        let short = data.slice(0, Some(110)).unwrap();
        assert!(matches!(
            evaluator.evaluate(&short, horizon, &ModelConfig::default()),
            Err(ForecastError::InsufficientData { .. })
        ));
    }
}
