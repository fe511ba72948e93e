//! Gradient-boosted regression trees for short-horizon rate forecasting
//!
//! The model learns the next first difference of the rate from its recent
//! differences and the previous change of each exogenous series. Multi-step
//! forecasts are produced recursively by feeding predicted differences back
//! into the lag window.

use crate::data::TimeSeriesData;
use crate::error::{ForecastError, Result};
use crate::metrics::{evaluate_forecast, ForecastMetrics};
use crate::models::{
    collect_columns, future_exog_value, ExogForecast, ForecasterKind, PointForecaster,
};
use fx_math::stats::differences;
use serde::{Deserialize, Serialize};

/// Hyperparameters of the boosted-tree forecaster
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BoostedTreesParams {
    /// Number of boosting rounds
    pub n_estimators: usize,
    /// Shrinkage applied to every tree
    pub learning_rate: f64,
    /// Maximum depth of each tree
    pub max_depth: usize,
    /// Number of lagged differences used as features
    pub n_lags: usize,
    /// Minimum number of samples in a leaf
    pub min_samples_leaf: usize,
}

impl Default for BoostedTreesParams {
    fn default() -> Self {
        Self {
            n_estimators: 100,
            learning_rate: 0.05,
            max_depth: 3,
            n_lags: 5,
            min_samples_leaf: 5,
        }
    }
}

impl BoostedTreesParams {
    /// Validate parameter ranges
    pub fn validate(&self) -> Result<()> {
        if self.n_estimators == 0 || self.n_estimators > 2000 {
            return Err(ForecastError::InvalidParameter(format!(
                "n_estimators must be in 1..=2000, got {}",
                self.n_estimators
            )));
        }
        if !(self.learning_rate > 0.0 && self.learning_rate <= 1.0) {
            return Err(ForecastError::InvalidParameter(format!(
                "learning_rate must be in (0, 1], got {}",
                self.learning_rate
            )));
        }
        if self.max_depth == 0 || self.max_depth > 10 {
            return Err(ForecastError::InvalidParameter(format!(
                "max_depth must be in 1..=10, got {}",
                self.max_depth
            )));
        }
        if self.n_lags == 0 || self.n_lags > 60 {
            return Err(ForecastError::InvalidParameter(format!(
                "n_lags must be in 1..=60, got {}",
                self.n_lags
            )));
        }
        if self.min_samples_leaf == 0 {
            return Err(ForecastError::InvalidParameter(
                "min_samples_leaf must be positive".to_string(),
            ));
        }
        Ok(())
    }

    /// Smallest number of rows that leaves enough training samples
    fn min_rows(&self) -> usize {
        self.n_lags + 2 * self.min_samples_leaf.max(10) + 1
    }
}

/// A single regression tree
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "node", rename_all = "snake_case")]
enum TreeNode {
    Leaf {
        value: f64,
    },
    Split {
        feature: usize,
        threshold: f64,
        left: Box<TreeNode>,
        right: Box<TreeNode>,
    },
}

impl TreeNode {
    fn predict(&self, row: &[f64]) -> f64 {
        let mut node = self;
        loop {
            match node {
                TreeNode::Leaf { value } => return *value,
                TreeNode::Split {
                    feature,
                    threshold,
                    left,
                    right,
                } => {
                    node = if row[*feature] <= *threshold { left } else { right };
                }
            }
        }
    }
}

/// Fitted ensemble of trees plus what is needed to rebuild features
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct FittedTrees {
    target: String,
    exog: Vec<String>,
    base_value: f64,
    trees: Vec<TreeNode>,
}

impl FittedTrees {
    fn predict_row(&self, row: &[f64], learning_rate: f64) -> f64 {
        self.base_value
            + learning_rate * self.trees.iter().map(|t| t.predict(row)).sum::<f64>()
    }
}

#[derive(Serialize, Deserialize)]
struct SavedState {
    params: BoostedTreesParams,
    fitted: FittedTrees,
}

/// Boosted-tree point forecaster (ensemble component A)
#[derive(Debug, Clone)]
pub struct BoostedTreesForecaster {
    /// Name of the model
    name: String,
    /// Hyperparameters
    params: BoostedTreesParams,
    /// Fitted trees, if trained
    fitted: Option<FittedTrees>,
}

impl BoostedTreesForecaster {
    /// Create an untrained forecaster
    pub fn new(params: BoostedTreesParams) -> Self {
        Self {
            name: format!(
                "BoostedTrees(n={}, lr={}, depth={}, lags={})",
                params.n_estimators, params.learning_rate, params.max_depth, params.n_lags
            ),
            params,
            fitted: None,
        }
    }

    /// Hyperparameters in use
    pub fn params(&self) -> &BoostedTreesParams {
        &self.params
    }

    /// Number of fitted trees
    pub fn n_trees(&self) -> usize {
        self.fitted.as_ref().map(|f| f.trees.len()).unwrap_or(0)
    }
}

/// Feature row used to predict `diffs[t]`
///
/// Layout: `n_lags` lagged differences (most recent first), their mean, then
/// the previous difference of every exogenous series.
fn feature_row(diffs: &[f64], exog_diffs: &[Vec<f64>], t: usize, n_lags: usize) -> Vec<f64> {
    let mut row = Vec::with_capacity(n_lags + 1 + exog_diffs.len());
    for lag in 1..=n_lags {
        row.push(diffs[t - lag]);
    }
    let lag_mean = row.iter().sum::<f64>() / n_lags as f64;
    row.push(lag_mean);
    for series in exog_diffs {
        row.push(series[t - 1]);
    }
    row
}

/// Grow one regression tree on the current residuals
fn build_tree(
    rows: &[Vec<f64>],
    residuals: &[f64],
    indices: Vec<usize>,
    depth: usize,
    params: &BoostedTreesParams,
) -> TreeNode {
    let n = indices.len();
    let total: f64 = indices.iter().map(|&i| residuals[i]).sum();
    let value = if n > 0 { total / n as f64 } else { 0.0 };

    let min_leaf = params.min_samples_leaf;
    if depth >= params.max_depth || n < 2 * min_leaf {
        return TreeNode::Leaf { value };
    }

    let n_features = rows[indices[0]].len();
    // (gain, feature, threshold)
    let mut best: Option<(f64, usize, f64)> = None;
    let base_score = total * total / n as f64;

    for feature in 0..n_features {
        let mut sorted = indices.clone();
        sorted.sort_by(|&a, &b| {
            rows[a][feature]
                .partial_cmp(&rows[b][feature])
                .unwrap_or(std::cmp::Ordering::Equal)
        });

        let mut left_sum = 0.0;
        for k in 1..n {
            left_sum += residuals[sorted[k - 1]];
            if k < min_leaf || n - k < min_leaf {
                continue;
            }
            let lo = rows[sorted[k - 1]][feature];
            let hi = rows[sorted[k]][feature];
            if lo >= hi {
                continue;
            }
            let right_sum = total - left_sum;
            let gain = left_sum * left_sum / k as f64
                + right_sum * right_sum / (n - k) as f64
                - base_score;
            if best.map_or(true, |(g, _, _)| gain > g) {
                best = Some((gain, feature, (lo + hi) / 2.0));
            }
        }
    }

    match best {
        Some((gain, feature, threshold)) if gain > 1e-15 => {
            let (left, right): (Vec<usize>, Vec<usize>) = indices
                .into_iter()
                .partition(|&i| rows[i][feature] <= threshold);
            TreeNode::Split {
                feature,
                threshold,
                left: Box::new(build_tree(rows, residuals, left, depth + 1, params)),
                right: Box::new(build_tree(rows, residuals, right, depth + 1, params)),
            }
        }
        _ => TreeNode::Leaf { value },
    }
}

impl PointForecaster for BoostedTreesForecaster {
    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> ForecasterKind {
        ForecasterKind::BoostedTrees
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
        if y.len() < self.params.min_rows() {
            return Err(ForecastError::InsufficientData {
                required: self.params.min_rows(),
                actual: y.len(),
            });
        }

        let diffs = differences(&y);
        let exog_diffs: Vec<Vec<f64>> = exog_values.iter().map(|s| differences(s)).collect();
        let n_lags = self.params.n_lags;

        let rows: Vec<Vec<f64>> = (n_lags..diffs.len())
            .map(|t| feature_row(&diffs, &exog_diffs, t, n_lags))
            .collect();
        let labels: Vec<f64> = diffs[n_lags..].to_vec();

        let base_value = labels.iter().sum::<f64>() / labels.len() as f64;
        let mut predictions = vec![base_value; labels.len()];
        let mut trees = Vec::with_capacity(self.params.n_estimators);

        for _ in 0..self.params.n_estimators {
            let residuals: Vec<f64> = labels
                .iter()
                .zip(predictions.iter())
                .map(|(l, p)| l - p)
                .collect();
            let tree = build_tree(&rows, &residuals, (0..rows.len()).collect(), 0, &self.params);
            for (pred, row) in predictions.iter_mut().zip(rows.iter()) {
                *pred += self.params.learning_rate * tree.predict(row);
            }
            trees.push(tree);
        }

        if predictions.iter().any(|p| !p.is_finite()) {
            return Err(ForecastError::ModelError(
                "Boosting produced non-finite fitted values".to_string(),
            ));
        }

        // In-sample one-step level forecasts: y[t] + predicted diff vs y[t + 1]
        let fitted_levels: Vec<f64> = (n_lags..diffs.len())
            .zip(predictions.iter())
            .map(|(t, d)| y[t] + d)
            .collect();
        let actual_levels = &y[n_lags + 1..];
        let metrics = evaluate_forecast(&fitted_levels, actual_levels)?;

        self.fitted = Some(FittedTrees {
            target: target.to_string(),
            exog: exog.to_vec(),
            base_value,
            trees,
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
        let n_lags = self.params.n_lags;
        if y.len() < n_lags + 1 {
            return Err(ForecastError::InsufficientData {
                required: n_lags + 1,
                actual: y.len(),
            });
        }

        let mut diffs = differences(&y);
        let mut exog_diffs: Vec<Vec<f64>> = Vec::with_capacity(exog_values.len());
        for (name, series) in fitted.exog.iter().zip(exog_values.iter()) {
            let mut d = differences(series);
            let last = series[series.len() - 1];
            let mut prev = last;
            for step in 0..steps {
                let next = future_exog_value(name, last, step, exog_forecast);
                d.push(next - prev);
                prev = next;
            }
            exog_diffs.push(d);
        }

        let mut level = y[y.len() - 1];
        let mut out = Vec::with_capacity(steps);
        for _ in 0..steps {
            let t = diffs.len();
            let row = feature_row(&diffs, &exog_diffs, t, n_lags);
            let step_diff = fitted.predict_row(&row, self.params.learning_rate);
            level += step_diff;
            diffs.push(step_diff);
            out.push(level);
        }

        if out.iter().any(|v| !v.is_finite()) {
            return Err(ForecastError::ModelError(
                "Boosted trees produced a non-finite forecast".to_string(),
            ));
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
        *self = BoostedTreesForecaster::new(saved.params);
        self.fitted = Some(saved.fitted);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::generate_rate_series;

    fn small_params() -> BoostedTreesParams {
        BoostedTreesParams {
            n_estimators: 20,
            learning_rate: 0.1,
            max_depth: 2,
            n_lags: 3,
            min_samples_leaf: 5,
        }
    }

    #[test]
    fn test_train_and_predict() {
        let data = generate_rate_series(150, 20.0, 0.004, 7);
        let mut model = BoostedTreesForecaster::new(small_params());

        let metrics = model.train(&data, "rate", &[]).unwrap();
        assert!(model.is_fitted());
        assert_eq!(model.n_trees(), 20);
        assert!(metrics.rmse.is_finite() && metrics.rmse >= 0.0);

        let forecast = model.predict(&data, 5, None).unwrap();
        assert_eq!(forecast.len(), 5);
        // Recursive forecasts stay in the neighbourhood of the last level
        let last = *data.column("rate").unwrap().last().unwrap();
        for v in forecast {
            assert!((v - last).abs() < last * 0.2);
        }
    }

    #[test]
    fn test_predict_requires_training() {
        let data = generate_rate_series(50, 20.0, 0.004, 7);
        let model = BoostedTreesForecaster::new(small_params());
        assert!(matches!(
            model.predict(&data, 3, None),
            Err(ForecastError::NotFitted(_))
        ));
    }

    #[test]
    fn test_insufficient_rows() {
        let data = generate_rate_series(10, 20.0, 0.004, 7);
        let mut model = BoostedTreesForecaster::new(small_params());
        assert!(matches!(
            model.train(&data, "rate", &[]),
            Err(ForecastError::InsufficientData { .. })
        ));
        assert!(!model.is_fitted());
    }

    #[test]
    fn test_state_round_trip() {
        let data = generate_rate_series(120, 20.0, 0.004, 11);
        let mut model = BoostedTreesForecaster::new(small_params());
        model.train(&data, "rate", &["oil".to_string()]).unwrap();

        let state = model.save_state().unwrap();
        let mut restored = BoostedTreesForecaster::new(BoostedTreesParams::default());
        restored.load_state(state).unwrap();

        assert_eq!(restored.params(), model.params());
        assert_eq!(
            restored.predict(&data, 4, None).unwrap(),
            model.predict(&data, 4, None).unwrap()
        );
    }

    #[test]
    fn test_split_prefers_informative_feature() {
        // Residual is +1 when feature 0 is positive, -1 otherwise
        let rows: Vec<Vec<f64>> = (0..40)
            .map(|i| vec![if i % 2 == 0 { 1.0 } else { -1.0 }, (i % 7) as f64])
            .collect();
        let residuals: Vec<f64> = rows.iter().map(|r| r[0]).collect();
        let params = BoostedTreesParams {
            max_depth: 1,
            min_samples_leaf: 2,
            ..BoostedTreesParams::default()
        };

        let tree = build_tree(&rows, &residuals, (0..40).collect(), 0, &params);
        assert_eq!(tree.predict(&[1.0, 3.0]), 1.0);
        assert_eq!(tree.predict(&[-1.0, 3.0]), -1.0);
    }
}
