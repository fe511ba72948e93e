use approx::assert_relative_eq;
use fx_forecast::ensemble::BandSource;
use fx_forecast::models::ComponentStatus;
use fx_forecast::utils::generate_rate_series;
use fx_forecast::{
    EnsembleForecaster, EnsembleWeights, ForecastError, Horizon, ModelConfig, TimeSeriesData,
};
use rstest::rstest;
use tempfile::tempdir;

fn exog() -> Vec<String> {
    vec!["oil".to_string()]
}

fn trained(days: u32, data: &TimeSeriesData) -> EnsembleForecaster {
    let mut ensemble = EnsembleForecaster::new(Horizon::new(days).unwrap());
    ensemble.train(data, "rate", &exog(), 0.2).unwrap();
    ensemble
}

#[rstest]
#[case(3)]
#[case(7)]
#[case(14)]
#[case(30)]
#[case(90)]
fn test_weights_sum_to_one_and_collapse(#[case] days: u32) {
    let weights = EnsembleWeights::for_horizon(Horizon::new(days).unwrap());

    let (a, b) = weights.effective(true, true).unwrap();
    assert_relative_eq!(a + b, 1.0, epsilon = 1e-9);
    assert_eq!(weights.effective(true, false), Some((1.0, 0.0)));
    assert_eq!(weights.effective(false, true), Some((0.0, 1.0)));
}

#[test]
fn test_train_reports_metrics() {
    let data = generate_rate_series(260, 20.0, 0.004, 21);
    let mut ensemble = EnsembleForecaster::new(Horizon::new(7).unwrap());
    let metrics = ensemble.train(&data, "rate", &exog(), 0.2).unwrap();

    assert_eq!(metrics.horizon_days, 7);
    assert_eq!(metrics.n_train + metrics.n_test, 260);
    assert!(metrics.model_a.is_some());
    assert!(metrics.model_b.is_some());
    assert_relative_eq!(metrics.weight_a + metrics.weight_b, 1.0, epsilon = 1e-9);
    assert!(metrics.ensemble.rmse.is_finite() && metrics.ensemble.rmse >= 0.0);
    assert!(ensemble.is_fitted());
}

#[test]
fn test_bands_are_nested_and_dates_follow_history() {
    let data = generate_rate_series(260, 20.0, 0.004, 5);
    let ensemble = trained(7, &data);

    let forecast = ensemble.predict(&data, None, None).unwrap();
    assert_eq!(forecast.points.len(), 7);

    let last = data.last_date().unwrap();
    assert_eq!(forecast.points[0].date, last.succ_opt().unwrap());

    for p in &forecast.points {
        assert!(p.mean.is_finite());
        assert!(p.lower_2sigma <= p.lower_1sigma);
        assert!(p.lower_1sigma <= p.mean);
        assert!(p.mean <= p.upper_1sigma);
        assert!(p.upper_1sigma <= p.upper_2sigma);
    }
    assert_ne!(forecast.band_source, BandSource::Heuristic);
}

#[test]
fn test_predict_is_deterministic() {
    let data = generate_rate_series(240, 20.0, 0.004, 9);
    let ensemble = trained(30, &data);

    let first = ensemble.predict(&data, Some(10), None).unwrap();
    let second = ensemble.predict(&data, Some(10), None).unwrap();
    assert_eq!(first, second);
    assert_eq!(first.points.len(), 10);
}

#[test]
fn test_saved_models_reproduce_forecast() {
    let data = generate_rate_series(240, 20.0, 0.004, 13);
    let ensemble = trained(7, &data);
    let dir = tempdir().unwrap();
    let path = dir.path().join("7d");

    ensemble.save_models(&path).unwrap();
    let restored = EnsembleForecaster::load_models(&path).unwrap();

    assert_eq!(restored.horizon(), ensemble.horizon());
    assert_eq!(restored.config(), ensemble.config());
    assert_eq!(
        restored.predict(&data, None, None).unwrap(),
        ensemble.predict(&data, None, None).unwrap()
    );

    // A second save replaces the first in place
    ensemble.save_models(&path).unwrap();
    assert!(EnsembleForecaster::load_models(&path).is_ok());
}

#[test]
fn test_load_from_missing_dir_fails() {
    let dir = tempdir().unwrap();
    assert!(EnsembleForecaster::load_models(dir.path().join("absent")).is_err());
}

/// Data whose exogenous column carries no usable value
fn without_exog(data: &TimeSeriesData) -> TimeSeriesData {
    data.clone()
        .with_column("oil", vec![f64::NAN; data.len()])
        .unwrap()
}

#[test]
fn test_failed_component_hands_full_weight_to_the_other() {
    // 80 training rows cannot hold two leaves of 60 samples
    let mut config = ModelConfig::default();
    config.boosted_trees.min_samples_leaf = 60;
    let data = generate_rate_series(100, 20.0, 0.004, 31);

    let mut ensemble = EnsembleForecaster::with_config(Horizon::new(7).unwrap(), &config);
    let metrics = ensemble.train(&data, "rate", &exog(), 0.2).unwrap();

    assert!(metrics.model_a.is_none());
    assert!(metrics.model_b.is_some());
    assert_eq!((metrics.weight_a, metrics.weight_b), (0.0, 1.0));
    // 20 validation residuals are too few for the volatility model
    assert!(!metrics.volatility_fitted);

    let contributions = ensemble.get_model_contributions();
    assert!(matches!(contributions.model_a_status, ComponentStatus::Failed(_)));
    assert_eq!(contributions.model_b_status, ComponentStatus::Fitted);
    assert_eq!(contributions.effective_weights, Some((0.0, 1.0)));

    let forecast = ensemble.predict(&data, None, None).unwrap();
    assert_eq!((forecast.weight_a, forecast.weight_b), (0.0, 1.0));
    assert_eq!(forecast.band_source, BandSource::ResidualStd);
    assert!(forecast.volatility.is_none());
    for p in &forecast.points {
        assert!(p.model_a.is_none());
        assert_relative_eq!(p.mean, p.model_b.unwrap(), epsilon = 1e-12);
    }
}

#[test]
fn test_both_components_failing_is_an_error() {
    let data = generate_rate_series(200, 20.0, 0.004, 37);
    let mut ensemble = EnsembleForecaster::new(Horizon::new(7).unwrap());

    let result = ensemble.train(&without_exog(&data), "rate", &exog(), 0.2);
    assert!(matches!(result, Err(ForecastError::BothModelsFailed { .. })));
    assert!(!ensemble.is_fitted());
    assert!(matches!(
        ensemble.predict(&data, None, None),
        Err(ForecastError::NotFitted(_))
    ));
}

#[test]
fn test_failed_retrain_keeps_previous_fit() {
    let data = generate_rate_series(200, 20.0, 0.004, 41);
    let mut ensemble = trained(7, &data);
    let before = ensemble.get_model_contributions();
    let forecast = ensemble.predict(&data, None, None).unwrap();

    let result = ensemble.train(&without_exog(&data), "rate", &exog(), 0.2);
    assert!(matches!(result, Err(ForecastError::BothModelsFailed { .. })));

    assert!(ensemble.is_fitted());
    assert_eq!(ensemble.get_model_contributions(), before);
    assert_eq!(ensemble.predict(&data, None, None).unwrap(), forecast);
}
