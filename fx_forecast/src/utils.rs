//! Synthetic data and small helpers shared by tests and demos

use crate::data::TimeSeriesData;
use crate::error::{ForecastError, Result};
use chrono::{Duration, NaiveDate};
use rand::rngs::StdRng;
use rand::SeedableRng;
use rand_distr::{Distribution, StandardNormal};

/// Consecutive calendar days starting at `start`
pub fn daily_dates(start: NaiveDate, n: usize) -> Vec<NaiveDate> {
    (0..n).map(|i| start + Duration::days(i as i64)).collect()
}

/// Seeded exchange-rate history with an oil-price exogenous column
///
/// `rate` follows a log random walk whose daily move partly tracks the
/// previous day's oil return, so lagged oil carries signal. Both columns stay
/// strictly positive.
pub fn generate_rate_series(n: usize, start: f64, daily_vol: f64, seed: u64) -> TimeSeriesData {
    let mut rng = StdRng::seed_from_u64(seed);
    let vol = if daily_vol.is_finite() && daily_vol > 0.0 { daily_vol } else { 0.004 };
    let start = if start.is_finite() && start > 0.0 { start } else { 1.0 };

    let mut rate = Vec::with_capacity(n);
    let mut oil = Vec::with_capacity(n);
    let mut current_rate = start;
    let mut current_oil = 80.0;
    let mut last_oil_return = 0.0;

    for _ in 0..n {
        rate.push(current_rate);
        oil.push(current_oil);

        let z_oil: f64 = StandardNormal.sample(&mut rng);
        let z_rate: f64 = StandardNormal.sample(&mut rng);
        let oil_return = 3.0 * vol * z_oil;
        current_rate *= (0.3 * last_oil_return + vol * z_rate).exp();
        current_oil *= oil_return.exp();
        last_oil_return = oil_return;
    }

    let dates = daily_dates(first_date(), n);
    TimeSeriesData::new(
        dates,
        vec![("rate".to_string(), rate), ("oil".to_string(), oil)],
    )
    .unwrap_or_default()
}

/// Rebuild `data` keeping only `columns`
pub fn select_columns(data: &TimeSeriesData, columns: &[&str]) -> Result<TimeSeriesData> {
    if columns.is_empty() {
        return Err(ForecastError::InvalidParameter(
            "At least one column must be selected".to_string(),
        ));
    }
    let selected = columns
        .iter()
        .map(|&name| Ok((name.to_string(), data.column(name)?.to_vec())))
        .collect::<Result<Vec<_>>>()?;
    TimeSeriesData::new(data.dates().to_vec(), selected)
}

fn first_date() -> NaiveDate {
    NaiveDate::from_ymd_opt(2022, 1, 3).unwrap_or(NaiveDate::MIN)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generated_series_is_reproducible() {
        let a = generate_rate_series(200, 20.0, 0.004, 3);
        let b = generate_rate_series(200, 20.0, 0.004, 3);
        let c = generate_rate_series(200, 20.0, 0.004, 4);

        assert_eq!(a.len(), 200);
        assert_eq!(a.column("rate").unwrap(), b.column("rate").unwrap());
        assert_ne!(a.column("rate").unwrap(), c.column("rate").unwrap());
        assert_eq!(a.column("rate").unwrap()[0], 20.0);
        assert!(a.column("rate").unwrap().iter().all(|&v| v > 0.0));
        assert!(a.column("oil").unwrap().iter().all(|&v| v > 0.0));
        assert_eq!(a.dates()[1] - a.dates()[0], Duration::days(1));
    }

    #[test]
    fn test_select_columns() {
        let data = generate_rate_series(20, 20.0, 0.004, 1);
        let rate_only = select_columns(&data, &["rate"]).unwrap();
        assert_eq!(rate_only.column_names(), vec!["rate"]);
        assert!(select_columns(&data, &["missing"]).is_err());
        assert!(select_columns(&data, &[]).is_err());
    }
}
