use chrono::NaiveDate;
use fx_forecast::data::HistoryProvider;
use fx_forecast::{DataLoader, ForecastError, Horizon, InMemoryHistory, TimeSeriesData};
use std::io::Write;
use tempfile::NamedTempFile;

fn date(s: &str) -> NaiveDate {
    s.parse().unwrap()
}

#[test]
fn test_data_loader_from_csv() {
    let mut file = NamedTempFile::new().unwrap();
    writeln!(file, "date,rate,oil").unwrap();
    writeln!(file, "2023-01-02,19.85,78.1").unwrap();
    writeln!(file, "2023-01-03,19.92,77.6").unwrap();
    writeln!(file, "2023-01-04,19.88,79.0").unwrap();
    writeln!(file, "2023-01-05,19.97,80.2").unwrap();

    let data = DataLoader::from_csv(file.path()).unwrap();

    assert_eq!(data.len(), 4);
    assert_eq!(data.column_names(), vec!["oil", "rate"]);
    assert_eq!(data.column("rate").unwrap()[1], 19.92);
    assert_eq!(data.last_date(), Some(date("2023-01-05")));
}

#[test]
fn test_missing_column_is_reported() {
    let data = TimeSeriesData::from_series(
        vec![date("2023-01-02"), date("2023-01-03")],
        "rate",
        vec![19.85, 19.92],
    )
    .unwrap();

    assert!(matches!(
        data.column("oil"),
        Err(ForecastError::MissingColumn(_))
    ));
}

#[test]
fn test_unordered_dates_are_rejected() {
    let result = TimeSeriesData::from_series(
        vec![date("2023-01-03"), date("2023-01-02")],
        "rate",
        vec![19.85, 19.92],
    );
    assert!(result.is_err());
}

#[test]
fn test_split_and_future_dates() {
    let dates: Vec<NaiveDate> = (2..=11).map(|d| NaiveDate::from_ymd_opt(2023, 1, d).unwrap()).collect();
    let values: Vec<f64> = (0..10).map(|i| 20.0 + i as f64 * 0.01).collect();
    let data = TimeSeriesData::from_series(dates, "rate", values).unwrap();

    let (train, test) = data.train_test_split(0.2).unwrap();
    assert_eq!(train.len(), 8);
    assert_eq!(test.len(), 2);
    assert_eq!(test.dates()[0], date("2023-01-10"));

    let future = data.future_dates(3).unwrap();
    assert_eq!(
        future,
        vec![date("2023-01-12"), date("2023-01-13"), date("2023-01-14")]
    );
}

#[test]
fn test_in_memory_history_per_horizon() {
    let week = Horizon::new(7).unwrap();
    let month = Horizon::new(30).unwrap();
    let short = TimeSeriesData::from_series(vec![date("2023-01-02")], "rate", vec![19.8]).unwrap();
    let long = TimeSeriesData::from_series(
        vec![date("2023-01-02"), date("2023-01-03"), date("2023-01-04")],
        "rate",
        vec![19.8, 19.9, 20.0],
    )
    .unwrap();

    let history = InMemoryHistory::new(long).with_horizon(week, short);
    assert_eq!(history.load_history(week, 365).unwrap().len(), 1);
    assert_eq!(history.load_history(month, 2).unwrap().len(), 2);
}
