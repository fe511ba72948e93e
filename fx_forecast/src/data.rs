//! Time series data handling for forecasting
//!
//! The upstream data collaborator hands the core a bundle of date-indexed
//! series: one primary exchange-rate column plus any number of exogenous
//! covariates. The bundle must already be gap-filled; nothing here imputes.

use crate::error::{ForecastError, Result};
use crate::horizon::Horizon;
use chrono::{Days, NaiveDate, NaiveDateTime};
use polars::prelude::*;
use std::collections::{BTreeMap, HashMap};
use std::fs::File;
use std::path::Path;

/// Date-indexed bundle of numeric series
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TimeSeriesData {
    /// Strictly increasing observation dates
    dates: Vec<NaiveDate>,
    /// Named series, each aligned with `dates`
    columns: BTreeMap<String, Vec<f64>>,
}

/// Data loader for time series data
#[derive(Debug)]
pub struct DataLoader;

impl DataLoader {
    /// Load time series data from a CSV file
    pub fn from_csv<P: AsRef<Path>>(path: P) -> Result<TimeSeriesData> {
        let file = File::open(path)?;
        let df = CsvReader::new(file)
            .infer_schema(None)
            .has_header(true)
            .finish()?;

        Self::from_dataframe(&df)
    }

    /// Create time series data from an existing DataFrame
    ///
    /// The first column whose name mentions a date or time is used as the
    /// index; every other column is converted to `f64`.
    pub fn from_dataframe(df: &DataFrame) -> Result<TimeSeriesData> {
        let time_column = Self::detect_time_column(df)?;
        let dates = Self::parse_dates(df.column(&time_column)?)?;

        let mut columns = Vec::new();
        for series in df.get_columns() {
            if series.name() == time_column {
                continue;
            }
            columns.push((series.name().to_string(), Self::series_as_f64(series)?));
        }

        TimeSeriesData::new(dates, columns)
    }

    /// Detect the time column in a DataFrame
    fn detect_time_column(df: &DataFrame) -> Result<String> {
        for name in df.get_column_names() {
            let lower_name = name.to_lowercase();
            if lower_name.contains("date") || lower_name.contains("time") {
                return Ok(name.to_string());
            }
        }

        // Fall back to the first column when it is already temporal
        if let Some(first_col) = df.get_columns().first() {
            if first_col.dtype().is_temporal() {
                return Ok(first_col.name().to_string());
            }
        }

        Err(ForecastError::DataError(
            "No time column found in data".to_string(),
        ))
    }

    /// Convert a date-like column into calendar dates
    fn parse_dates(series: &Series) -> Result<Vec<NaiveDate>> {
        let epoch = NaiveDate::from_ymd_opt(1970, 1, 1)
            .ok_or_else(|| ForecastError::DataError("Invalid epoch".to_string()))?;

        match series.dtype() {
            DataType::Utf8 => series
                .utf8()?
                .into_iter()
                .map(|value| {
                    let raw = value.ok_or_else(|| {
                        ForecastError::DataError(format!(
                            "Null date in column '{}'",
                            series.name()
                        ))
                    })?;
                    parse_date_str(raw)
                })
                .collect(),
            DataType::Date => series
                .cast(&DataType::Int32)?
                .i32()?
                .into_iter()
                .map(|value| {
                    let days = value.ok_or_else(|| {
                        ForecastError::DataError("Null date value".to_string())
                    })?;
                    offset_from_epoch(epoch, days as i64)
                })
                .collect(),
            DataType::Datetime(unit, _) => {
                let per_day: i64 = match unit {
                    TimeUnit::Nanoseconds => 86_400_000_000_000,
                    TimeUnit::Microseconds => 86_400_000_000,
                    TimeUnit::Milliseconds => 86_400_000,
                };
                series
                    .cast(&DataType::Int64)?
                    .i64()?
                    .into_iter()
                    .map(|value| {
                        let ts = value.ok_or_else(|| {
                            ForecastError::DataError("Null datetime value".to_string())
                        })?;
                        offset_from_epoch(epoch, ts.div_euclid(per_day))
                    })
                    .collect()
            }
            other => Err(ForecastError::DataError(format!(
                "Column '{}' of type {:?} cannot be used as a date index",
                series.name(),
                other
            ))),
        }
    }

    /// Helper method to get a column as f64 values
    fn series_as_f64(series: &Series) -> Result<Vec<f64>> {
        if !series.dtype().is_numeric() {
            return Err(ForecastError::DataError(format!(
                "Column '{}' cannot be converted to f64",
                series.name()
            )));
        }

        let cast = series.cast(&DataType::Float64)?;
        cast.f64()?
            .into_iter()
            .map(|value| {
                value.ok_or_else(|| {
                    ForecastError::DataError(format!(
                        "Column '{}' contains nulls; gap-fill before loading",
                        series.name()
                    ))
                })
            })
            .collect()
    }
}

fn parse_date_str(raw: &str) -> Result<NaiveDate> {
    let trimmed = raw.trim();
    NaiveDate::parse_from_str(trimmed, "%Y-%m-%d")
        .or_else(|_| {
            NaiveDateTime::parse_from_str(trimmed, "%Y-%m-%d %H:%M:%S").map(|dt| dt.date())
        })
        .map_err(|e| ForecastError::DataError(format!("Invalid date '{}': {}", raw, e)))
}

fn offset_from_epoch(epoch: NaiveDate, days: i64) -> Result<NaiveDate> {
    let shifted = if days >= 0 {
        epoch.checked_add_days(Days::new(days as u64))
    } else {
        epoch.checked_sub_days(Days::new(days.unsigned_abs()))
    };
    shifted.ok_or_else(|| ForecastError::DataError(format!("Date offset {} out of range", days)))
}

impl TimeSeriesData {
    /// Create a bundle from dates and named columns
    pub fn new(dates: Vec<NaiveDate>, columns: Vec<(String, Vec<f64>)>) -> Result<Self> {
        if dates.windows(2).any(|w| w[1] <= w[0]) {
            return Err(ForecastError::DataError(
                "Dates must be strictly increasing".to_string(),
            ));
        }

        let mut map = BTreeMap::new();
        for (name, values) in columns {
            if values.len() != dates.len() {
                return Err(ForecastError::DataError(format!(
                    "Column '{}' has {} values but there are {} dates",
                    name,
                    values.len(),
                    dates.len()
                )));
            }
            if map.insert(name.clone(), values).is_some() {
                return Err(ForecastError::DataError(format!(
                    "Duplicate column '{}'",
                    name
                )));
            }
        }

        Ok(Self {
            dates,
            columns: map,
        })
    }

    /// Create a single-series bundle
    pub fn from_series(dates: Vec<NaiveDate>, name: &str, values: Vec<f64>) -> Result<Self> {
        Self::new(dates, vec![(name.to_string(), values)])
    }

    /// Return a copy with one more column
    pub fn with_column(mut self, name: &str, values: Vec<f64>) -> Result<Self> {
        if values.len() != self.dates.len() {
            return Err(ForecastError::DataError(format!(
                "Column '{}' has {} values but there are {} dates",
                name,
                values.len(),
                self.dates.len()
            )));
        }
        self.columns.insert(name.to_string(), values);
        Ok(self)
    }

    /// Observation dates
    pub fn dates(&self) -> &[NaiveDate] {
        &self.dates
    }

    /// Last observation date
    pub fn last_date(&self) -> Option<NaiveDate> {
        self.dates.last().copied()
    }

    /// Get a column by name
    pub fn column(&self, name: &str) -> Result<&[f64]> {
        self.columns
            .get(name)
            .map(|v| v.as_slice())
            .ok_or_else(|| ForecastError::MissingColumn(name.to_string()))
    }

    /// Whether a column exists
    pub fn has_column(&self, name: &str) -> bool {
        self.columns.contains_key(name)
    }

    /// Column names in sorted order
    pub fn column_names(&self) -> Vec<&str> {
        self.columns.keys().map(|k| k.as_str()).collect()
    }

    /// Check if the time series is empty
    pub fn is_empty(&self) -> bool {
        self.dates.is_empty()
    }

    /// Get the length of the time series
    pub fn len(&self) -> usize {
        self.dates.len()
    }

    /// Get a slice of the data from start to end index (end exclusive)
    pub fn slice(&self, start: usize, end: Option<usize>) -> Result<Self> {
        let end = end.unwrap_or(self.len());
        if start > end || end > self.len() {
            return Err(ForecastError::ValidationError(format!(
                "Invalid slice {}..{} for series of length {}",
                start,
                end,
                self.len()
            )));
        }

        Ok(Self {
            dates: self.dates[start..end].to_vec(),
            columns: self
                .columns
                .iter()
                .map(|(k, v)| (k.clone(), v[start..end].to_vec()))
                .collect(),
        })
    }

    /// The most recent `n` rows (or everything when shorter)
    pub fn tail(&self, n: usize) -> Self {
        let start = self.len().saturating_sub(n);
        Self {
            dates: self.dates[start..].to_vec(),
            columns: self
                .columns
                .iter()
                .map(|(k, v)| (k.clone(), v[start..].to_vec()))
                .collect(),
        }
    }

    /// Time-ordered split; the last `validation_split` fraction becomes the test set
    pub fn train_test_split(&self, validation_split: f64) -> Result<(Self, Self)> {
        if !(validation_split > 0.0 && validation_split < 1.0) {
            return Err(ForecastError::InvalidParameter(format!(
                "Validation split must be in (0, 1), got {}",
                validation_split
            )));
        }

        let test_size = ((self.len() as f64) * validation_split).round() as usize;
        let test_size = test_size.max(1);
        if test_size >= self.len() {
            return Err(ForecastError::InsufficientData {
                required: test_size + 1,
                actual: self.len(),
            });
        }

        let split = self.len() - test_size;
        Ok((self.slice(0, Some(split))?, self.slice(split, None)?))
    }

    /// Consecutive calendar days after the last observation
    pub fn future_dates(&self, steps: usize) -> Result<Vec<NaiveDate>> {
        let last = self
            .last_date()
            .ok_or_else(|| ForecastError::DataError("Empty time series data".to_string()))?;

        (1..=steps as u64)
            .map(|d| {
                last.checked_add_days(Days::new(d)).ok_or_else(|| {
                    ForecastError::DataError("Forecast date out of range".to_string())
                })
            })
            .collect()
    }
}

/// Upstream collaborator supplying recent history for a horizon
pub trait HistoryProvider: Send + Sync {
    /// Load at most `lookback_days` of the most recent rows
    fn load_history(&self, horizon: Horizon, lookback_days: usize) -> Result<TimeSeriesData>;
}

/// History provider backed by bundles already in memory
#[derive(Debug, Clone)]
pub struct InMemoryHistory {
    default: TimeSeriesData,
    per_horizon: HashMap<Horizon, TimeSeriesData>,
}

impl InMemoryHistory {
    /// Serve the same bundle for every horizon
    pub fn new(data: TimeSeriesData) -> Self {
        Self {
            default: data,
            per_horizon: HashMap::new(),
        }
    }

    /// Serve a dedicated bundle for one horizon
    pub fn with_horizon(mut self, horizon: Horizon, data: TimeSeriesData) -> Self {
        self.per_horizon.insert(horizon, data);
        self
    }
}

impl HistoryProvider for InMemoryHistory {
    fn load_history(&self, horizon: Horizon, lookback_days: usize) -> Result<TimeSeriesData> {
        let data = self.per_horizon.get(&horizon).unwrap_or(&self.default);
        if data.is_empty() {
            return Err(ForecastError::DataError(format!(
                "No history available for horizon {}",
                horizon
            )));
        }
        Ok(data.tail(lookback_days))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dates(n: usize) -> Vec<NaiveDate> {
        let start = NaiveDate::from_ymd_opt(2023, 1, 1).unwrap();
        (0..n as u64)
            .map(|d| start.checked_add_days(Days::new(d)).unwrap())
            .collect()
    }

    #[test]
    fn test_rejects_misaligned_columns() {
        let result = TimeSeriesData::from_series(dates(3), "rate", vec![1.0, 2.0]);
        assert!(result.is_err());
    }

    #[test]
    fn test_rejects_unsorted_dates() {
        let mut d = dates(3);
        d.swap(0, 1);
        assert!(TimeSeriesData::from_series(d, "rate", vec![1.0, 2.0, 3.0]).is_err());
    }

    #[test]
    fn test_train_test_split_is_time_ordered() {
        let values: Vec<f64> = (0..10).map(|v| v as f64).collect();
        let data = TimeSeriesData::from_series(dates(10), "rate", values).unwrap();

        let (train, test) = data.train_test_split(0.2).unwrap();
        assert_eq!(train.len(), 8);
        assert_eq!(test.len(), 2);
        assert_eq!(test.column("rate").unwrap(), &[8.0, 9.0]);
        assert!(train.last_date().unwrap() < test.dates()[0]);
    }

    #[test]
    fn test_future_dates_follow_last_observation() {
        let data = TimeSeriesData::from_series(dates(3), "rate", vec![1.0; 3]).unwrap();
        let future = data.future_dates(2).unwrap();
        assert_eq!(future[0], NaiveDate::from_ymd_opt(2023, 1, 4).unwrap());
        assert_eq!(future[1], NaiveDate::from_ymd_opt(2023, 1, 5).unwrap());
    }

    #[test]
    fn test_missing_column_error() {
        let data = TimeSeriesData::from_series(dates(2), "rate", vec![1.0, 2.0]).unwrap();
        assert!(matches!(
            data.column("oil"),
            Err(ForecastError::MissingColumn(name)) if name == "oil"
        ));
    }

    #[test]
    fn test_in_memory_history_tail() {
        let values: Vec<f64> = (0..10).map(|v| v as f64).collect();
        let data = TimeSeriesData::from_series(dates(10), "rate", values).unwrap();
        let provider = InMemoryHistory::new(data);

        let recent = provider
            .load_history(Horizon::new(7).unwrap(), 4)
            .unwrap();
        assert_eq!(recent.len(), 4);
        assert_eq!(recent.column("rate").unwrap()[0], 6.0);
    }
}
