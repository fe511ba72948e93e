//! Error types for the fx_forecast crate

use polars::prelude::PolarsError;
use thiserror::Error;

/// Custom error types for the fx_forecast crate
#[derive(Debug, Error)]
pub enum ForecastError {
    /// Not enough rows or observations for the requested operation
    #[error("Insufficient data: need at least {required} observations, got {actual}")]
    InsufficientData { required: usize, actual: usize },

    /// A requested column is absent from the data bundle
    #[error("Missing column: {0}")]
    MissingColumn(String),

    /// Error related to data validation or processing
    #[error("Data error: {0}")]
    DataError(String),

    /// Error from invalid parameters
    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),

    /// Error related to parameter or result validation
    #[error("Validation error: {0}")]
    ValidationError(String),

    /// A model was used before it was trained or loaded
    #[error("Model not fitted: {0}")]
    NotFitted(String),

    /// Error raised inside a single model
    #[error("Model error: {0}")]
    ModelError(String),

    /// Every point forecaster failed, no fallback left
    #[error("Both point forecasters failed (A: {model_a}; B: {model_b})")]
    BothModelsFailed { model_a: String, model_b: String },

    /// The conditional variance model could not be fitted
    #[error("Volatility model fit failed: {0}")]
    VolatilityFit(String),

    /// Error from a deployment collaborator
    #[error("Deployment error: {0}")]
    Deployment(String),

    /// Error in configuration or logging setup
    #[error("Configuration error: {0}")]
    Config(String),

    /// Error from IO operations
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    /// Error from JSON (de)serialization
    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),

    /// Error from CSV reading or writing
    #[error("CSV error: {0}")]
    CsvError(#[from] csv::Error),

    /// Error from numeric helpers
    #[error("Math error: {0}")]
    MathError(#[from] fx_math::MathError),

    /// Error from Polars operations
    #[error("Polars error: {0}")]
    PolarsError(String),
}

/// Result type with our custom error
pub type Result<T> = std::result::Result<T, ForecastError>;

impl From<PolarsError> for ForecastError {
    fn from(err: PolarsError) -> Self {
        ForecastError::PolarsError(err.to_string())
    }
}

impl From<toml::de::Error> for ForecastError {
    fn from(err: toml::de::Error) -> Self {
        ForecastError::Config(err.to_string())
    }
}
