//! # FX Math
//!
//! Numeric building blocks for the exchange-rate forecasting workspace.
//! This crate provides descriptive statistics, rolling-window estimators and
//! a small least-squares solver used by the point forecasters.

use thiserror::Error;

pub mod regression;
pub mod stats;
pub mod volatility;

pub use regression::LeastSquares;
pub use volatility::RollingStd;

/// Errors that can occur in numeric calculations
#[derive(Error, Debug, Clone, PartialEq)]
pub enum MathError {
    #[error("Insufficient data for calculation: {0}")]
    InsufficientData(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Calculation error: {0}")]
    CalculationError(String),
}

/// Result type for numeric operations
pub type Result<T> = std::result::Result<T, MathError>;
