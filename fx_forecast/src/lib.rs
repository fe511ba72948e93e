//! # FX Forecast
//!
//! Exchange-rate forecasting for fixed horizons with automated
//! re-optimization.
//!
//! ## Features
//!
//! - Date-indexed series bundles loaded from CSV or polars data frames
//! - A two-model ensemble per horizon (gradient-boosted trees on lagged
//!   differences plus a seasonal regression) with horizon-dependent weights
//! - GARCH(1,1) / GJR-GARCH(1,1) residual volatility for confidence bands and
//!   regime labels
//! - Baseline tracking with degradation alerts
//! - A load, trigger, optimize, validate and deploy pipeline with versioned
//!   rollback
//!
//! ## Quick Start
//!
//! ```no_run
//! use fx_forecast::{EnsembleForecaster, Horizon, TrainingHistory};
//! use fx_forecast::utils::generate_rate_series;
//!
//! # fn main() -> fx_forecast::Result<()> {
//! let data = generate_rate_series(400, 20.0, 0.004, 42);
//! let horizon = Horizon::new(7)?;
//!
//! let mut ensemble = EnsembleForecaster::new(horizon);
//! let metrics = ensemble.train(&data, "rate", &["oil".to_string()], 0.2)?;
//! TrainingHistory::new("fxcast_data/training_history.csv").record(horizon, &metrics)?;
//!
//! let forecast = ensemble.predict(&data, None, None)?;
//! for point in &forecast.points {
//!     println!("{} {:.4} [{:.4}, {:.4}]", point.date, point.mean, point.lower_2sigma, point.upper_2sigma);
//! }
//!
//! ensemble.save_models("fxcast_data/models/7d")?;
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod data;
pub mod ensemble;
pub mod error;
pub mod history;
pub mod horizon;
pub mod logging;
pub mod metrics;
pub mod models;
pub mod monitor;
pub mod optimization;
pub mod utils;
pub mod volatility;

// Re-export commonly used types
pub use crate::config::AppConfig;
pub use crate::data::{DataLoader, HistoryProvider, InMemoryHistory, TimeSeriesData};
pub use crate::ensemble::{EnsembleForecast, EnsembleForecaster, EnsembleMetrics, ForecastPoint};
pub use crate::error::{ForecastError, Result};
pub use crate::history::{TrainingHistory, TrainingRecord};
pub use crate::horizon::{EnsembleWeights, Horizon};
pub use crate::logging::init_logging;
pub use crate::metrics::{evaluate_forecast, ForecastMetrics};
pub use crate::models::{ModelConfig, PointForecaster};
pub use crate::monitor::{ModelAlert, PerformanceMonitor, Severity};
pub use crate::optimization::{OptimizationPipeline, OptimizationResult};
pub use crate::volatility::{Regime, VolatilityModel, VolatilityModelKind};

// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
pub const NAME: &str = env!("CARGO_PKG_NAME");
