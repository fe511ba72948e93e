//! # FX Cast
//!
//! Umbrella crate for the forecasting workspace.
//!
//! - [`math`] holds the numeric helpers (`fx_math`)
//! - [`forecast`] holds the ensemble, monitoring and optimization pipeline
//!   (`fx_forecast`)
//!
//! ## Example
//!
//! ```
//! use fxcast_workspace::forecast::Horizon;
//! use fxcast_workspace::math::stats;
//!
//! let horizon = Horizon::new(7).unwrap();
//! assert_eq!(horizon.label(), "7d");
//!
//! let returns = stats::pct_returns(&[100.0, 101.0, 99.99]).unwrap();
//! assert_eq!(returns.len(), 2);
//! ```

pub use fx_forecast as forecast;
pub use fx_math as math;

/// Horizon lengths, in days, served out of the box
pub const STANDARD_HORIZONS: [u32; 3] = [7, 30, 90];

/// Standard horizons as validated values
pub fn standard_horizons() -> forecast::Result<Vec<forecast::Horizon>> {
    STANDARD_HORIZONS
        .iter()
        .map(|&days| forecast::Horizon::new(days))
        .collect()
}
