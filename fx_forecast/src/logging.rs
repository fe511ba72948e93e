//! Tracing subscriber setup

use crate::config::LoggingSettings;
use crate::error::{ForecastError, Result};
use tracing_subscriber::EnvFilter;

/// Install the global subscriber
///
/// `RUST_LOG` takes precedence over `settings.level`. Calling this twice
/// returns an error instead of panicking.
pub fn init_logging(settings: &LoggingSettings) -> Result<()> {
    let filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => EnvFilter::try_new(&settings.level).map_err(|e| {
            ForecastError::Config(format!("Invalid log level '{}': {}", settings.level, e))
        })?,
    };

    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    let installed = if settings.json {
        builder.json().try_init()
    } else {
        builder.try_init()
    };

    installed.map_err(|e| ForecastError::Config(format!("Logging already initialised: {}", e)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_second_init_is_an_error() {
        let settings = LoggingSettings::default();
        // Another test may have installed a subscriber first
        let _ = init_logging(&settings);
        assert!(init_logging(&settings).is_err());
    }
}
