//! Logging initialisation via tracing-subscriber.
//!
//! Call [`init`] once at startup, after configuration is resolved.

use thiserror::Error;
use tracing::level_filters::LevelFilter;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Error)]
pub enum LoggingError {
    #[error("Invalid log level '{0}'")]
    InvalidLevel(String),

    #[error("Failed to set subscriber: {0}")]
    Subscriber(String),
}

/// Install the global subscriber, writing to stderr.
///
/// `RUST_LOG` takes precedence when set and valid; `level` is the fallback.
pub fn init(level: &str) -> Result<(), LoggingError> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(level))
        .map_err(|_| LoggingError::InvalidLevel(level.to_string()))?;

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init()
        .map_err(|e| LoggingError::Subscriber(e.to_string()))
}

/// Parse a plain level name (`error` .. `trace`, or `off`).
pub fn parse_level(level: &str) -> Result<LevelFilter, LoggingError> {
    if level.trim().is_empty() {
        return Err(LoggingError::InvalidLevel(level.to_string()));
    }
    level
        .parse::<LevelFilter>()
        .map_err(|_| LoggingError::InvalidLevel(level.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn level_names_parse() {
        for l in ["error", "warn", "info", "debug", "trace", "off"] {
            assert!(parse_level(l).is_ok(), "expected '{l}' to be valid");
        }
        assert_eq!(parse_level("debug").unwrap(), LevelFilter::DEBUG);
    }

    #[test]
    fn unknown_levels_fail() {
        assert!(parse_level("verbose").is_err());
        assert!(parse_level("").is_err());
    }

    #[test]
    fn init_twice_reports_existing_subscriber() {
        // The first call may lose to another test in the same process
        let _ = init("info");
        assert!(matches!(init("info"), Err(LoggingError::Subscriber(_))));
    }
}
