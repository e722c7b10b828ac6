//! Logging setup using `tracing` + `tracing-subscriber`.
//!
//! Priority for determining the filter:
//! 1. explicit level / directive (CLI flag or settings file)
//! 2. `SNIPE_LOG` environment variable (e.g. "info", "snipe_core=debug")
//! 3. default to `info`

use tracing_subscriber::EnvFilter;

use crate::app::settings::LOG_ENV;

#[derive(Debug, thiserror::Error)]
pub enum LoggingError {
    #[error("invalid log filter {directive:?}: {reason}")]
    InvalidFilter { directive: String, reason: String },

    #[error("global subscriber already installed: {0}")]
    AlreadyInstalled(String),
}

/// Build the filter without installing anything.
pub fn build_filter(level: Option<&str>) -> Result<EnvFilter, LoggingError> {
    let directive = match level {
        Some(level) => level.to_string(),
        None => std::env::var(LOG_ENV)
            .ok()
            .filter(|v| !v.trim().is_empty())
            .unwrap_or_else(|| "info".to_string()),
    };
    EnvFilter::try_new(normalize(&directive)).map_err(|e| LoggingError::InvalidFilter {
        directive,
        reason: e.to_string(),
    })
}

/// Initialise the global subscriber. A second call returns an error.
pub fn init_logging(level: Option<&str>) -> Result<(), LoggingError> {
    let filter = build_filter(level)?;
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_ids(false)
        .with_thread_names(false)
        .try_init()
        .map_err(|e| LoggingError::AlreadyInstalled(e.to_string()))
}

// "warning" is what the per-task log trail calls it
fn normalize(directive: &str) -> String {
    match directive.trim().to_lowercase().as_str() {
        "warning" => "warn".to_string(),
        _ => directive.trim().to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case("info")]
    #[case("warning")]
    #[case("snipe_core=debug,reqwest=warn")]
    fn accepts_levels_and_directives(#[case] level: &str) {
        assert!(build_filter(Some(level)).is_ok());
    }

    #[test]
    fn rejects_garbage() {
        assert!(matches!(
            build_filter(Some("snipe_core=loud")),
            Err(LoggingError::InvalidFilter { .. })
        ));
    }
}
