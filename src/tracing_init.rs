//! Tracing subscriber setup.
//!
//! The default filter comes from `application.log_level`; `RUST_LOG`, when
//! set, wins. Optionally emits JSON lines instead of the human-readable
//! format, for piping into a log collector.

use tracing::debug;
use tracing_subscriber::EnvFilter;

use crate::config::QpdConfig;
use crate::error::{AppResult, QpdError};

/// Install the global subscriber for `config`.
///
/// Calling this when a global subscriber is already installed is not an
/// error; the existing subscriber is kept.
///
/// # Errors
///
/// Returns `QpdError::Configuration` if `RUST_LOG` or the configured level is
/// not a valid filter directive.
pub fn init_from_config(config: &QpdConfig, json: bool) -> AppResult<()> {
    init(&config.application.log_level, json)
}

/// Install the global subscriber with `level` as the default directive.
pub fn init(level: &str, json: bool) -> AppResult<()> {
    let filter = match std::env::var(EnvFilter::DEFAULT_ENV) {
        Ok(directives) if !directives.is_empty() => EnvFilter::try_new(directives),
        _ => EnvFilter::try_new(level),
    }
    .map_err(|e| QpdError::Configuration(format!("Invalid log filter: {e}")))?;

    let installed = if json {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .with_thread_names(true)
            .try_init()
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_thread_names(true)
            .try_init()
    };

    if installed.is_err() {
        debug!("Global tracing subscriber already installed, keeping it");
    }
    Ok(())
}
