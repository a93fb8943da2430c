//! Process-wide tracing setup.

use thiserror::Error;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::{fmt, EnvFilter, Registry};

use crate::config::{LogFormat, LoggingConfig};

#[derive(Error, Debug)]
pub enum TelemetryError {
    #[error("Invalid log filter '{directive}': {reason}")]
    Filter { directive: String, reason: String },

    #[error("A global tracing subscriber is already installed")]
    AlreadyInstalled,

    #[error("Failed to bridge log records: {0}")]
    LogBridge(String),
}

/// Builds the filter from `RUST_LOG` when set, else from the configured level.
fn env_filter(config: &LoggingConfig) -> Result<EnvFilter, TelemetryError> {
    if let Ok(filter) = EnvFilter::try_from_default_env() {
        return Ok(filter);
    }
    EnvFilter::try_new(&config.level).map_err(|e| TelemetryError::Filter {
        directive: config.level.clone(),
        reason: e.to_string(),
    })
}

/// Installs the global subscriber and routes `log` records (emitted by the
/// worker threads) into it. Call once at startup.
pub fn init_tracing(config: &LoggingConfig) -> Result<(), TelemetryError> {
    let filter = env_filter(config)?;

    match config.format {
        LogFormat::Json => {
            let subscriber = Registry::default()
                .with(filter)
                .with(fmt::layer().json().with_current_span(true));
            tracing::subscriber::set_global_default(subscriber)
                .map_err(|_| TelemetryError::AlreadyInstalled)?;
        }
        LogFormat::Pretty => {
            let subscriber = Registry::default()
                .with(filter)
                .with(fmt::layer().with_target(true));
            tracing::subscriber::set_global_default(subscriber)
                .map_err(|_| TelemetryError::AlreadyInstalled)?;
        }
    }

    tracing_log::LogTracer::init().map_err(|e| TelemetryError::LogBridge(e.to_string()))
}
