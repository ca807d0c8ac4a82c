//! Tracing subscriber initialization
//!
//! Worker processes call [`init_tracing`] once at startup. Library code only
//! emits `tracing` events; it never installs a subscriber itself.

use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::ConfigError;

/// Default filter when neither `CACHEWIRE_LOG_FILTER` nor `RUST_LOG` is set.
const DEFAULT_FILTER: &str = "cachewire_storage=info,cachewire_core=info,warn";

/// Logging configuration from environment variables.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TelemetryConfig {
    /// Emit one JSON object per event instead of human-readable lines.
    pub json: bool,
    /// `EnvFilter` directive string.
    pub filter: String,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            json: std::env::var("CACHEWIRE_LOG_JSON")
                .map(|s| s == "true" || s == "1")
                .unwrap_or(false),
            filter: std::env::var("CACHEWIRE_LOG_FILTER")
                .or_else(|_| std::env::var("RUST_LOG"))
                .unwrap_or_else(|_| DEFAULT_FILTER.to_string()),
        }
    }
}

/// Install the global tracing subscriber.
///
/// Fails if a subscriber is already installed or the filter does not parse.
pub fn init_tracing(config: &TelemetryConfig) -> Result<(), ConfigError> {
    let env_filter = EnvFilter::try_new(&config.filter).map_err(|e| ConfigError::InvalidValue {
        field: "CACHEWIRE_LOG_FILTER".to_string(),
        value: config.filter.clone(),
        reason: e.to_string(),
    })?;

    let registry = tracing_subscriber::registry().with(env_filter);
    let result = if config.json {
        registry.with(fmt::layer().json()).try_init()
    } else {
        registry.with(fmt::layer()).try_init()
    };

    result.map_err(|e| ConfigError::TelemetryInit {
        reason: e.to_string(),
    })?;

    tracing::info!(json = config.json, filter = %config.filter, "Tracing initialized");
    Ok(())
}
