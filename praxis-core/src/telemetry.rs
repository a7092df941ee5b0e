//! Tracing subscriber initialization.
//!
//! Host binaries call [`init_tracing`] once at startup. Library code only
//! emits `tracing` events and never installs a subscriber itself.

use serde::{Deserialize, Serialize};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::error::{PraxisResult, TelemetryError};

/// Output format for log lines.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// One JSON object per line (production).
    #[default]
    Json,
    /// Human readable, multi-line (development).
    Pretty,
}

impl std::str::FromStr for LogFormat {
    type Err = TelemetryError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "json" => Ok(Self::Json),
            "pretty" | "text" => Ok(Self::Pretty),
            _ => Err(TelemetryError::InvalidFormat {
                format: s.to_string(),
            }),
        }
    }
}

/// Telemetry configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TelemetryConfig {
    pub format: LogFormat,
    /// `EnvFilter` directives, e.g. `praxis_query=debug,info`.
    pub filter: String,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            format: LogFormat::Json,
            filter: "praxis_query=info,praxis_storage=info,warn".to_string(),
        }
    }
}

impl TelemetryConfig {
    /// Reads `PRAXIS_LOG_FORMAT` and `PRAXIS_LOG_FILTER` (falling back to
    /// `RUST_LOG`), keeping defaults for anything unset or invalid.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        let format = std::env::var("PRAXIS_LOG_FORMAT")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(defaults.format);
        let filter = std::env::var("PRAXIS_LOG_FILTER")
            .or_else(|_| std::env::var("RUST_LOG"))
            .unwrap_or(defaults.filter);
        Self { format, filter }
    }

    fn env_filter(&self) -> Result<EnvFilter, TelemetryError> {
        EnvFilter::try_new(&self.filter).map_err(|e| TelemetryError::InvalidFilter {
            filter: self.filter.clone(),
            reason: e.to_string(),
        })
    }
}

/// Install the global tracing subscriber.
///
/// Fails if the filter does not parse or a global subscriber is already set.
pub fn init_tracing(config: &TelemetryConfig) -> PraxisResult<()> {
    let env_filter = config.env_filter()?;
    let registry = tracing_subscriber::registry().with(env_filter);

    let result = match config.format {
        LogFormat::Json => registry
            .with(tracing_subscriber::fmt::layer().json())
            .try_init(),
        LogFormat::Pretty => registry
            .with(tracing_subscriber::fmt::layer().pretty())
            .try_init(),
    };
    result.map_err(|e| TelemetryError::SubscriberInit {
        reason: e.to_string(),
    })?;

    tracing::info!(format = ?config.format, filter = %config.filter, "Telemetry initialized");
    Ok(())
}
