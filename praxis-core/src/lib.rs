//! Praxis Core - shared types for the data-access resilience layer
//!
//! Errors, configuration, the diagnostics hook and tracing setup used by
//! `praxis-query` (rate-limit aware query runner) and `praxis-storage`
//! (read-through cache over a hosted key-value store).

pub mod config;
pub mod diagnostics;
pub mod error;
pub mod telemetry;

pub use config::{CacheConfig, LimiterConfig, PraxisConfig, RetryConfig, ThrottleConfig};
pub use diagnostics::{DiagnosticEvent, DiagnosticSink, NoopSink, TracingSink};
pub use error::{
    CacheError, ConfigError, PraxisError, PraxisResult, TelemetryError, ValidationError,
};
pub use telemetry::{init_tracing, LogFormat, TelemetryConfig};
