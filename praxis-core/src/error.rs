//! Error types for the Praxis data-access layer

use thiserror::Error;

/// Key-value store and cache errors.
///
/// These never escape the cache itself; they are reported to the
/// diagnostics hook and the caller sees a cache miss instead.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum CacheError {
    #[error("Cache store is not configured")]
    NotConfigured,

    #[error("Cache store unreachable: {reason}")]
    Unavailable { reason: String },

    #[error("Cache store rejected {command}: {reason}")]
    CommandFailed { command: String, reason: String },

    #[error("Unexpected reply to {command}: {reason}")]
    Protocol { command: String, reason: String },

    #[error("Serialization failed for key {key}: {reason}")]
    Serialization { key: String, reason: String },

    #[error("Cache store lock poisoned")]
    LockPoisoned,
}

/// Configuration errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Invalid value for {field}: {value} - {reason}")]
    InvalidValue {
        field: String,
        value: String,
        reason: String,
    },
}

/// Validation errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("Invalid cache key {key:?}: {reason}")]
    InvalidCacheKey { key: String, reason: String },
}

/// Telemetry setup errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TelemetryError {
    #[error("Invalid log filter {filter:?}: {reason}")]
    InvalidFilter { filter: String, reason: String },

    #[error("Invalid log format {format:?}: expected json or pretty")]
    InvalidFormat { format: String },

    #[error("Failed to install subscriber: {reason}")]
    SubscriberInit { reason: String },
}

/// Master error type for all Praxis errors.
#[derive(Debug, Clone, Error)]
pub enum PraxisError {
    #[error("Cache error: {0}")]
    Cache(#[from] CacheError),

    #[error("Config error: {0}")]
    Config(#[from] ConfigError),

    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    #[error("Telemetry error: {0}")]
    Telemetry(#[from] TelemetryError),
}

/// Result type alias for Praxis operations.
pub type PraxisResult<T> = Result<T, PraxisError>;

// =============================================================================
// TESTS
// =============================================================================
