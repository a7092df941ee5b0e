//! Configuration for the query runner, the cache and the request limiter.
//!
//! Every struct has working defaults, can be deserialized from a config
//! file, and can be read from process environment at the composition root.
//! Components never read the environment themselves; they receive one of
//! these structs through their constructor.

use std::str::FromStr;
use std::time::Duration;

use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Deserializer, Serialize};

use crate::error::ConfigError;

// ============================================================================
// RETRY
// ============================================================================

/// Retry policy for rate-limited backend queries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Retries after the first attempt. Zero disables retrying.
    pub max_retries: u32,
    /// Delay before the first retry; doubles for every further retry.
    pub initial_delay_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            initial_delay_ms: 500,
        }
    }
}

impl RetryConfig {
    pub fn initial_delay(&self) -> Duration {
        Duration::from_millis(self.initial_delay_ms)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.initial_delay_ms == 0 {
            return Err(ConfigError::InvalidValue {
                field: "retry.initial_delay_ms".to_string(),
                value: self.initial_delay_ms.to_string(),
                reason: "initial_delay_ms must be positive".to_string(),
            });
        }
        Ok(())
    }
}

// ============================================================================
// THROTTLE
// ============================================================================

/// Proactive self-throttling applied before each query.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ThrottleConfig {
    /// Length of the sliding window.
    pub window_ms: u64,
    /// Calls allowed inside one window before the runner pauses.
    pub ceiling: usize,
    /// Pause taken once the ceiling is reached.
    pub pause_ms: u64,
}

impl Default for ThrottleConfig {
    fn default() -> Self {
        Self {
            window_ms: 1000,
            ceiling: 10,
            pause_ms: 100,
        }
    }
}

impl ThrottleConfig {
    pub fn window(&self) -> Duration {
        Duration::from_millis(self.window_ms)
    }

    pub fn pause(&self) -> Duration {
        Duration::from_millis(self.pause_ms)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.window_ms == 0 {
            return Err(ConfigError::InvalidValue {
                field: "throttle.window_ms".to_string(),
                value: self.window_ms.to_string(),
                reason: "window_ms must be positive".to_string(),
            });
        }
        if self.ceiling == 0 {
            return Err(ConfigError::InvalidValue {
                field: "throttle.ceiling".to_string(),
                value: self.ceiling.to_string(),
                reason: "ceiling must be at least 1".to_string(),
            });
        }
        Ok(())
    }
}

// ============================================================================
// CACHE
// ============================================================================

/// Connection settings for the hosted key-value store.
///
/// Leaving either `rest_url` or `rest_token` unset disables the cache; the
/// rest of the system keeps working without it.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// REST endpoint of the key-value store.
    pub rest_url: Option<String>,
    /// Bearer token for the REST endpoint.
    #[serde(deserialize_with = "deserialize_secret")]
    pub rest_token: Option<SecretString>,
    /// TTL used when a caller does not pick one.
    pub default_ttl_secs: u64,
    /// Per-command HTTP timeout.
    pub request_timeout_ms: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            rest_url: None,
            rest_token: None,
            default_ttl_secs: 300,
            request_timeout_ms: 2_000,
        }
    }
}

impl CacheConfig {
    /// Config with both connection settings present.
    pub fn with_endpoint(url: impl Into<String>, token: impl Into<String>) -> Self {
        Self {
            rest_url: Some(url.into()),
            rest_token: Some(SecretString::from(token.into())),
            ..Self::default()
        }
    }

    /// Returns the endpoint and token when both are present and non-blank.
    pub fn endpoint(&self) -> Option<(&str, &SecretString)> {
        let url = self.rest_url.as_deref().filter(|u| !u.trim().is_empty())?;
        let token = self
            .rest_token
            .as_ref()
            .filter(|t| !t.expose_secret().trim().is_empty())?;
        Some((url, token))
    }

    pub fn is_enabled(&self) -> bool {
        self.endpoint().is_some()
    }

    pub fn default_ttl(&self) -> Duration {
        Duration::from_secs(self.default_ttl_secs)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if let Some(url) = self.rest_url.as_deref() {
            if !url.is_empty() && !(url.starts_with("https://") || url.starts_with("http://")) {
                return Err(ConfigError::InvalidValue {
                    field: "cache.rest_url".to_string(),
                    value: url.to_string(),
                    reason: "must be an http(s) URL".to_string(),
                });
            }
        }
        if self.default_ttl_secs == 0 {
            return Err(ConfigError::InvalidValue {
                field: "cache.default_ttl_secs".to_string(),
                value: self.default_ttl_secs.to_string(),
                reason: "default_ttl_secs must be positive".to_string(),
            });
        }
        if self.request_timeout_ms == 0 {
            return Err(ConfigError::InvalidValue {
                field: "cache.request_timeout_ms".to_string(),
                value: self.request_timeout_ms.to_string(),
                reason: "request_timeout_ms must be positive".to_string(),
            });
        }
        Ok(())
    }
}

fn parse_var<T: FromStr>(lookup: &impl Fn(&str) -> Option<String>, key: &str) -> Option<T> {
    lookup(key).and_then(|s| s.trim().parse().ok())
}

fn deserialize_secret<'de, D>(deserializer: D) -> Result<Option<SecretString>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw: Option<String> = Option::deserialize(deserializer)?;
    Ok(raw.map(SecretString::from))
}

// ============================================================================
// REQUEST LIMITER
// ============================================================================

/// Fixed-window request limiting backed by the key-value store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LimiterConfig {
    /// Requests allowed per subject and window.
    pub max_requests: u32,
    /// Window length.
    pub window_secs: u64,
    /// How long a blocked subject stays blocked.
    pub block_secs: u64,
}

impl Default for LimiterConfig {
    fn default() -> Self {
        Self {
            max_requests: 10,
            window_secs: 60,
            block_secs: 3600,
        }
    }
}

impl LimiterConfig {
    pub fn window(&self) -> Duration {
        Duration::from_secs(self.window_secs)
    }

    pub fn block_duration(&self) -> Duration {
        Duration::from_secs(self.block_secs)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_requests == 0 {
            return Err(ConfigError::InvalidValue {
                field: "limiter.max_requests".to_string(),
                value: self.max_requests.to_string(),
                reason: "max_requests must be at least 1".to_string(),
            });
        }
        if self.window_secs == 0 {
            return Err(ConfigError::InvalidValue {
                field: "limiter.window_secs".to_string(),
                value: self.window_secs.to_string(),
                reason: "window_secs must be positive".to_string(),
            });
        }
        Ok(())
    }
}

// ============================================================================
// MASTER CONFIG
// ============================================================================

/// All data-access layer settings, as wired at the composition root.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct PraxisConfig {
    pub retry: RetryConfig,
    pub throttle: ThrottleConfig,
    pub cache: CacheConfig,
    pub limiter: LimiterConfig,
}

impl PraxisConfig {
    /// Create PraxisConfig from environment variables.
    ///
    /// Environment variables:
    /// - `PRAXIS_QUERY_MAX_RETRIES` (default: 3)
    /// - `PRAXIS_QUERY_INITIAL_DELAY_MS` (default: 500)
    /// - `PRAXIS_THROTTLE_WINDOW_MS` (default: 1000)
    /// - `PRAXIS_THROTTLE_CEILING` (default: 10)
    /// - `PRAXIS_THROTTLE_PAUSE_MS` (default: 100)
    /// - `KV_REST_API_URL`, `KV_REST_API_TOKEN`: store endpoint (unset = cache disabled)
    /// - `PRAXIS_CACHE_DEFAULT_TTL_SECS` (default: 300)
    /// - `PRAXIS_CACHE_TIMEOUT_MS` (default: 2000)
    /// - `PRAXIS_LIMIT_MAX_REQUESTS` (default: 10)
    /// - `PRAXIS_LIMIT_WINDOW_SECS` (default: 60)
    /// - `PRAXIS_LIMIT_BLOCK_SECS` (default: 3600)
    ///
    /// Unparseable numbers fall back to the default.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Same as [`PraxisConfig::from_env`] with an explicit variable source.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();

        Self {
            retry: RetryConfig {
                max_retries: parse_var(&lookup, "PRAXIS_QUERY_MAX_RETRIES")
                    .unwrap_or(defaults.retry.max_retries),
                initial_delay_ms: parse_var(&lookup, "PRAXIS_QUERY_INITIAL_DELAY_MS")
                    .unwrap_or(defaults.retry.initial_delay_ms),
            },
            throttle: ThrottleConfig {
                window_ms: parse_var(&lookup, "PRAXIS_THROTTLE_WINDOW_MS")
                    .unwrap_or(defaults.throttle.window_ms),
                ceiling: parse_var(&lookup, "PRAXIS_THROTTLE_CEILING").unwrap_or(defaults.throttle.ceiling),
                pause_ms: parse_var(&lookup, "PRAXIS_THROTTLE_PAUSE_MS").unwrap_or(defaults.throttle.pause_ms),
            },
            cache: CacheConfig {
                rest_url: lookup("KV_REST_API_URL").filter(|s| !s.trim().is_empty()),
                rest_token: lookup("KV_REST_API_TOKEN")
                    .filter(|s| !s.trim().is_empty())
                    .map(SecretString::from),
                default_ttl_secs: parse_var(&lookup, "PRAXIS_CACHE_DEFAULT_TTL_SECS")
                    .unwrap_or(defaults.cache.default_ttl_secs),
                request_timeout_ms: parse_var(&lookup, "PRAXIS_CACHE_TIMEOUT_MS")
                    .unwrap_or(defaults.cache.request_timeout_ms),
            },
            limiter: LimiterConfig {
                max_requests: parse_var(&lookup, "PRAXIS_LIMIT_MAX_REQUESTS")
                    .unwrap_or(defaults.limiter.max_requests),
                window_secs: parse_var(&lookup, "PRAXIS_LIMIT_WINDOW_SECS")
                    .unwrap_or(defaults.limiter.window_secs),
                block_secs: parse_var(&lookup, "PRAXIS_LIMIT_BLOCK_SECS")
                    .unwrap_or(defaults.limiter.block_secs),
            },
        }
    }

    /// Validate every section, returning the first problem found.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.retry.validate()?;
        self.throttle.validate()?;
        self.cache.validate()?;
        self.limiter.validate()?;
        Ok(())
    }
}
