//! Client for the hosted key-value store's REST protocol.
//!
//! Each command is a `POST` of a JSON array (`["SETEX","k","60","v"]`) to
//! the endpoint, authenticated with a bearer token. The store answers with
//! `{"result": ...}` or `{"error": "..."}`.

use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use praxis_core::{CacheConfig, CacheError};
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use serde_json::Value;

use super::traits::{ttl_secs, KvStore};

#[derive(Debug, Deserialize)]
struct Reply {
    #[serde(default)]
    result: Option<Value>,
    #[serde(default)]
    error: Option<String>,
}

/// [`KvStore`] over HTTPS.
#[derive(Clone)]
pub struct RestKvStore {
    client: reqwest::Client,
    url: String,
    token: SecretString,
}

impl fmt::Debug for RestKvStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RestKvStore")
            .field("url", &self.url)
            .field("token", &"[REDACTED]")
            .finish()
    }
}

impl RestKvStore {
    pub fn new(
        url: impl Into<String>,
        token: SecretString,
        timeout: Duration,
    ) -> Result<Self, CacheError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| CacheError::Unavailable {
                reason: format!("failed to build HTTP client: {e}"),
            })?;
        Ok(Self {
            client,
            url: url.into().trim_end_matches('/').to_string(),
            token,
        })
    }

    /// Build a client from config. `Err(CacheError::NotConfigured)` when the
    /// URL or token is missing.
    pub fn from_config(config: &CacheConfig) -> Result<Self, CacheError> {
        let (url, token) = config.endpoint().ok_or(CacheError::NotConfigured)?;
        Self::new(url, token.clone(), config.request_timeout())
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    async fn command(&self, args: &[&str]) -> Result<Option<Value>, CacheError> {
        let name = args.first().copied().unwrap_or_default();
        tracing::trace!(command = name, "kv command");

        let response = self
            .client
            .post(&self.url)
            .bearer_auth(self.token.expose_secret())
            .json(args)
            .send()
            .await
            .map_err(|e| CacheError::Unavailable {
                reason: e.to_string(),
            })?;

        let status = response.status();
        let body = response.text().await.map_err(|e| CacheError::Unavailable {
            reason: e.to_string(),
        })?;

        let reply: Reply = match serde_json::from_str(&body) {
            Ok(reply) => reply,
            Err(_) if !status.is_success() => {
                return Err(CacheError::CommandFailed {
                    command: name.to_string(),
                    reason: format!("HTTP {}", status.as_u16()),
                })
            }
            Err(e) => {
                return Err(CacheError::Protocol {
                    command: name.to_string(),
                    reason: e.to_string(),
                })
            }
        };

        if let Some(error) = reply.error {
            return Err(CacheError::CommandFailed {
                command: name.to_string(),
                reason: error,
            });
        }
        if !status.is_success() {
            return Err(CacheError::CommandFailed {
                command: name.to_string(),
                reason: format!("HTTP {}", status.as_u16()),
            });
        }
        Ok(reply.result.filter(|v| !v.is_null()))
    }
}

fn protocol(command: &str, reply: &Option<Value>) -> CacheError {
    CacheError::Protocol {
        command: command.to_string(),
        reason: format!("unexpected result {reply:?}"),
    }
}

fn as_integer(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n.as_i64(),
        Value::String(s) => s.parse().ok(),
        _ => None,
    }
}

#[async_trait]
impl KvStore for RestKvStore {
    async fn get(&self, key: &str) -> Result<Option<String>, CacheError> {
        match self.command(&["GET", key]).await? {
            None => Ok(None),
            Some(Value::String(s)) => Ok(Some(s)),
            Some(other) => Ok(Some(other.to_string())),
        }
    }

    async fn setex(&self, key: &str, ttl: Duration, value: &str) -> Result<(), CacheError> {
        let secs = ttl_secs(ttl).to_string();
        self.command(&["SETEX", key, &secs, value]).await?;
        Ok(())
    }

    async fn del(&self, keys: &[&str]) -> Result<u64, CacheError> {
        if keys.is_empty() {
            return Ok(0);
        }
        let mut args = Vec::with_capacity(keys.len() + 1);
        args.push("DEL");
        args.extend_from_slice(keys);
        let reply = self.command(&args).await?;
        reply
            .as_ref()
            .and_then(as_integer)
            .and_then(|n| u64::try_from(n).ok())
            .ok_or_else(|| protocol("DEL", &reply))
    }

    async fn incr(&self, key: &str) -> Result<i64, CacheError> {
        let reply = self.command(&["INCR", key]).await?;
        reply
            .as_ref()
            .and_then(as_integer)
            .ok_or_else(|| protocol("INCR", &reply))
    }

    async fn expire(&self, key: &str, ttl: Duration) -> Result<bool, CacheError> {
        let secs = ttl_secs(ttl).to_string();
        let reply = self.command(&["EXPIRE", key, &secs]).await?;
        reply
            .as_ref()
            .and_then(as_integer)
            .map(|n| n == 1)
            .ok_or_else(|| protocol("EXPIRE", &reply))
    }

    async fn ttl(&self, key: &str) -> Result<Option<Duration>, CacheError> {
        let reply = self.command(&["TTL", key]).await?;
        let secs = reply
            .as_ref()
            .and_then(as_integer)
            .ok_or_else(|| protocol("TTL", &reply))?;
        // -1: no expiry, -2: no such key.
        Ok(u64::try_from(secs).ok().map(Duration::from_secs))
    }

    fn backend_name(&self) -> &'static str {
        "rest"
    }
}
