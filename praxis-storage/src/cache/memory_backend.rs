//! Process-local [`KvStore`] for development and tests.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use praxis_core::CacheError;
use tokio::time::Instant;

use super::traits::{ttl_secs, KvStore};

#[derive(Debug, Clone)]
struct Entry {
    value: String,
    expires_at: Option<Instant>,
}

impl Entry {
    fn is_live(&self, now: Instant) -> bool {
        self.expires_at.map_or(true, |at| now < at)
    }
}

/// In-memory store with TTL expiry, driven by tokio's clock so paused-time
/// tests can expire entries deterministically.
#[derive(Debug, Default)]
pub struct InMemoryKvStore {
    entries: Mutex<HashMap<String, Entry>>,
}

impl InMemoryKvStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of live entries.
    pub fn len(&self) -> usize {
        let now = Instant::now();
        self.entries
            .lock()
            .map(|entries| entries.values().filter(|e| e.is_live(now)).count())
            .unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn with_entries<R>(
        &self,
        f: impl FnOnce(&mut HashMap<String, Entry>, Instant) -> R,
    ) -> Result<R, CacheError> {
        let now = Instant::now();
        let mut entries = self.entries.lock().map_err(|_| CacheError::LockPoisoned)?;
        entries.retain(|_, entry| entry.is_live(now));
        Ok(f(&mut entries, now))
    }
}

/// `None` when the TTL reaches past what the clock can represent.
fn expiry(now: Instant, ttl: Duration) -> Option<Instant> {
    now.checked_add(Duration::from_secs(ttl_secs(ttl)))
}

#[async_trait]
impl KvStore for InMemoryKvStore {
    async fn get(&self, key: &str) -> Result<Option<String>, CacheError> {
        self.with_entries(|entries, _| entries.get(key).map(|e| e.value.clone()))
    }

    async fn setex(&self, key: &str, ttl: Duration, value: &str) -> Result<(), CacheError> {
        self.with_entries(|entries, now| {
            entries.insert(
                key.to_string(),
                Entry {
                    value: value.to_string(),
                    expires_at: expiry(now, ttl),
                },
            );
        })
    }

    async fn del(&self, keys: &[&str]) -> Result<u64, CacheError> {
        self.with_entries(|entries, _| {
            keys.iter()
                .filter(|key| entries.remove(**key).is_some())
                .count() as u64
        })
    }

    async fn incr(&self, key: &str) -> Result<i64, CacheError> {
        self.with_entries(|entries, _| {
            let entry = entries.entry(key.to_string()).or_insert_with(|| Entry {
                value: "0".to_string(),
                expires_at: None,
            });
            let current: i64 = entry.value.parse().map_err(|_| CacheError::CommandFailed {
                command: "INCR".to_string(),
                reason: "value is not an integer".to_string(),
            })?;
            let next = current.checked_add(1).ok_or_else(|| CacheError::CommandFailed {
                command: "INCR".to_string(),
                reason: "increment would overflow".to_string(),
            })?;
            entry.value = next.to_string();
            Ok(next)
        })?
    }

    async fn expire(&self, key: &str, ttl: Duration) -> Result<bool, CacheError> {
        self.with_entries(|entries, now| match entries.get_mut(key) {
            Some(entry) => {
                entry.expires_at = expiry(now, ttl);
                true
            }
            None => false,
        })
    }

    async fn ttl(&self, key: &str) -> Result<Option<Duration>, CacheError> {
        self.with_entries(|entries, now| {
            entries
                .get(key)
                .and_then(|e| e.expires_at)
                .map(|at| at.saturating_duration_since(now))
        })
    }

    fn backend_name(&self) -> &'static str {
        "memory"
    }
}
