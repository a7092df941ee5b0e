//! Key-value store abstraction and cache statistics.

use std::time::Duration;

use async_trait::async_trait;
use praxis_core::CacheError;

/// The subset of store commands the cache and the request limiter need.
///
/// Values are opaque strings; the cache owns JSON encoding. Implementations
/// must be cheap to share behind an `Arc` and safe to call concurrently.
#[async_trait]
pub trait KvStore: Send + Sync {
    /// Fetch a value. `Ok(None)` when the key is absent or expired.
    async fn get(&self, key: &str) -> Result<Option<String>, CacheError>;

    /// Store `value` under `key`, expiring after `ttl`.
    ///
    /// Stores work in whole seconds; sub-second TTLs are rounded up to one
    /// second.
    async fn setex(&self, key: &str, ttl: Duration, value: &str) -> Result<(), CacheError>;

    /// Delete keys, returning how many existed.
    async fn del(&self, keys: &[&str]) -> Result<u64, CacheError>;

    /// Increment an integer counter, creating it at 1 when absent.
    async fn incr(&self, key: &str) -> Result<i64, CacheError>;

    /// Set a TTL on an existing key. `Ok(false)` when the key is absent.
    async fn expire(&self, key: &str, ttl: Duration) -> Result<bool, CacheError>;

    /// Remaining lifetime of a key. `Ok(None)` when the key is absent or
    /// never expires.
    async fn ttl(&self, key: &str) -> Result<Option<Duration>, CacheError>;

    /// Backend name for diagnostics.
    fn backend_name(&self) -> &'static str {
        "kv"
    }
}

/// TTL in the whole seconds the store protocol expects.
pub(crate) fn ttl_secs(ttl: Duration) -> u64 {
    let secs = ttl.as_secs();
    if ttl.subsec_nanos() > 0 {
        secs.saturating_add(1)
    } else {
        secs.max(1)
    }
}

/// Statistics about cache usage.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    /// Number of cache hits.
    pub hits: u64,
    /// Number of cache misses, store errors and healed entries included.
    pub misses: u64,
    /// Number of successful writes.
    pub writes: u64,
    /// Number of store commands that failed and were absorbed.
    pub store_errors: u64,
    /// Number of undecodable entries that were deleted on read.
    pub healed: u64,
}

impl CacheStats {
    /// Calculate the hit rate (0.0 to 1.0).
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}
