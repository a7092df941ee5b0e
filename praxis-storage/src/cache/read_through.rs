//! Read-through cache over a [`KvStore`].
//!
//! The cache is an optimization, never a source of failure: every store
//! error, corrupt entry or missing configuration degrades to a cache miss.
//! What was absorbed is reported to the [`DiagnosticSink`].
//!
//! Values are stored as JSON text. An entry that cannot be decoded (a
//! partially written value, or one written by an older struct layout) is
//! deleted on read so the next write replaces it.

use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use praxis_core::{CacheConfig, CacheError, DiagnosticEvent, DiagnosticSink, TracingSink};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;

use super::key::CacheKey;
use super::rest_backend::RestKvStore;
use super::traits::{CacheStats, KvStore};

/// Whether the cache talks to a store at all.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheMode {
    Enabled,
    /// No store configured. Every read misses, every write is dropped.
    Disabled,
}

#[derive(Debug, Default)]
struct CacheCounters {
    hits: AtomicU64,
    misses: AtomicU64,
    writes: AtomicU64,
    store_errors: AtomicU64,
    healed: AtomicU64,
}

impl CacheCounters {
    fn incr(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }
}

/// JSON read-through cache. Cheap to clone; clones share the store and
/// statistics.
#[derive(Clone)]
pub struct ReadThroughCache {
    store: Option<Arc<dyn KvStore>>,
    sink: Arc<dyn DiagnosticSink>,
    default_ttl: Duration,
    counters: Arc<CacheCounters>,
}

impl std::fmt::Debug for ReadThroughCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReadThroughCache")
            .field("mode", &self.mode())
            .field(
                "backend",
                &self.store.as_ref().map(|store| store.backend_name()),
            )
            .field("default_ttl", &self.default_ttl)
            .finish()
    }
}

impl ReadThroughCache {
    /// Cache over an explicit store.
    pub fn new(store: Arc<dyn KvStore>) -> Self {
        Self {
            store: Some(store),
            sink: Arc::new(TracingSink),
            default_ttl: CacheConfig::default().default_ttl(),
            counters: Arc::new(CacheCounters::default()),
        }
    }

    /// A cache that never touches a store.
    pub fn disabled() -> Self {
        Self {
            store: None,
            sink: Arc::new(TracingSink),
            default_ttl: CacheConfig::default().default_ttl(),
            counters: Arc::new(CacheCounters::default()),
        }
    }

    /// Build the REST-backed cache, or a disabled one when the endpoint is
    /// not configured or the client cannot be built. The reason is reported
    /// to `sink`.
    pub fn from_config(config: &CacheConfig, sink: Arc<dyn DiagnosticSink>) -> Self {
        let cache = match RestKvStore::from_config(config) {
            Ok(store) => Self::new(Arc::new(store)),
            Err(e) => {
                let reason = match e {
                    CacheError::NotConfigured => {
                        "KV_REST_API_URL or KV_REST_API_TOKEN not set".to_string()
                    }
                    other => other.to_string(),
                };
                sink.record(DiagnosticEvent::CacheDisabled { reason });
                Self::disabled()
            }
        };
        cache
            .with_sink(sink)
            .with_default_ttl(config.default_ttl())
    }

    pub fn with_sink(mut self, sink: Arc<dyn DiagnosticSink>) -> Self {
        self.sink = sink;
        self
    }

    pub fn with_default_ttl(mut self, ttl: Duration) -> Self {
        self.default_ttl = ttl;
        self
    }

    pub fn mode(&self) -> CacheMode {
        if self.store.is_some() {
            CacheMode::Enabled
        } else {
            CacheMode::Disabled
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.mode() == CacheMode::Enabled
    }

    pub fn default_ttl(&self) -> Duration {
        self.default_ttl
    }

    /// The underlying store, shared with the request limiter.
    pub fn store(&self) -> Option<&Arc<dyn KvStore>> {
        self.store.as_ref()
    }

    pub fn sink(&self) -> &Arc<dyn DiagnosticSink> {
        &self.sink
    }

    /// Fetch and decode a value. Any failure reads as a miss.
    pub async fn get<T: DeserializeOwned>(&self, key: &CacheKey) -> Option<T> {
        let store = self.store.as_ref()?;

        let raw = match store.get(key.as_str()).await {
            Ok(Some(raw)) => raw,
            Ok(None) => {
                CacheCounters::incr(&self.counters.misses);
                return None;
            }
            Err(e) => {
                self.store_failed("get", key, &e);
                CacheCounters::incr(&self.counters.misses);
                return None;
            }
        };

        let decoded = serde_json::from_str::<Value>(&raw).and_then(|value| {
            if value.is_null() {
                Ok(None)
            } else {
                serde_json::from_value::<T>(value).map(Some)
            }
        });

        match decoded {
            Ok(Some(value)) => {
                CacheCounters::incr(&self.counters.hits);
                Some(value)
            }
            Ok(None) => {
                CacheCounters::incr(&self.counters.misses);
                None
            }
            Err(e) => {
                CacheCounters::incr(&self.counters.misses);
                self.heal(&**store, key, e.to_string()).await;
                None
            }
        }
    }

    /// Encode and store a value for `ttl`.
    ///
    /// Values that encode to `null` (`None`, `()`) are not stored. Store
    /// failures are reported, never returned.
    pub async fn set<T: Serialize + ?Sized>(&self, key: &CacheKey, value: &T, ttl: Duration) {
        let Some(store) = self.store.as_ref() else {
            return;
        };

        let json = match serde_json::to_string(value) {
            Ok(json) => json,
            Err(e) => {
                let error = CacheError::Serialization {
                    key: key.to_string(),
                    reason: e.to_string(),
                };
                self.sink.record(DiagnosticEvent::CacheStoreFailed {
                    operation: "encode",
                    key: key.to_string(),
                    reason: error.to_string(),
                });
                return;
            }
        };
        if json.is_empty() || json == "null" {
            return;
        }

        match store.setex(key.as_str(), ttl, &json).await {
            Ok(()) => CacheCounters::incr(&self.counters.writes),
            Err(e) => self.store_failed("setex", key, &e),
        }
    }

    /// [`set`](Self::set) with the configured default TTL.
    pub async fn set_default<T: Serialize + ?Sized>(&self, key: &CacheKey, value: &T) {
        self.set(key, value, self.default_ttl).await;
    }

    /// Delete one entry.
    pub async fn invalidate(&self, key: &CacheKey) {
        self.invalidate_batch(std::slice::from_ref(key)).await;
    }

    /// Delete several entries with a single store command.
    pub async fn invalidate_batch(&self, keys: &[CacheKey]) {
        let Some(store) = self.store.as_ref() else {
            return;
        };
        if keys.is_empty() {
            return;
        }

        let raw: Vec<&str> = keys.iter().map(CacheKey::as_str).collect();
        if let Err(e) = store.del(&raw).await {
            self.store_failed("del", &keys[0], &e);
        }
    }

    /// Return the cached value, or compute, store and return it.
    ///
    /// Errors from `compute` are passed through and nothing is stored.
    pub async fn get_or_compute<T, E, F, Fut>(
        &self,
        key: &CacheKey,
        ttl: Duration,
        compute: F,
    ) -> Result<T, E>
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        if let Some(cached) = self.get::<T>(key).await {
            return Ok(cached);
        }
        let value = compute().await?;
        self.set(key, &value, ttl).await;
        Ok(value)
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            hits: self.counters.hits.load(Ordering::Relaxed),
            misses: self.counters.misses.load(Ordering::Relaxed),
            writes: self.counters.writes.load(Ordering::Relaxed),
            store_errors: self.counters.store_errors.load(Ordering::Relaxed),
            healed: self.counters.healed.load(Ordering::Relaxed),
        }
    }

    async fn heal(&self, store: &dyn KvStore, key: &CacheKey, reason: String) {
        CacheCounters::incr(&self.counters.healed);
        if let Err(e) = store.del(&[key.as_str()]).await {
            self.store_failed("del", key, &e);
        }
        self.sink.record(DiagnosticEvent::CacheEntryHealed {
            key: key.to_string(),
            reason,
        });
    }

    fn store_failed(&self, operation: &'static str, key: &CacheKey, error: &CacheError) {
        CacheCounters::incr(&self.counters.store_errors);
        self.sink.record(DiagnosticEvent::CacheStoreFailed {
            operation,
            key: key.to_string(),
            reason: error.to_string(),
        });
    }
}
