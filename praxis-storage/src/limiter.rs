//! Fixed-window request limiting on the shared key-value store.
//!
//! Counters live under `limit:{subject}` and expire with the window; blocks
//! live under `blocked:{subject}`. A counter that could not be given its
//! window is dropped or, once found on a denial, restarted, so a subject is
//! never locked out for good. The limiter fails open: without a store,
//! or when the store errors, requests are allowed and the failure is
//! reported to the diagnostics hook.

use std::sync::Arc;
use std::time::Duration;

use praxis_core::{CacheError, DiagnosticEvent, DiagnosticSink, LimiterConfig, TracingSink};

use crate::cache::{CacheKey, KvStore, ReadThroughCache};

const COUNTER_PREFIX: &str = "limit";
const BLOCK_PREFIX: &str = "blocked";

/// Result of one [`FixedWindowLimiter::check`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LimitDecision {
    pub allowed: bool,
    /// Requests left in the current window.
    pub remaining: u32,
}

impl LimitDecision {
    fn open(config: &LimiterConfig) -> Self {
        Self {
            allowed: true,
            remaining: config.max_requests,
        }
    }
}

#[derive(Clone)]
pub struct FixedWindowLimiter {
    store: Option<Arc<dyn KvStore>>,
    config: LimiterConfig,
    sink: Arc<dyn DiagnosticSink>,
}

impl std::fmt::Debug for FixedWindowLimiter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FixedWindowLimiter")
            .field("enabled", &self.store.is_some())
            .field("config", &self.config)
            .finish()
    }
}

impl FixedWindowLimiter {
    pub fn new(store: Option<Arc<dyn KvStore>>, config: LimiterConfig) -> Self {
        Self {
            store,
            config,
            sink: Arc::new(TracingSink),
        }
    }

    /// Limiter sharing the cache's store and diagnostics sink.
    pub fn from_cache(cache: &ReadThroughCache, config: LimiterConfig) -> Self {
        Self {
            store: cache.store().cloned(),
            config,
            sink: cache.sink().clone(),
        }
    }

    pub fn with_sink(mut self, sink: Arc<dyn DiagnosticSink>) -> Self {
        self.sink = sink;
        self
    }

    pub fn config(&self) -> &LimiterConfig {
        &self.config
    }

    /// Count one request for `subject` and decide whether it may proceed.
    pub async fn check(&self, subject: &CacheKey) -> LimitDecision {
        let Some(store) = self.store.as_ref() else {
            return LimitDecision::open(&self.config);
        };
        let key = format!("{COUNTER_PREFIX}:{subject}");

        let count = match store.incr(&key).await {
            Ok(count) => count,
            Err(e) => {
                self.fail_open(subject, &e);
                return LimitDecision::open(&self.config);
            }
        };
        // A counter without a TTL would never reset, so one that cannot be
        // given its window is dropped and the request let through.
        if count == 1 {
            if let Err(e) = store.expire(&key, self.config.window()).await {
                self.fail_open(subject, &e);
                if let Err(e) = store.del(&[key.as_str()]).await {
                    self.fail_open(subject, &e);
                }
                return LimitDecision::open(&self.config);
            }
        }

        let max = i64::from(self.config.max_requests);
        let count = if count > max {
            self.restart_stale(&**store, subject, &key).await.unwrap_or(count)
        } else {
            count
        };
        let remaining = u32::try_from(max.saturating_sub(count).max(0)).unwrap_or(0);
        LimitDecision {
            allowed: count <= max,
            remaining,
        }
    }

    /// Block `subject` for `duration`. Returns whether the block was stored.
    pub async fn block(&self, subject: &CacheKey, duration: Duration) -> bool {
        let Some(store) = self.store.as_ref() else {
            return false;
        };
        let key = format!("{BLOCK_PREFIX}:{subject}");
        match store.setex(&key, duration, "true").await {
            Ok(()) => {
                tracing::info!(
                    subject = %subject,
                    duration_secs = duration.as_secs(),
                    "Subject blocked"
                );
                true
            }
            Err(e) => {
                self.fail_open(subject, &e);
                false
            }
        }
    }

    /// Block `subject` for the configured block duration.
    pub async fn block_default(&self, subject: &CacheKey) -> bool {
        self.block(subject, self.config.block_duration()).await
    }

    pub async fn is_blocked(&self, subject: &CacheKey) -> bool {
        let Some(store) = self.store.as_ref() else {
            return false;
        };
        let key = format!("{BLOCK_PREFIX}:{subject}");
        match store.get(&key).await {
            Ok(value) => value.is_some(),
            Err(e) => {
                self.fail_open(subject, &e);
                false
            }
        }
    }

    /// Restart a counter that was left without a window. Returns the new
    /// count when it was restarted.
    async fn restart_stale(
        &self,
        store: &dyn KvStore,
        subject: &CacheKey,
        key: &str,
    ) -> Option<i64> {
        match store.ttl(key).await {
            Ok(Some(_)) => None,
            Ok(None) => match store.setex(key, self.config.window(), "1").await {
                Ok(()) => {
                    tracing::warn!(subject = %subject, "Restarted limiter counter without expiry");
                    Some(1)
                }
                Err(e) => {
                    self.fail_open(subject, &e);
                    None
                }
            },
            Err(e) => {
                self.fail_open(subject, &e);
                None
            }
        }
    }

    fn fail_open(&self, subject: &CacheKey, error: &CacheError) {
        self.sink.record(DiagnosticEvent::LimiterFailOpen {
            subject: subject.to_string(),
            reason: error.to_string(),
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::InMemoryKvStore;
    use praxis_core::NoopSink;

    fn limiter(max_requests: u32) -> FixedWindowLimiter {
        let store: Arc<dyn KvStore> = Arc::new(InMemoryKvStore::new());
        FixedWindowLimiter::new(
            Some(store),
            LimiterConfig {
                max_requests,
                window_secs: 60,
                block_secs: 3600,
            },
        )
        .with_sink(Arc::new(NoopSink))
    }

    fn subject() -> CacheKey {
        CacheKey::new("upload:client:5d41402a").unwrap()
    }

    #[tokio::test(start_paused = true)]
    async fn test_allows_up_to_max_then_denies() {
        let limiter = limiter(2);
        assert_eq!(
            limiter.check(&subject()).await,
            LimitDecision {
                allowed: true,
                remaining: 1
            }
        );
        assert!(limiter.check(&subject()).await.allowed);
        let third = limiter.check(&subject()).await;
        assert!(!third.allowed);
        assert_eq!(third.remaining, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_window_resets() {
        let limiter = limiter(1);
        assert!(limiter.check(&subject()).await.allowed);
        assert!(!limiter.check(&subject()).await.allowed);

        tokio::time::advance(Duration::from_secs(60)).await;
        assert!(limiter.check(&subject()).await.allowed);
    }

    #[tokio::test(start_paused = true)]
    async fn test_block_expires() {
        let limiter = limiter(1);
        assert!(!limiter.is_blocked(&subject()).await);
        assert!(limiter.block(&subject(), Duration::from_secs(10)).await);
        assert!(limiter.is_blocked(&subject()).await);

        tokio::time::advance(Duration::from_secs(10)).await;
        assert!(!limiter.is_blocked(&subject()).await);
    }

    #[tokio::test]
    async fn test_without_store_fails_open() {
        let limiter = FixedWindowLimiter::new(None, LimiterConfig::default());
        for _ in 0..100 {
            assert!(limiter.check(&subject()).await.allowed);
        }
        assert!(!limiter.block_default(&subject()).await);
        assert!(!limiter.is_blocked(&subject()).await);
    }
}
