//! Praxis Test Utilities
//!
//! Shared test infrastructure for the Praxis workspace:
//! - Scripted backend operations for driving the query runner
//! - A call-counting key-value store that can simulate an outage
//! - A diagnostics sink that records every event
//! - Proptest generators and fixtures

pub use praxis_core::{
    CacheConfig, CacheError, DiagnosticEvent, DiagnosticSink, LimiterConfig, RetryConfig,
    ThrottleConfig,
};
pub use praxis_query::{
    BackendError, QueryOptions, QueryOutcome, RateLimitClassifier, RateLimitedQueryRunner,
    ThrottleTracker, DEFAULT_THROTTLE_PHRASES,
};
pub use praxis_storage::{CacheKey, InMemoryKvStore, KvStore, ReadThroughCache};

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use tokio::time::Instant;

// ============================================================================
// SCRIPTED OPERATIONS
// ============================================================================

/// Backend operation that replays a fixed script of results.
///
/// Once the script is used up every further call returns `then`. Calls are
/// counted and timestamped on tokio's clock.
#[derive(Debug)]
pub struct ScriptedOperation<T, E> {
    script: Mutex<VecDeque<Result<T, E>>>,
    then: Result<T, E>,
    calls: AtomicUsize,
    call_times: Mutex<Vec<Instant>>,
}

impl<T: Clone, E: Clone> ScriptedOperation<T, E> {
    pub fn new(script: impl IntoIterator<Item = Result<T, E>>, then: Result<T, E>) -> Self {
        Self {
            script: Mutex::new(script.into_iter().collect()),
            then,
            calls: AtomicUsize::new(0),
            call_times: Mutex::new(Vec::new()),
        }
    }

    /// Every call returns `result`.
    pub fn always(result: Result<T, E>) -> Self {
        Self::new(Vec::new(), result)
    }

    /// Fail `failures` times with `error`, then succeed with `value`.
    pub fn fail_then_succeed(failures: usize, error: E, value: T) -> Self {
        Self::new(
            std::iter::repeat(Err(error)).take(failures),
            Ok(value),
        )
    }

    pub async fn call(&self) -> Result<T, E> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.call_times
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(Instant::now());
        self.script
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .pop_front()
            .unwrap_or_else(|| self.then.clone())
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn call_times(&self) -> Vec<Instant> {
        self.call_times
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

// ============================================================================
// RECORDING STORE
// ============================================================================

/// [`KvStore`] over an [`InMemoryKvStore`] that counts commands.
///
/// [`fail_all`](Self::fail_all) makes every command return
/// [`CacheError::Unavailable`] while still being counted;
/// [`fail_deletes`](Self::fail_deletes) and
/// [`fail_expires`](Self::fail_expires) do the same for a single command.
#[derive(Debug, Default)]
pub struct RecordingKvStore {
    inner: InMemoryKvStore,
    gets: AtomicUsize,
    setexes: AtomicUsize,
    dels: AtomicUsize,
    incrs: AtomicUsize,
    expires: AtomicUsize,
    ttls: AtomicUsize,
    deleted: Mutex<Vec<String>>,
    failing: AtomicBool,
    failing_deletes: AtomicBool,
    failing_expires: AtomicBool,
}

impl RecordingKvStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_all(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    pub fn fail_deletes(&self, failing: bool) {
        self.failing_deletes.store(failing, Ordering::SeqCst);
    }

    pub fn fail_expires(&self, failing: bool) {
        self.failing_expires.store(failing, Ordering::SeqCst);
    }

    /// Write a raw value without counting it.
    pub async fn seed(&self, key: &str, value: &str) {
        let _ = self.inner.setex(key, Duration::from_secs(3600), value).await;
    }

    /// Read a raw value without counting it.
    pub async fn raw(&self, key: &str) -> Option<String> {
        self.inner.get(key).await.ok().flatten()
    }

    pub fn get_calls(&self) -> usize {
        self.gets.load(Ordering::SeqCst)
    }

    pub fn setex_calls(&self) -> usize {
        self.setexes.load(Ordering::SeqCst)
    }

    pub fn del_calls(&self) -> usize {
        self.dels.load(Ordering::SeqCst)
    }

    pub fn incr_calls(&self) -> usize {
        self.incrs.load(Ordering::SeqCst)
    }

    pub fn expire_calls(&self) -> usize {
        self.expires.load(Ordering::SeqCst)
    }

    pub fn ttl_calls(&self) -> usize {
        self.ttls.load(Ordering::SeqCst)
    }

    pub fn total_calls(&self) -> usize {
        self.get_calls()
            + self.setex_calls()
            + self.del_calls()
            + self.incr_calls()
            + self.expire_calls()
            + self.ttl_calls()
    }

    /// Keys passed to `del`, in call order.
    pub fn deleted_keys(&self) -> Vec<String> {
        self.deleted
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn enter(&self, counter: &AtomicUsize) -> Result<(), CacheError> {
        counter.fetch_add(1, Ordering::SeqCst);
        if self.failing.load(Ordering::SeqCst) {
            Err(CacheError::Unavailable {
                reason: "simulated outage".to_string(),
            })
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl KvStore for RecordingKvStore {
    async fn get(&self, key: &str) -> Result<Option<String>, CacheError> {
        self.enter(&self.gets)?;
        self.inner.get(key).await
    }

    async fn setex(&self, key: &str, ttl: Duration, value: &str) -> Result<(), CacheError> {
        self.enter(&self.setexes)?;
        self.inner.setex(key, ttl, value).await
    }

    async fn del(&self, keys: &[&str]) -> Result<u64, CacheError> {
        self.deleted
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .extend(keys.iter().map(|k| k.to_string()));
        self.enter(&self.dels)?;
        if self.failing_deletes.load(Ordering::SeqCst) {
            return Err(CacheError::CommandFailed {
                command: "DEL".to_string(),
                reason: "simulated failure".to_string(),
            });
        }
        self.inner.del(keys).await
    }

    async fn incr(&self, key: &str) -> Result<i64, CacheError> {
        self.enter(&self.incrs)?;
        self.inner.incr(key).await
    }

    async fn expire(&self, key: &str, ttl: Duration) -> Result<bool, CacheError> {
        self.enter(&self.expires)?;
        if self.failing_expires.load(Ordering::SeqCst) {
            return Err(CacheError::CommandFailed {
                command: "EXPIRE".to_string(),
                reason: "simulated failure".to_string(),
            });
        }
        self.inner.expire(key, ttl).await
    }

    async fn ttl(&self, key: &str) -> Result<Option<Duration>, CacheError> {
        self.enter(&self.ttls)?;
        self.inner.ttl(key).await
    }

    fn backend_name(&self) -> &'static str {
        "recording"
    }
}

// ============================================================================
// RECORDING SINK
// ============================================================================

/// [`DiagnosticSink`] that keeps every event.
#[derive(Debug, Default)]
pub struct RecordingSink {
    events: Mutex<Vec<DiagnosticEvent>>,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<DiagnosticEvent> {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Number of events with the given [`DiagnosticEvent::name`].
    pub fn count(&self, name: &str) -> usize {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .filter(|e| e.name() == name)
            .count()
    }

    pub fn clear(&self) {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }
}

impl DiagnosticSink for RecordingSink {
    fn record(&self, event: DiagnosticEvent) {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(event);
    }
}

// ============================================================================
// PROPTEST GENERATORS
// ============================================================================

pub mod generators {
    //! Proptest strategies for Praxis types.

    use super::*;
    use proptest::prelude::*;
    use serde_json::Value;

    /// Any non-null JSON value without floats.
    pub fn arb_json_payload() -> impl Strategy<Value = Value> {
        let leaf = prop_oneof![
            any::<bool>().prop_map(Value::from),
            any::<i64>().prop_map(Value::from),
            "[a-zA-Z0-9 äöüß.,-]{0,24}".prop_map(Value::from),
        ];
        leaf.prop_recursive(3, 32, 6, |inner| {
            prop_oneof![
                prop::collection::vec(inner.clone(), 0..6).prop_map(Value::Array),
                prop::collection::btree_map("[a-z_]{1,8}", inner, 0..6)
                    .prop_map(|m| Value::Object(m.into_iter().collect())),
            ]
        })
    }

    /// Error message containing one of the default throttle phrases, in
    /// random case, with surrounding noise.
    pub fn arb_throttle_message() -> impl Strategy<Value = String> {
        (
            "[a-z ]{0,12}",
            prop::sample::select(DEFAULT_THROTTLE_PHRASES.to_vec()),
            any::<bool>(),
            "[a-z ]{0,12}",
        )
            .prop_map(|(before, phrase, upper, after)| {
                let phrase = if upper {
                    phrase.to_uppercase()
                } else {
                    phrase.to_string()
                };
                format!("{before}{phrase}{after}")
            })
    }

    /// Error message that none of the default throttle phrases match.
    pub fn arb_terminal_message() -> impl Strategy<Value = String> {
        let classifier = RateLimitClassifier::default();
        "[a-z]{1,8}( [a-z]{1,8}){0,4}"
            .prop_filter("must not look like throttling", move |m| {
                !classifier.matches_message(m)
            })
    }

    /// One valid cache key segment.
    pub fn arb_key_segment() -> impl Strategy<Value = String> {
        "[a-zA-Z0-9_.-]{1,24}"
    }

    pub fn arb_retry_config() -> impl Strategy<Value = RetryConfig> {
        (0u32..5, 1u64..2_000).prop_map(|(max_retries, initial_delay_ms)| RetryConfig {
            max_retries,
            initial_delay_ms,
        })
    }
}

// ============================================================================
// TEST FIXTURES
// ============================================================================

pub mod fixtures {
    //! Pre-built errors, runners and caches for common scenarios.

    use super::*;
    use std::sync::Arc;

    /// HTTP 429 from the backend.
    pub fn too_many_requests() -> BackendError {
        BackendError::from_http(429, "")
    }

    /// A throttle page served where JSON was expected.
    pub fn plain_text_throttle() -> BackendError {
        BackendError::from_http(200, "Too Many Requests")
    }

    /// A query error whose message mentions the rate limit.
    pub fn rate_limit_message() -> BackendError {
        BackendError::Query {
            code: "PGRST000".to_string(),
            message: "rate limit exceeded for project".to_string(),
        }
    }

    /// A constraint violation; never retried.
    pub fn unique_violation() -> BackendError {
        BackendError::from_http(
            409,
            r#"{"code":"23505","message":"duplicate key value violates unique constraint"}"#,
        )
    }

    /// Throttle config that never pauses a test.
    pub fn relaxed_throttle() -> ThrottleConfig {
        ThrottleConfig {
            window_ms: 1_000,
            ceiling: usize::MAX,
            pause_ms: 100,
        }
    }

    /// Runner with its own tracker and a recording sink.
    pub fn runner_with(throttle: ThrottleConfig) -> (RateLimitedQueryRunner, Arc<RecordingSink>) {
        let sink = Arc::new(RecordingSink::new());
        let runner = RateLimitedQueryRunner::new(Arc::new(ThrottleTracker::new(throttle)))
            .with_sink(sink.clone());
        (runner, sink)
    }

    /// Cache over a [`RecordingKvStore`] with a recording sink.
    pub fn recording_cache() -> (ReadThroughCache, Arc<RecordingKvStore>, Arc<RecordingSink>) {
        let store = Arc::new(RecordingKvStore::new());
        let sink = Arc::new(RecordingSink::new());
        let cache = ReadThroughCache::new(store.clone()).with_sink(sink.clone());
        (cache, store, sink)
    }

    pub fn practice_key(namespace: &str, practice_id: u64) -> CacheKey {
        match CacheKey::scoped(namespace, practice_id) {
            Ok(key) => key,
            Err(e) => panic!("fixture namespace {namespace:?} is invalid: {e}"),
        }
    }
}
