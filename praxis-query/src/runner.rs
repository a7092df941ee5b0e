//! Rate-limit aware query runner.
//!
//! [`RateLimitedQueryRunner::run`] executes a backend operation, retries it
//! with exponential backoff while the provider signals throttling, and hands
//! back a configured fallback instead of an error once the retries are used
//! up. Any other failure is returned on the first attempt, untouched.
//!
//! # Example
//!
//! ```ignore
//! let runner = RateLimitedQueryRunner::new(Arc::new(ThrottleTracker::default()));
//!
//! let outcome = runner
//!     .run(
//!         QueryOptions::new("sidebar badges").with_fallback(Vec::new()),
//!         || backend.select("todos", practice_id),
//!     )
//!     .await;
//!
//! if outcome.is_degraded() {
//!     tracing::warn!("serving empty badge list");
//! }
//! let todos = outcome.data_or_default();
//! ```

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use praxis_core::{DiagnosticEvent, DiagnosticSink, RetryConfig, ThrottleConfig, TracingSink};
use thiserror::Error;

use crate::backoff::backoff_delay;
use crate::classify::{ErrorClass, ProviderError, RateLimitClassifier, RetryReason};
use crate::metrics::RunnerMetrics;
use crate::throttle::{ThrottleDecision, ThrottleTracker};

// ============================================================================
// OPTIONS
// ============================================================================

/// Per-call options.
#[derive(Debug, Clone)]
pub struct QueryOptions<T> {
    /// Retries after the first attempt.
    pub max_retries: u32,
    /// Delay before the first retry; doubled for each further retry.
    pub initial_delay: Duration,
    /// Value served when the provider stays rate limited.
    pub fallback: Option<T>,
    /// Label used in diagnostics and in the exhaustion error.
    pub context: String,
}

impl<T> Default for QueryOptions<T> {
    fn default() -> Self {
        Self::from_config(&RetryConfig::default(), "query")
    }
}

impl<T> QueryOptions<T> {
    /// Default retry policy with the given context label.
    pub fn new(context: impl Into<String>) -> Self {
        Self::from_config(&RetryConfig::default(), context)
    }

    pub fn from_config(config: &RetryConfig, context: impl Into<String>) -> Self {
        Self {
            max_retries: config.max_retries,
            initial_delay: config.initial_delay(),
            fallback: None,
            context: context.into(),
        }
    }

    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    pub fn with_initial_delay(mut self, initial_delay: Duration) -> Self {
        self.initial_delay = initial_delay;
        self
    }

    pub fn with_fallback(mut self, fallback: T) -> Self {
        self.fallback = Some(fallback);
        self
    }
}

// ============================================================================
// OUTCOME
// ============================================================================

/// How a single attempt ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttemptOutcome {
    Success,
    Retryable(RetryReason),
    Terminal,
}

/// One execution of the wrapped operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QueryAttempt {
    /// 0-based attempt index.
    pub index: u32,
    /// Backoff waited before this attempt.
    pub delay: Duration,
    /// Self-throttle pause waited before this attempt.
    pub throttle_wait: Duration,
    pub outcome: AttemptOutcome,
}

/// Why a call did not produce fresh data.
#[derive(Debug, Error)]
pub enum QueryFailure<E: ProviderError> {
    /// Non-retryable error from the operation, unchanged.
    #[error(transparent)]
    Terminal(E),

    /// The provider kept rate limiting through every retry.
    #[error("Rate limited after {retries} retries: {context}")]
    RateLimited {
        context: String,
        retries: u32,
        #[source]
        source: E,
    },
}

impl<E: ProviderError> QueryFailure<E> {
    /// The error returned by the last attempt.
    pub fn provider_error(&self) -> &E {
        match self {
            Self::Terminal(e) => e,
            Self::RateLimited { source, .. } => source,
        }
    }

    pub fn into_provider_error(self) -> E {
        match self {
            Self::Terminal(e) => e,
            Self::RateLimited { source, .. } => source,
        }
    }

    pub fn is_rate_limited(&self) -> bool {
        matches!(self, Self::RateLimited { .. })
    }
}

/// Result of [`RateLimitedQueryRunner::run`].
///
/// Mirrors the `{ data, error }` pair of the wrapped call:
///
/// | case                 | `data`          | `error`                |
/// |----------------------|-----------------|------------------------|
/// | success              | `Some(value)`   | `None`                 |
/// | terminal failure     | `None`          | `Some(Terminal)`       |
/// | retries exhausted    | the fallback    | `Some(RateLimited)`    |
#[derive(Debug)]
pub struct QueryOutcome<T, E: ProviderError> {
    pub data: Option<T>,
    pub error: Option<QueryFailure<E>>,
    pub attempts: Vec<QueryAttempt>,
}

impl<T, E: ProviderError> QueryOutcome<T, E> {
    pub fn is_success(&self) -> bool {
        self.error.is_none()
    }

    /// True when the fallback was served because retries ran out.
    pub fn is_degraded(&self) -> bool {
        self.error
            .as_ref()
            .is_some_and(QueryFailure::is_rate_limited)
    }

    pub fn attempt_count(&self) -> usize {
        self.attempts.len()
    }

    /// Total time spent in backoff and throttle pauses.
    pub fn total_wait(&self) -> Duration {
        self.attempts
            .iter()
            .map(|a| a.delay.saturating_add(a.throttle_wait))
            .fold(Duration::ZERO, Duration::saturating_add)
    }

    pub fn into_parts(self) -> (Option<T>, Option<QueryFailure<E>>) {
        (self.data, self.error)
    }

    /// Treat every failure, degraded ones included, as an error.
    pub fn into_result(self) -> Result<Option<T>, QueryFailure<E>> {
        match self.error {
            Some(error) => Err(error),
            None => Ok(self.data),
        }
    }

    /// Whatever data is available, or `T::default()` (empty list, zero counts).
    pub fn data_or_default(self) -> T
    where
        T: Default,
    {
        self.data.unwrap_or_default()
    }
}

// ============================================================================
// RUNNER
// ============================================================================

/// Runs backend operations with rate-limit retry and self-throttling.
///
/// Cheap to clone; clones share the throttle tracker, the metrics and the
/// diagnostics sink.
#[derive(Clone)]
pub struct RateLimitedQueryRunner {
    throttle: Arc<ThrottleTracker>,
    classifier: RateLimitClassifier,
    sink: Arc<dyn DiagnosticSink>,
    metrics: Arc<RunnerMetrics>,
}

impl RateLimitedQueryRunner {
    /// Runner with the default classifier, reporting to `tracing`.
    pub fn new(throttle: Arc<ThrottleTracker>) -> Self {
        Self {
            throttle,
            classifier: RateLimitClassifier::default(),
            sink: Arc::new(TracingSink),
            metrics: Arc::new(RunnerMetrics::new()),
        }
    }

    /// Runner with its own tracker built from `config`.
    pub fn from_config(config: &ThrottleConfig) -> Self {
        Self::new(Arc::new(ThrottleTracker::new(*config)))
    }

    pub fn with_classifier(mut self, classifier: RateLimitClassifier) -> Self {
        self.classifier = classifier;
        self
    }

    pub fn with_sink(mut self, sink: Arc<dyn DiagnosticSink>) -> Self {
        self.sink = sink;
        self
    }

    pub fn throttle(&self) -> &Arc<ThrottleTracker> {
        &self.throttle
    }

    pub fn classifier(&self) -> &RateLimitClassifier {
        &self.classifier
    }

    pub fn metrics(&self) -> &RunnerMetrics {
        &self.metrics
    }

    /// Execute `operation` under the retry policy in `options`.
    ///
    /// Attempts run strictly one after another. Dropping the returned future
    /// abandons the call, including any pending backoff.
    pub async fn run<T, E, F, Fut>(
        &self,
        options: QueryOptions<T>,
        mut operation: F,
    ) -> QueryOutcome<T, E>
    where
        E: ProviderError,
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        let QueryOptions {
            max_retries,
            initial_delay,
            fallback,
            context,
        } = options;

        RunnerMetrics::incr(&self.metrics.calls);
        let mut attempts = Vec::with_capacity(max_retries.min(8) as usize + 1);
        let mut index: u32 = 0;

        loop {
            let delay = backoff_delay(initial_delay, index);
            if !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }

            let throttle_wait = self.self_throttle(&context).await;

            RunnerMetrics::incr(&self.metrics.attempts);
            let error = match operation().await {
                Ok(value) => {
                    attempts.push(QueryAttempt {
                        index,
                        delay,
                        throttle_wait,
                        outcome: AttemptOutcome::Success,
                    });
                    RunnerMetrics::incr(&self.metrics.succeeded);
                    return QueryOutcome {
                        data: Some(value),
                        error: None,
                        attempts,
                    };
                }
                Err(error) => error,
            };

            let reason = match self.classifier.classify(&error) {
                ErrorClass::Terminal => {
                    attempts.push(QueryAttempt {
                        index,
                        delay,
                        throttle_wait,
                        outcome: AttemptOutcome::Terminal,
                    });
                    RunnerMetrics::incr(&self.metrics.terminal);
                    return QueryOutcome {
                        data: None,
                        error: Some(QueryFailure::Terminal(error)),
                        attempts,
                    };
                }
                ErrorClass::RateLimited(reason) => reason,
            };

            attempts.push(QueryAttempt {
                index,
                delay,
                throttle_wait,
                outcome: AttemptOutcome::Retryable(reason),
            });

            if index >= max_retries {
                RunnerMetrics::incr(&self.metrics.exhausted);
                self.sink.record(DiagnosticEvent::QueryRetriesExhausted {
                    context: context.clone(),
                    retries: max_retries,
                });
                return QueryOutcome {
                    data: fallback,
                    error: Some(QueryFailure::RateLimited {
                        context,
                        retries: max_retries,
                        source: error,
                    }),
                    attempts,
                };
            }

            index += 1;
            RunnerMetrics::incr(&self.metrics.retries);
            self.sink.record(DiagnosticEvent::QueryRetryScheduled {
                context: context.clone(),
                attempt: index,
                delay: backoff_delay(initial_delay, index),
                reason: error.to_string(),
            });
        }
    }

    async fn self_throttle(&self, context: &str) -> Duration {
        match self.throttle.register_call() {
            ThrottleDecision::Proceed => Duration::ZERO,
            ThrottleDecision::Pause {
                recent_calls,
                pause,
            } => {
                RunnerMetrics::incr(&self.metrics.throttled);
                self.sink.record(DiagnosticEvent::QueryThrottled {
                    context: context.to_string(),
                    recent_calls,
                    pause,
                });
                tokio::time::sleep(pause).await;
                pause
            }
        }
    }
}

impl std::fmt::Debug for RateLimitedQueryRunner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RateLimitedQueryRunner")
            .field("throttle", &self.throttle)
            .field("classifier", &self.classifier)
            .field("metrics", &self.metrics.snapshot())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classify::BackendError;

    fn runner() -> RateLimitedQueryRunner {
        RateLimitedQueryRunner::from_config(&ThrottleConfig::default())
    }

    #[tokio::test(start_paused = true)]
    async fn test_success_on_first_attempt() {
        let outcome: QueryOutcome<u32, BackendError> = runner()
            .run(QueryOptions::new("count"), || async { Ok(7) })
            .await;
        assert!(outcome.is_success());
        assert_eq!(outcome.data, Some(7));
        assert_eq!(outcome.attempts.len(), 1);
        assert_eq!(outcome.attempts[0].outcome, AttemptOutcome::Success);
        assert_eq!(outcome.total_wait(), Duration::ZERO);
    }

    #[tokio::test(start_paused = true)]
    async fn test_unbounded_ceiling_from_config() {
        let config = ThrottleConfig {
            ceiling: usize::MAX,
            ..ThrottleConfig::default()
        };
        assert!(config.validate().is_ok());

        let runner = RateLimitedQueryRunner::from_config(&config);
        for _ in 0..20 {
            let outcome: QueryOutcome<u32, BackendError> = runner
                .run(QueryOptions::new("burst"), || async { Ok(1) })
                .await;
            assert_eq!(outcome.total_wait(), Duration::ZERO);
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_recovers_after_transient_rate_limit() {
        let mut calls = 0;
        let outcome = runner()
            .run(QueryOptions::new("tickets"), || {
                calls += 1;
                let attempt = calls;
                async move {
                    if attempt < 3 {
                        Err(BackendError::from_http(429, ""))
                    } else {
                        Ok("rows")
                    }
                }
            })
            .await;
        assert_eq!(outcome.data, Some("rows"));
        assert!(outcome.error.is_none());
        let delays: Vec<u128> = outcome.attempts.iter().map(|a| a.delay.as_millis()).collect();
        assert_eq!(delays, vec![0, 500, 1000]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_terminal_error_is_not_retried() {
        let mut calls = 0;
        let outcome: QueryOutcome<(), BackendError> = runner()
            .run(QueryOptions::new("todos").with_fallback(()), || {
                calls += 1;
                async { Err(BackendError::from_http(400, r#"{"message":"bad filter"}"#)) }
            })
            .await;
        assert_eq!(calls, 1);
        assert!(outcome.data.is_none());
        match outcome.error {
            Some(QueryFailure::Terminal(BackendError::Status { status, message })) => {
                assert_eq!(status, 400);
                assert_eq!(message, "bad filter");
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_metrics_track_outcomes() {
        let runner = runner();
        let _: QueryOutcome<(), BackendError> = runner
            .run(
                QueryOptions::new("a")
                    .with_max_retries(1)
                    .with_initial_delay(Duration::from_millis(10)),
                || async { Err(BackendError::from_http(429, "")) },
            )
            .await;
        let _: QueryOutcome<(), BackendError> =
            runner.run(QueryOptions::new("b"), || async { Ok(()) }).await;

        let snapshot = runner.metrics().snapshot();
        assert_eq!(snapshot.calls, 2);
        assert_eq!(snapshot.attempts, 3);
        assert_eq!(snapshot.retries, 1);
        assert_eq!(snapshot.exhausted, 1);
        assert_eq!(snapshot.succeeded, 1);
        assert_eq!(snapshot.terminal, 0);
    }

    #[test]
    fn test_options_from_config() {
        let options: QueryOptions<Vec<u8>> = QueryOptions::from_config(
            &RetryConfig {
                max_retries: 1,
                initial_delay_ms: 250,
            },
            "reviews",
        );
        assert_eq!(options.max_retries, 1);
        assert_eq!(options.initial_delay, Duration::from_millis(250));
        assert!(options.fallback.is_none());
        assert_eq!(options.context, "reviews");
    }

    #[test]
    fn test_failure_display() {
        let failure: QueryFailure<BackendError> = QueryFailure::RateLimited {
            context: "dashboard stats".to_string(),
            retries: 2,
            source: BackendError::from_http(429, ""),
        };
        assert_eq!(failure.to_string(), "Rate limited after 2 retries: dashboard stats");
        assert_eq!(failure.provider_error().status_code(), Some(429));

        let terminal: QueryFailure<BackendError> =
            QueryFailure::Terminal(BackendError::transport("connection reset"));
        assert_eq!(terminal.to_string(), "Backend request failed: connection reset");
    }
}
