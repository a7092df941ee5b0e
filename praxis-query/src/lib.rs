//! Praxis Query - rate-limit aware execution of backend queries
//!
//! The hosted backend answers bursts of dashboard traffic with HTTP 429s or,
//! worse, plain-text "Too Many Requests" bodies where JSON was expected.
//! This crate wraps each data-access call so that:
//!
//! - throttling is detected ([`RateLimitClassifier`]) and retried with
//!   exponential backoff ([`backoff`]),
//! - bursts are smoothed before they reach the provider ([`ThrottleTracker`]),
//! - callers get a fallback plus a labeled error instead of a hard failure
//!   once retries run out ([`QueryOutcome`]).

pub mod backoff;
pub mod classify;
pub mod metrics;
pub mod runner;
pub mod throttle;

pub use backoff::{backoff_delay, backoff_schedule, worst_case_delay};
pub use classify::{
    BackendError, ErrorClass, ProviderError, RateLimitClassifier, RetryReason,
    DEFAULT_THROTTLE_PHRASES,
};
pub use metrics::{RunnerMetrics, RunnerMetricsSnapshot};
pub use runner::{
    AttemptOutcome, QueryAttempt, QueryFailure, QueryOptions, QueryOutcome,
    RateLimitedQueryRunner,
};
pub use throttle::{ThrottleDecision, ThrottleTracker};
