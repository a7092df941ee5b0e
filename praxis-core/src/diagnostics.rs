//! Structured diagnostics hook.
//!
//! The runner and the cache absorb a number of failures on purpose (throttled
//! queries, unreachable cache store, corrupt entries). Instead of logging
//! them ad hoc, they report a [`DiagnosticEvent`] to a [`DiagnosticSink`]
//! supplied by the host application. [`TracingSink`] is the default and maps
//! every event onto a `tracing` event.

use std::time::Duration;

/// Something the data-access layer handled without surfacing it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DiagnosticEvent {
    /// A rate-limited query will be retried after `delay`.
    QueryRetryScheduled {
        context: String,
        attempt: u32,
        delay: Duration,
        reason: String,
    },
    /// The self-throttle paused a query before issuing it.
    QueryThrottled {
        context: String,
        recent_calls: usize,
        pause: Duration,
    },
    /// A query stayed rate limited through every retry; the fallback was served.
    QueryRetriesExhausted { context: String, retries: u32 },
    /// A cache store command failed and was absorbed.
    CacheStoreFailed {
        operation: &'static str,
        key: String,
        reason: String,
    },
    /// A stored entry could not be decoded and was deleted.
    CacheEntryHealed { key: String, reason: String },
    /// The cache was constructed without a store.
    CacheDisabled { reason: String },
    /// The request limiter could not reach the store and allowed the request.
    LimiterFailOpen { subject: String, reason: String },
}

impl DiagnosticEvent {
    /// Short stable name, handy for metrics labels.
    pub fn name(&self) -> &'static str {
        match self {
            Self::QueryRetryScheduled { .. } => "query_retry_scheduled",
            Self::QueryThrottled { .. } => "query_throttled",
            Self::QueryRetriesExhausted { .. } => "query_retries_exhausted",
            Self::CacheStoreFailed { .. } => "cache_store_failed",
            Self::CacheEntryHealed { .. } => "cache_entry_healed",
            Self::CacheDisabled { .. } => "cache_disabled",
            Self::LimiterFailOpen { .. } => "limiter_fail_open",
        }
    }
}

/// Receiver for diagnostics. Implementations must not block.
pub trait DiagnosticSink: Send + Sync {
    fn record(&self, event: DiagnosticEvent);
}

/// Default sink: forwards events to `tracing`.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingSink;

impl DiagnosticSink for TracingSink {
    fn record(&self, event: DiagnosticEvent) {
        match event {
            DiagnosticEvent::QueryRetryScheduled {
                context,
                attempt,
                delay,
                reason,
            } => tracing::debug!(
                context = %context,
                attempt,
                delay_ms = delay.as_millis() as u64,
                reason = %reason,
                "Rate limited query, retrying"
            ),
            DiagnosticEvent::QueryThrottled {
                context,
                recent_calls,
                pause,
            } => tracing::debug!(
                context = %context,
                recent_calls,
                pause_ms = pause.as_millis() as u64,
                "Self-throttling query"
            ),
            DiagnosticEvent::QueryRetriesExhausted { context, retries } => tracing::warn!(
                context = %context,
                retries,
                "Query still rate limited after retries, serving fallback"
            ),
            DiagnosticEvent::CacheStoreFailed {
                operation,
                key,
                reason,
            } => tracing::warn!(operation, key = %key, error = %reason, "Cache store command failed"),
            DiagnosticEvent::CacheEntryHealed { key, reason } => {
                tracing::warn!(key = %key, error = %reason, "Deleted undecodable cache entry")
            }
            DiagnosticEvent::CacheDisabled { reason } => {
                tracing::info!(reason = %reason, "Cache disabled")
            }
            DiagnosticEvent::LimiterFailOpen { subject, reason } => tracing::warn!(
                subject = %subject,
                error = %reason,
                "Request limiter unavailable, allowing request"
            ),
        }
    }
}

/// Sink that drops everything.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopSink;

impl DiagnosticSink for NoopSink {
    fn record(&self, _event: DiagnosticEvent) {}
}
