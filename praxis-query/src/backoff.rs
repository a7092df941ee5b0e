//! Exponential backoff schedule.
//!
//! Attempt 0 runs immediately; attempt `n >= 1` waits
//! `initial * 2^(n-1)`. There is no jitter; the multiplier saturates at
//! `u32::MAX` and the product at `Duration::MAX`.

use std::time::Duration;

/// Delay to wait before `attempt` (0-based).
pub fn backoff_delay(initial: Duration, attempt: u32) -> Duration {
    if attempt == 0 {
        return Duration::ZERO;
    }
    let factor = 2u32.checked_pow(attempt - 1).unwrap_or(u32::MAX);
    initial.checked_mul(factor).unwrap_or(Duration::MAX)
}

/// Delays for every attempt of a call allowed `max_retries` retries.
pub fn backoff_schedule(initial: Duration, max_retries: u32) -> impl Iterator<Item = Duration> {
    (0..=max_retries).map(move |attempt| backoff_delay(initial, attempt))
}

/// Sum of all backoff delays when every retry is used.
pub fn worst_case_delay(initial: Duration, max_retries: u32) -> Duration {
    backoff_schedule(initial, max_retries).fold(Duration::ZERO, Duration::saturating_add)
}
