//! Property-Based Tests for the query runner
//!
//! - Attempts never exceed `max_retries + 1` and a call that is throttled
//!   `n` times succeeds exactly when `n <= max_retries`.
//! - Backoff delays are non-decreasing and double from the initial delay.
//! - Any message carrying a throttle phrase is retryable; others are not.

use std::time::Duration;

use praxis_query::{
    backoff_delay, backoff_schedule, worst_case_delay, BackendError, ErrorClass, QueryOptions,
    RateLimitClassifier,
};
use praxis_test_utils::fixtures::{relaxed_throttle, runner_with, too_many_requests};
use praxis_test_utils::generators::{arb_retry_config, arb_terminal_message, arb_throttle_message};
use praxis_test_utils::ScriptedOperation;
use proptest::prelude::*;

fn paused_runtime() -> tokio::runtime::Runtime {
    tokio::runtime::Builder::new_current_thread()
        .enable_time()
        .start_paused(true)
        .build()
        .expect("runtime")
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn prop_attempts_bounded_by_retry_budget(
        config in arb_retry_config(),
        throttled_times in 0usize..8,
    ) {
        let rt = paused_runtime();
        let (attempts, succeeded, waited) = rt.block_on(async {
            let (runner, _) = runner_with(relaxed_throttle());
            let op = ScriptedOperation::fail_then_succeed(throttled_times, too_many_requests(), 1u8);
            let outcome = runner
                .run(QueryOptions::from_config(&config, "prop"), || op.call())
                .await;
            (outcome.attempt_count(), outcome.is_success(), outcome.total_wait())
        });

        let budget = config.max_retries as usize;
        prop_assert_eq!(attempts, throttled_times.min(budget) + 1);
        prop_assert_eq!(succeeded, throttled_times <= budget);
        prop_assert!(waited <= worst_case_delay(config.initial_delay(), config.max_retries));
    }

    #[test]
    fn prop_backoff_doubles(initial_ms in 1u64..10_000, attempt in 1u32..20) {
        let initial = Duration::from_millis(initial_ms);
        let next = backoff_delay(initial, attempt + 1);
        prop_assert_eq!(next, backoff_delay(initial, attempt) * 2);
        prop_assert_eq!(backoff_delay(initial, 1), initial);
    }

    #[test]
    fn prop_schedule_non_decreasing(initial_ms in 0u64..10_000, retries in 0u32..40) {
        let delays: Vec<Duration> =
            backoff_schedule(Duration::from_millis(initial_ms), retries).collect();
        prop_assert_eq!(delays.len(), retries as usize + 1);
        prop_assert_eq!(delays[0], Duration::ZERO);
        prop_assert!(delays.windows(2).all(|w| w[0] <= w[1]));
    }

    #[test]
    fn prop_throttle_messages_are_retryable(message in arb_throttle_message()) {
        let error = BackendError::Query { code: "XX000".to_string(), message };
        prop_assert!(RateLimitClassifier::default().classify(&error).is_retryable());
    }

    #[test]
    fn prop_other_messages_are_terminal(message in arb_terminal_message()) {
        let error = BackendError::Status { status: 500, message };
        prop_assert_eq!(RateLimitClassifier::default().classify(&error), ErrorClass::Terminal);
    }
}
