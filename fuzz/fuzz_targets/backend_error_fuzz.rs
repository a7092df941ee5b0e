//! Fuzz test for backend error interpretation
//!
//! `BackendError::from_http` sees whatever the provider sends back, throttle
//! pages included. It must never panic, and classification must agree with
//! the explicit signals it extracted.
//!
//! Run with: cargo +nightly fuzz run backend_error_fuzz -- -max_total_time=60

#![no_main]

use libfuzzer_sys::fuzz_target;
use praxis_query::{BackendError, ErrorClass, ProviderError, RateLimitClassifier, RetryReason};

fuzz_target!(|data: &[u8]| {
    if data.len() < 2 {
        return;
    }
    let status = u16::from_be_bytes([data[0], data[1]]);
    let body = String::from_utf8_lossy(&data[2..]);

    let error = BackendError::from_http(status, &body);
    let class = RateLimitClassifier::default().classify(&error);

    if status == 429 {
        assert_eq!(class, ErrorClass::RateLimited(RetryReason::TooManyRequests));
    } else if error.is_malformed_response() {
        assert_eq!(class, ErrorClass::RateLimited(RetryReason::MalformedResponse));
    }
    if let BackendError::MalformedResponse { snippet } = &error {
        assert!(snippet.chars().count() <= 123);
    }
    let _ = error.to_string();
});
