//! Fuzz test for cache key validation
//!
//! Any string accepted as a key must stay inside the key alphabet, so
//! personal data (e-mail addresses, names) can never reach the store.
//!
//! Run with: cargo +nightly fuzz run cache_key_fuzz -- -max_total_time=60

#![no_main]

use libfuzzer_sys::fuzz_target;
use praxis_storage::cache::{CacheKey, MAX_KEY_LEN};

fuzz_target!(|data: &[u8]| {
    if let Ok(input) = std::str::from_utf8(data) {
        if let Ok(key) = CacheKey::new(input) {
            let raw = key.as_str();
            assert_eq!(raw, input);
            assert!(raw.len() <= MAX_KEY_LEN);
            assert!(!raw.contains('@'));
            assert!(raw
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.' | ':')));
            assert!(raw.split(':').all(|segment| !segment.is_empty()));
        }

        // Segments never accept the separator.
        if let Ok(scoped) = CacheKey::scoped("fuzz", 1) {
            if let Ok(key) = scoped.with_segment(input) {
                assert_eq!(key.as_str().matches(':').count(), 3);
            }
        }
    }
});
