//! Praxis Storage - caching and request limiting on the hosted key-value store
//!
//! - [`cache`]: [`ReadThroughCache`], which never fails its caller and falls
//!   back to a disabled mode when the store is not configured.
//! - [`limiter`]: [`FixedWindowLimiter`] for per-client request limits and
//!   temporary blocks, failing open when the store is unreachable.

pub mod cache;
pub mod limiter;

pub use cache::{
    CacheKey, CacheMode, CacheStats, InMemoryKvStore, KvStore, ReadThroughCache, RestKvStore,
};
pub use limiter::{FixedWindowLimiter, LimitDecision};
