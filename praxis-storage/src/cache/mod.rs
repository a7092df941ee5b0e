//! JSON read-through cache over a hosted key-value store.
//!
//! The store is reached through the [`KvStore`] trait. [`RestKvStore`] speaks
//! the hosted store's REST protocol, [`InMemoryKvStore`] keeps everything in
//! process. Keys are [`CacheKey`] values, which can only be built from
//! validated segments.
//!
//! # Example
//!
//! ```ignore
//! let cache = ReadThroughCache::from_config(&config.cache, Arc::new(TracingSink));
//! let key = CacheKey::scoped("badges", practice_id)?;
//!
//! let badges: Vec<Badge> = cache
//!     .get_or_compute(&key, Duration::from_secs(300), || load_badges(practice_id))
//!     .await?;
//!
//! // after a write
//! cache.invalidate(&key).await;
//! ```

pub mod key;
pub mod memory_backend;
pub mod read_through;
pub mod rest_backend;
pub mod traits;

pub use key::{CacheKey, KEY_PREFIX, MAX_KEY_LEN};
pub use memory_backend::InMemoryKvStore;
pub use read_through::{CacheMode, ReadThroughCache};
pub use rest_backend::RestKvStore;
pub use traits::{CacheStats, KvStore};
