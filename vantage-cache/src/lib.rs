//! Vantage Cache - Read-Through Cache Coordinator
//!
//! Serves owner-scoped collections from a cache store and falls back to the
//! source of truth on a miss, writing the fresh snapshot back.
//!
//! # Guarantees
//!
//! - A cache failure never fails a read. Store errors and malformed entries
//!   degrade to a source fetch; [`ReadThroughCache::fetch_collection`] can only
//!   return a [`SourceError`](vantage_core::SourceError).
//! - Nothing is cached when the source fails.
//! - Every store expires entries, so a missed invalidation is bounded by the TTL.
//! - Reads carry their provenance in [`CacheRead`].
//!
//! # Example
//!
//! ```ignore
//! let store = open_store(&CacheSettings::from_env()?).await?;
//! let cache = ReadThroughCache::new(store);
//!
//! let read = cache.fetch_owned::<Dashboard, _>(&owner, &source).await?;
//! if read.origin().is_degraded() {
//!     tracing::info!("cache degraded, served from source");
//! }
//!
//! // After a mutation has committed:
//! cache.invalidate(&Dashboard::cache_key(owner)).await;
//! ```

pub mod codec;
pub mod lmdb_backend;
pub mod memory;
pub mod read;
pub mod read_through;
#[cfg(feature = "redis")]
pub mod redis_backend;
pub mod store;
pub mod traits;

pub use lmdb_backend::{LmdbCacheError, LmdbCacheStore};
pub use memory::InMemoryCacheStore;
pub use read::{CacheRead, ReadOrigin};
pub use read_through::{read_through, Lookup, ReadThroughCache, Resolved, WriteOutcome};
#[cfg(feature = "redis")]
pub use redis_backend::RedisCacheStore;
pub use store::open_store;
pub use traits::{CacheEntry, CacheStats, CacheStore, CacheableRecord, SourceOfTruth};
