//! Cache store and source-of-truth traits, and the cacheable record marker.
//!
//! The coordinator only ever talks to its collaborators through these traits,
//! so stores and sources can be swapped for test doubles.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{de::DeserializeOwned, Serialize};
use vantage_core::{CacheError, CacheKey, CollectionKind, OwnerId, SourceError};

/// Marker trait for record types whose owner-scoped lists can be cached.
///
/// # Implementation Requirements
///
/// - `collection_kind()` must return the same kind for every call
/// - Implementations must be `Clone`, `Serialize`, and `DeserializeOwned`;
///   snapshots are stored as JSON arrays
/// - Implementations must be `Send + Sync + 'static` for async compatibility
pub trait CacheableRecord: Clone + Serialize + DeserializeOwned + Send + Sync + 'static {
    /// Collection kind used in this record type's cache keys.
    fn collection_kind() -> CollectionKind;

    /// Key of the list of this record type owned by `owner`.
    fn cache_key(owner: OwnerId) -> CacheKey {
        CacheKey::new(Self::collection_kind(), owner)
    }
}

/// Raw entry as returned by a store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheEntry {
    /// Encoded snapshot. Not trusted until it decodes.
    pub payload: Vec<u8>,
    /// When the entry was written.
    pub cached_at: DateTime<Utc>,
}

impl CacheEntry {
    pub fn new(payload: Vec<u8>, cached_at: DateTime<Utc>) -> Self {
        Self { payload, cached_at }
    }
}

/// Volatile, TTL-bounded key-value store for encoded snapshots.
///
/// Expiry is owned by the store: every implementation applies its `ttl()` to
/// each write, and an expired entry must read as absent. Implementations are
/// shared between request tasks and must be safe for concurrent use.
#[async_trait]
pub trait CacheStore: Send + Sync {
    /// Read the entry for a key. `Ok(None)` means absent or expired.
    async fn get(&self, key: &CacheKey) -> Result<Option<CacheEntry>, CacheError>;

    /// Write an entry, replacing any previous one for the key.
    async fn set(&self, key: &CacheKey, payload: Vec<u8>) -> Result<(), CacheError>;

    /// Remove the entry for a key. Returns whether an entry existed.
    ///
    /// Deleting a missing key is not an error.
    async fn delete(&self, key: &CacheKey) -> Result<bool, CacheError>;

    /// Get cache statistics.
    async fn stats(&self) -> Result<CacheStats, CacheError>;

    /// Expiry applied to every entry written by this store.
    fn ttl(&self) -> Duration;
}

/// Authoritative provider of owner-scoped collections.
#[async_trait]
pub trait SourceOfTruth<T: Send>: Send + Sync {
    /// Fetch the canonical ordered collection for a key.
    async fn fetch(&self, key: &CacheKey) -> Result<Vec<T>, SourceError>;
}

#[async_trait]
impl<T, S> SourceOfTruth<T> for Arc<S>
where
    T: Send + 'static,
    S: SourceOfTruth<T> + ?Sized,
{
    async fn fetch(&self, key: &CacheKey) -> Result<Vec<T>, SourceError> {
        (**self).fetch(key).await
    }
}

/// Statistics about cache usage.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CacheStats {
    /// Number of cache hits.
    pub hits: u64,
    /// Number of cache misses (absent or expired).
    pub misses: u64,
    /// Number of entries currently in cache.
    pub entry_count: u64,
    /// Approximate size of stored payloads in bytes.
    pub memory_bytes: u64,
    /// Number of entries dropped because their TTL elapsed.
    pub evictions: u64,
}

impl CacheStats {
    /// Calculate the hit rate (0.0 to 1.0).
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}

/// Hit/miss/eviction counters shared by the store implementations.
#[derive(Debug, Default)]
pub(crate) struct StatsCounters {
    hits: AtomicU64,
    misses: AtomicU64,
    evictions: AtomicU64,
}

impl StatsCounters {
    pub(crate) fn record_hit(&self) {
        self.hits.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_miss(&self) {
        self.misses.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_evictions(&self, count: u64) {
        self.evictions.fetch_add(count, Ordering::Relaxed);
    }

    /// Snapshot the counters; entry count and size are filled by the store.
    pub(crate) fn snapshot(&self, entry_count: u64, memory_bytes: u64) -> CacheStats {
        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            entry_count,
            memory_bytes,
            evictions: self.evictions.load(Ordering::Relaxed),
        }
    }
}
