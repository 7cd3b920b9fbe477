//! Process-local cache store backed by `DashMap`.
//!
//! Entries expire on a monotonic clock. Expired entries read as absent and are
//! dropped on access; [`InMemoryCacheStore::purge_expired`] sweeps the rest.

use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use vantage_core::{validate_ttl, CacheError, CacheKey, ConfigError};

use crate::traits::{CacheEntry, CacheStats, CacheStore, StatsCounters};

/// A stored entry with its expiry deadline.
#[derive(Clone, Debug)]
struct StoredEntry {
    payload: Arc<Vec<u8>>,
    cached_at: DateTime<Utc>,
    expires_at: Instant,
}

impl StoredEntry {
    fn is_expired(&self, now: Instant) -> bool {
        now >= self.expires_at
    }
}

/// In-memory cache store.
///
/// Not shared between processes; use it for single-instance deployments and
/// tests. Cloning shares the underlying map.
#[derive(Clone)]
pub struct InMemoryCacheStore {
    entries: Arc<DashMap<String, StoredEntry>>,
    ttl: Duration,
    counters: Arc<StatsCounters>,
}

impl InMemoryCacheStore {
    /// Create a store whose entries live for `ttl`. A zero TTL is rejected.
    pub fn new(ttl: Duration) -> Result<Self, ConfigError> {
        validate_ttl(ttl)?;
        Ok(Self {
            entries: Arc::new(DashMap::new()),
            ttl,
            counters: Arc::new(StatsCounters::default()),
        })
    }

    /// Number of entries currently held, including expired ones not yet swept.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Remove every expired entry. Returns how many were removed.
    pub fn purge_expired(&self) -> u64 {
        let now = Instant::now();
        let before = self.entries.len();
        self.entries.retain(|_, entry| !entry.is_expired(now));
        let removed = before.saturating_sub(self.entries.len()) as u64;
        if removed > 0 {
            self.counters.record_evictions(removed);
            tracing::debug!(removed, "purged expired cache entries");
        }
        removed
    }
}

#[async_trait]
impl CacheStore for InMemoryCacheStore {
    async fn get(&self, key: &CacheKey) -> Result<Option<CacheEntry>, CacheError> {
        let now = Instant::now();
        let found = self.entries.get(key.as_str()).map(|entry| entry.value().clone());

        match found {
            Some(entry) if !entry.is_expired(now) => {
                self.counters.record_hit();
                Ok(Some(CacheEntry::new(
                    entry.payload.as_ref().clone(),
                    entry.cached_at,
                )))
            }
            Some(_) => {
                // Only remove the entry we saw expire, not a fresh overwrite.
                if self
                    .entries
                    .remove_if(key.as_str(), |_, entry| entry.is_expired(now))
                    .is_some()
                {
                    self.counters.record_evictions(1);
                }
                self.counters.record_miss();
                Ok(None)
            }
            None => {
                self.counters.record_miss();
                Ok(None)
            }
        }
    }

    async fn set(&self, key: &CacheKey, payload: Vec<u8>) -> Result<(), CacheError> {
        let expires_at = Instant::now().checked_add(self.ttl).ok_or_else(|| {
            CacheError::transaction(format!("entry deadline overflows for ttl {:?}", self.ttl))
        })?;
        let entry = StoredEntry {
            payload: Arc::new(payload),
            cached_at: Utc::now(),
            expires_at,
        };
        self.entries.insert(key.as_str().to_string(), entry);
        tracing::debug!(key = %key, ttl_secs = self.ttl.as_secs(), "cache set (memory)");
        Ok(())
    }

    async fn delete(&self, key: &CacheKey) -> Result<bool, CacheError> {
        let removed = self.entries.remove(key.as_str()).is_some();
        tracing::debug!(key = %key, removed, "cache delete (memory)");
        Ok(removed)
    }

    async fn stats(&self) -> Result<CacheStats, CacheError> {
        let memory_bytes = self
            .entries
            .iter()
            .map(|entry| entry.payload.len() as u64)
            .sum();
        Ok(self
            .counters
            .snapshot(self.entries.len() as u64, memory_bytes))
    }

    fn ttl(&self) -> Duration {
        self.ttl
    }
}
