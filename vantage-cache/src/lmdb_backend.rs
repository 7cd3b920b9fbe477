//! LMDB-backed cache store.
//!
//! Uses the heed crate (Rust bindings for LMDB) to keep cached collections in
//! a memory-mapped file, so the cache survives process restarts on one host.
//!
//! # Layout
//!
//! - Key: the rendered cache key, optionally prefixed with a namespace
//! - Value: `[cached_at millis: 8 bytes LE][JSON snapshot]`
//!
//! LMDB has no native expiry. Entries older than the store TTL read as absent
//! and are deleted on access; [`LmdbCacheStore::purge_expired`] sweeps the
//! whole database.
//!
//! # Thread Safety
//!
//! LMDB provides ACID transactions. The store uses read transactions for
//! `get` and write transactions for `set`, `delete` and purges; no
//! transaction is held across an await point.

use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use heed::types::Bytes;
use heed::{Database, Env, EnvOpenOptions};
use vantage_core::{
    lmdb_map_size_bytes, validate_ttl, CacheError, CacheKey, ConfigError, VantageError,
};

use crate::codec::{decode_entry, encode_entry, HEADER_LEN};
use crate::traits::{CacheEntry, CacheStats, CacheStore, StatsCounters};

/// Failures opening or driving the LMDB store.
#[derive(Debug, thiserror::Error)]
pub enum LmdbCacheError {
    /// The environment could not be opened at the given path.
    #[error("LMDB environment open failed: {0}")]
    EnvOpen(String),

    /// The unnamed database could not be created.
    #[error("LMDB database open failed: {0}")]
    DbOpen(String),

    /// A read or write transaction failed.
    #[error("LMDB transaction failed: {0}")]
    Transaction(String),

    /// Invalid store settings.
    #[error("Invalid configuration: {0}")]
    Config(#[from] ConfigError),

    /// Creating the store directory failed.
    #[error("LMDB directory error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<LmdbCacheError> for CacheError {
    fn from(e: LmdbCacheError) -> Self {
        CacheError::Transaction {
            reason: e.to_string(),
        }
    }
}

impl From<LmdbCacheError> for VantageError {
    fn from(e: LmdbCacheError) -> Self {
        match e {
            LmdbCacheError::Config(config) => VantageError::Config(config),
            other => VantageError::Cache(other.into()),
        }
    }
}

fn txn_error(e: heed::Error) -> LmdbCacheError {
    LmdbCacheError::Transaction(e.to_string())
}

/// LMDB-backed cache store.
///
/// # Example
///
/// ```ignore
/// let store = LmdbCacheStore::open("/var/cache/vantage", 64, Duration::from_secs(300))?;
/// let cache = ReadThroughCache::new(Arc::new(store));
/// ```
pub struct LmdbCacheStore {
    /// The LMDB environment.
    env: Env,
    /// Unnamed database holding every entry.
    db: Database<Bytes, Bytes>,
    /// Expiry applied to every entry.
    ttl: Duration,
    /// Optional key prefix.
    namespace: Option<String>,
    /// Hit/miss/eviction counters.
    counters: StatsCounters,
}

impl LmdbCacheStore {
    /// Open the store in `path`, creating the directory and database on
    /// first use. `max_size_mb` bounds the memory map; `ttl` must be non-zero.
    pub fn open<P: AsRef<Path>>(
        path: P,
        max_size_mb: usize,
        ttl: Duration,
    ) -> Result<Self, LmdbCacheError> {
        validate_ttl(ttl)?;
        let map_size = lmdb_map_size_bytes(max_size_mb)?;

        std::fs::create_dir_all(&path)?;

        let env = unsafe {
            EnvOpenOptions::new()
                .map_size(map_size)
                .max_dbs(1)
                .open(path.as_ref())
        }
        .map_err(|e| LmdbCacheError::EnvOpen(e.to_string()))?;

        let mut wtxn = env.write_txn().map_err(txn_error)?;
        let db: Database<Bytes, Bytes> = env
            .create_database(&mut wtxn, None)
            .map_err(|e| LmdbCacheError::DbOpen(e.to_string()))?;
        wtxn.commit().map_err(txn_error)?;

        Ok(Self {
            env,
            db,
            ttl,
            namespace: None,
            counters: StatsCounters::default(),
        })
    }

    /// Prefix every key, so several deployments can share one environment.
    pub fn with_namespace(mut self, namespace: Option<String>) -> Self {
        self.namespace = namespace;
        self
    }

    fn encode_key(&self, key: &CacheKey) -> Vec<u8> {
        key.namespaced(self.namespace.as_deref()).into_bytes()
    }

    fn is_expired(&self, cached_at: DateTime<Utc>, now: DateTime<Utc>) -> bool {
        match (now - cached_at).to_std() {
            Ok(age) => age >= self.ttl,
            // Written "in the future" (clock skew): keep it.
            Err(_) => false,
        }
    }

    /// Delete a raw key if it is still expired.
    fn remove_expired(&self, raw_key: &[u8]) -> Result<bool, LmdbCacheError> {
        let now = Utc::now();
        let mut wtxn = self.env.write_txn().map_err(txn_error)?;

        // Re-check inside the write transaction; a concurrent set may have
        // replaced the entry since it was read.
        let still_expired = match self.db.get(&wtxn, raw_key).map_err(txn_error)? {
            Some(bytes) if bytes.len() >= HEADER_LEN => {
                let mut header = [0u8; HEADER_LEN];
                header.copy_from_slice(&bytes[..HEADER_LEN]);
                DateTime::from_timestamp_millis(i64::from_le_bytes(header))
                    .map(|cached_at| self.is_expired(cached_at, now))
                    .unwrap_or(true)
            }
            Some(_) => true,
            None => false,
        };

        let deleted = still_expired && self.db.delete(&mut wtxn, raw_key).map_err(txn_error)?;
        wtxn.commit().map_err(txn_error)?;
        Ok(deleted)
    }

    /// Delete every expired entry. Returns how many were removed.
    pub fn purge_expired(&self) -> Result<u64, LmdbCacheError> {
        let now = Utc::now();
        let expired: Vec<Vec<u8>> = {
            let rtxn = self.env.read_txn().map_err(txn_error)?;
            let mut keys = Vec::new();
            for result in self.db.iter(&rtxn).map_err(txn_error)? {
                let (raw_key, bytes) = match result {
                    Ok(pair) => pair,
                    Err(_) => continue,
                };
                if bytes.len() < HEADER_LEN {
                    keys.push(raw_key.to_vec());
                    continue;
                }
                let mut header = [0u8; HEADER_LEN];
                header.copy_from_slice(&bytes[..HEADER_LEN]);
                let expired = DateTime::from_timestamp_millis(i64::from_le_bytes(header))
                    .map(|cached_at| self.is_expired(cached_at, now))
                    .unwrap_or(true);
                if expired {
                    keys.push(raw_key.to_vec());
                }
            }
            keys
        };

        let mut wtxn = self.env.write_txn().map_err(txn_error)?;
        let mut deleted = 0u64;
        for raw_key in &expired {
            if self.db.delete(&mut wtxn, raw_key).unwrap_or(false) {
                deleted += 1;
            }
        }
        wtxn.commit().map_err(txn_error)?;

        if deleted > 0 {
            self.counters.record_evictions(deleted);
            tracing::debug!(removed = deleted, "purged expired cache entries (lmdb)");
        }
        Ok(deleted)
    }

    /// Number of stored entries, including expired ones not yet purged.
    pub fn len(&self) -> Result<u64, LmdbCacheError> {
        let rtxn = self.env.read_txn().map_err(txn_error)?;
        self.db.len(&rtxn).map_err(txn_error)
    }

    pub fn is_empty(&self) -> Result<bool, LmdbCacheError> {
        Ok(self.len()? == 0)
    }
}

#[async_trait]
impl CacheStore for LmdbCacheStore {
    async fn get(&self, key: &CacheKey) -> Result<Option<CacheEntry>, CacheError> {
        let raw_key = self.encode_key(key);

        let stored = {
            let rtxn = self.env.read_txn().map_err(txn_error)?;
            let found = self.db.get(&rtxn, &raw_key).map_err(txn_error)?;
            found.map(|bytes| bytes.to_vec())
        };

        let Some(bytes) = stored else {
            self.counters.record_miss();
            return Ok(None);
        };

        let entry = decode_entry(key, &bytes)?;
        if self.is_expired(entry.cached_at, Utc::now()) {
            if self.remove_expired(&raw_key)? {
                self.counters.record_evictions(1);
            }
            self.counters.record_miss();
            return Ok(None);
        }

        self.counters.record_hit();
        Ok(Some(entry))
    }

    async fn set(&self, key: &CacheKey, payload: Vec<u8>) -> Result<(), CacheError> {
        let raw_key = self.encode_key(key);
        let value = encode_entry(Utc::now(), &payload);

        let mut wtxn = self.env.write_txn().map_err(txn_error)?;
        self.db
            .put(&mut wtxn, &raw_key, &value)
            .map_err(txn_error)?;
        wtxn.commit().map_err(txn_error)?;

        tracing::debug!(key = %key, bytes = value.len(), "cache set (lmdb)");
        Ok(())
    }

    async fn delete(&self, key: &CacheKey) -> Result<bool, CacheError> {
        let raw_key = self.encode_key(key);

        let mut wtxn = self.env.write_txn().map_err(txn_error)?;
        let deleted = self.db.delete(&mut wtxn, &raw_key).map_err(txn_error)?;
        wtxn.commit().map_err(txn_error)?;

        tracing::debug!(key = %key, removed = deleted, "cache delete (lmdb)");
        Ok(deleted)
    }

    async fn stats(&self) -> Result<CacheStats, CacheError> {
        let rtxn = self.env.read_txn().map_err(txn_error)?;
        let mut entry_count = 0u64;
        let mut memory_bytes = 0u64;
        for (_, bytes) in self.db.iter(&rtxn).map_err(txn_error)?.flatten() {
            entry_count += 1;
            memory_bytes += bytes.len().saturating_sub(HEADER_LEN) as u64;
        }
        Ok(self.counters.snapshot(entry_count, memory_bytes))
    }

    fn ttl(&self) -> Duration {
        self.ttl
    }
}
