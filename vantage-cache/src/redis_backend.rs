//! Redis-backed cache store, shared by every instance of a deployment.
//!
//! Entries are written with `SET .. EX` so Redis enforces the TTL itself.
//! Values carry the same `[cached_at millis][snapshot]` envelope as LMDB.

use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use deadpool_redis::{Config, Pool, Runtime};
use redis::AsyncCommands;
use vantage_core::{validate_ttl, CacheError, CacheKey, ConfigError};

use crate::codec::{decode_entry, encode_entry};
use crate::traits::{CacheEntry, CacheStats, CacheStore, StatsCounters};

/// Redis `EX` takes whole seconds; round up so an entry never expires early.
pub(crate) fn ttl_secs(ttl: Duration) -> u64 {
    let secs = ttl.as_secs();
    let rounded = if ttl.subsec_nanos() > 0 { secs + 1 } else { secs };
    rounded.max(1)
}

/// Redis cache store over a deadpool connection pool.
#[derive(Clone)]
pub struct RedisCacheStore {
    pool: Pool,
    ttl: Duration,
    namespace: Option<String>,
    counters: std::sync::Arc<StatsCounters>,
}

impl RedisCacheStore {
    /// Build a pool for `url` and check that a connection can be made.
    pub async fn connect(
        url: &str,
        ttl: Duration,
        namespace: Option<String>,
    ) -> Result<Self, CacheError> {
        let pool = Config::from_url(url)
            .create_pool(Some(Runtime::Tokio1))
            .map_err(|e| CacheError::unavailable(format!("redis pool: {}", e)))?;

        // Fail fast on a bad URL or unreachable server.
        pool.get()
            .await
            .map_err(|e| CacheError::unavailable(format!("redis connect: {}", e)))?;

        tracing::info!(url = %url, "connected to redis cache");
        Self::from_pool(pool, ttl, namespace)
            .map_err(|e| CacheError::unavailable(e.to_string()))
    }

    /// Wrap an existing pool.
    pub fn from_pool(
        pool: Pool,
        ttl: Duration,
        namespace: Option<String>,
    ) -> Result<Self, ConfigError> {
        validate_ttl(ttl)?;
        Ok(Self {
            pool,
            ttl,
            namespace,
            counters: std::sync::Arc::new(StatsCounters::default()),
        })
    }

    fn encode_key(&self, key: &CacheKey) -> String {
        key.namespaced(self.namespace.as_deref())
    }

    async fn connection(&self) -> Result<deadpool_redis::Connection, CacheError> {
        self.pool
            .get()
            .await
            .map_err(|e| CacheError::unavailable(format!("redis pool: {}", e)))
    }
}

fn command_error(e: redis::RedisError) -> CacheError {
    CacheError::transaction(format!("redis: {}", e))
}

/// Decode a fetched value. Only an entry that decodes counts as a hit.
fn unpack_stored(
    counters: &StatsCounters,
    key: &CacheKey,
    stored: Option<Vec<u8>>,
) -> Result<Option<CacheEntry>, CacheError> {
    match stored {
        Some(bytes) => {
            let entry = decode_entry(key, &bytes)?;
            counters.record_hit();
            Ok(Some(entry))
        }
        None => {
            counters.record_miss();
            Ok(None)
        }
    }
}

#[async_trait]
impl CacheStore for RedisCacheStore {
    async fn get(&self, key: &CacheKey) -> Result<Option<CacheEntry>, CacheError> {
        let raw_key = self.encode_key(key);
        let mut conn = self.connection().await?;
        let stored: Option<Vec<u8>> = conn.get(&raw_key).await.map_err(command_error)?;
        unpack_stored(&self.counters, key, stored)
    }

    async fn set(&self, key: &CacheKey, payload: Vec<u8>) -> Result<(), CacheError> {
        let raw_key = self.encode_key(key);
        let value = encode_entry(Utc::now(), &payload);
        let mut conn = self.connection().await?;
        conn.set_ex::<_, _, ()>(&raw_key, value, ttl_secs(self.ttl))
            .await
            .map_err(command_error)?;
        tracing::debug!(key = %key, ttl_secs = ttl_secs(self.ttl), "cache set (redis)");
        Ok(())
    }

    async fn delete(&self, key: &CacheKey) -> Result<bool, CacheError> {
        let raw_key = self.encode_key(key);
        let mut conn = self.connection().await?;
        let removed: u64 = conn.del(&raw_key).await.map_err(command_error)?;
        tracing::debug!(key = %key, removed, "cache delete (redis)");
        Ok(removed > 0)
    }

    /// Hit and miss counts are local to this process. Redis evicts on its
    /// own, so entry count and size are not tracked.
    async fn stats(&self) -> Result<CacheStats, CacheError> {
        Ok(self.counters.snapshot(0, 0))
    }

    fn ttl(&self) -> Duration {
        self.ttl
    }
}
