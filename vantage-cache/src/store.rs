//! Store construction from [`CacheSettings`].

use std::sync::Arc;

use vantage_core::{CacheBackendKind, CacheSettings, ConfigError, VantageResult};

use crate::lmdb_backend::LmdbCacheStore;
use crate::memory::InMemoryCacheStore;
use crate::traits::CacheStore;

/// Build the store the settings describe.
///
/// Async because the Redis store checks its connection on startup.
pub async fn open_store(settings: &CacheSettings) -> VantageResult<Arc<dyn CacheStore>> {
    settings.validate()?;

    let store: Arc<dyn CacheStore> = match settings.backend {
        CacheBackendKind::Memory => Arc::new(InMemoryCacheStore::new(settings.entry_ttl)?),
        CacheBackendKind::Lmdb => {
            let path = settings
                .lmdb_path
                .as_ref()
                .ok_or_else(|| ConfigError::MissingRequired {
                    field: "lmdb_path".to_string(),
                })?;
            let store =
                LmdbCacheStore::open(path, settings.lmdb_max_size_mb, settings.entry_ttl)?
                    .with_namespace(settings.namespace.clone());
            Arc::new(store)
        }
        CacheBackendKind::Redis => open_redis(settings).await?,
    };

    tracing::info!(
        backend = %settings.backend,
        ttl_secs = settings.entry_ttl.as_secs(),
        "cache store opened"
    );
    Ok(store)
}

#[cfg(feature = "redis")]
async fn open_redis(settings: &CacheSettings) -> VantageResult<Arc<dyn CacheStore>> {
    let url = settings
        .redis_url
        .as_deref()
        .ok_or_else(|| ConfigError::MissingRequired {
            field: "redis_url".to_string(),
        })?;
    let store = crate::redis_backend::RedisCacheStore::connect(
        url,
        settings.entry_ttl,
        settings.namespace.clone(),
    )
    .await?;
    Ok(Arc::new(store))
}

#[cfg(not(feature = "redis"))]
async fn open_redis(_settings: &CacheSettings) -> VantageResult<Arc<dyn CacheStore>> {
    Err(ConfigError::BackendNotSupported {
        backend: CacheBackendKind::Redis.to_string(),
    }
    .into())
}
