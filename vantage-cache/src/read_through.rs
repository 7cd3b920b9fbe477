//! Read-through coordinator.
//!
//! [`read_through`] is the orchestration on its own: try the fast path, fall
//! back to the slow path, repopulate. [`ReadThroughCache`] binds it to a
//! [`CacheStore`] and a [`SourceOfTruth`] and adds logging.
//!
//! The coordinator keeps no state besides the injected store, takes no locks,
//! and never lets a cache failure become a read failure: `fetch_collection`
//! can only return a [`SourceError`].

use std::future::Future;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use vantage_core::{CacheError, CacheKey, OwnerId, SourceError};

use crate::codec::{decode_snapshot, encode_snapshot};
use crate::read::{CacheRead, ReadOrigin};
use crate::traits::{CacheStore, CacheableRecord, SourceOfTruth};

/// Outcome of the fast-path lookup.
#[derive(Debug, Clone, PartialEq)]
pub enum Lookup<V> {
    /// A usable value was cached.
    Hit { value: V, cached_at: DateTime<Utc> },
    /// Nothing cached.
    Absent,
    /// Something was cached but it could not be trusted.
    Malformed { reason: String },
    /// The cache itself failed.
    Unavailable(CacheError),
}

/// Result of a best-effort cache write or delete.
///
/// Only ever inspected for reporting; no read or mutation depends on it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WriteOutcome {
    Applied,
    Failed(CacheError),
}

impl WriteOutcome {
    pub fn is_applied(&self) -> bool {
        matches!(self, Self::Applied)
    }

    pub fn error(&self) -> Option<&CacheError> {
        match self {
            Self::Applied => None,
            Self::Failed(e) => Some(e),
        }
    }
}

impl From<Result<(), CacheError>> for WriteOutcome {
    fn from(result: Result<(), CacheError>) -> Self {
        match result {
            Ok(()) => Self::Applied,
            Err(e) => Self::Failed(e),
        }
    }
}

/// A read resolved by [`read_through`].
#[derive(Debug, Clone)]
pub struct Resolved<V> {
    /// The value and where it came from.
    pub read: CacheRead<V>,
    /// Outcome of the repopulating write; `None` on a hit.
    pub repopulated: Option<WriteOutcome>,
}

/// Two-tier read: `primary`, then `fallback` plus `repopulate` on any miss.
///
/// Every non-hit [`Lookup`] takes the fallback path, so a failing primary can
/// only slow a read down. The fallback's error is the only error returned, and
/// `repopulate` runs only after the fallback succeeded.
pub async fn read_through<V, E, P, PFut, F, FFut, R, RFut>(
    primary: P,
    fallback: F,
    repopulate: R,
) -> Result<Resolved<V>, E>
where
    P: FnOnce() -> PFut,
    PFut: Future<Output = Lookup<V>>,
    F: FnOnce() -> FFut,
    FFut: Future<Output = Result<V, E>>,
    R: FnOnce(&V) -> RFut,
    RFut: Future<Output = WriteOutcome>,
{
    let origin = match primary().await {
        Lookup::Hit { value, cached_at } => {
            return Ok(Resolved {
                read: CacheRead::from_cache(value, cached_at),
                repopulated: None,
            });
        }
        Lookup::Absent => ReadOrigin::CacheMiss,
        Lookup::Malformed { .. } => ReadOrigin::CacheRejected,
        Lookup::Unavailable(_) => ReadOrigin::CacheBypassed,
    };

    let value = fallback().await?;
    let outcome = repopulate(&value).await;

    Ok(Resolved {
        read: CacheRead::from_source(value, origin),
        repopulated: Some(outcome),
    })
}

/// Run a store write on its own task so an abandoned caller cannot tear it.
///
/// Falls back to running inline when no tokio runtime is available.
async fn run_detached<F>(write: F) -> Result<(), CacheError>
where
    F: Future<Output = Result<(), CacheError>> + Send + 'static,
{
    match tokio::runtime::Handle::try_current() {
        Ok(handle) => match handle.spawn(write).await {
            Ok(result) => result,
            Err(e) => Err(CacheError::unavailable(format!("cache task failed: {}", e))),
        },
        Err(_) => write.await,
    }
}

/// Read-through cache coordinator for owner-scoped collections.
///
/// # Example
///
/// ```ignore
/// let cache = ReadThroughCache::new(Arc::new(InMemoryCacheStore::new(ttl)?));
///
/// // Hit: served from the store. Miss: fetched from `source` and written back.
/// let dashboards = cache.fetch_collection::<Dashboard, _>(&key, &source).await?;
///
/// // After any create/update/delete in the collection:
/// cache.invalidate(&key).await;
/// ```
pub struct ReadThroughCache<C: CacheStore + ?Sized> {
    store: Arc<C>,
}

impl<C: CacheStore + ?Sized + 'static> ReadThroughCache<C> {
    /// Create a coordinator over a store.
    pub fn new(store: Arc<C>) -> Self {
        Self { store }
    }

    /// Get a reference to the cache store.
    pub fn store(&self) -> &C {
        &self.store
    }

    /// Get the collection for a key, from the cache when possible.
    ///
    /// Fails only when the source of truth fails. Cache read errors and
    /// malformed entries fall back to the source; a failed write-back is
    /// logged. Nothing is cached when the source fails.
    pub async fn fetch_collection<T, S>(
        &self,
        key: &CacheKey,
        source: &S,
    ) -> Result<CacheRead<Vec<T>>, SourceError>
    where
        T: CacheableRecord,
        S: SourceOfTruth<T> + ?Sized,
    {
        let result = read_through(
            || self.lookup::<T>(key),
            || source.fetch(key),
            |snapshot: &Vec<T>| {
                let encoded = encode_snapshot(key, snapshot);
                let store = Arc::clone(&self.store);
                let key = key.clone();
                async move {
                    let payload = match encoded {
                        Ok(payload) => payload,
                        Err(e) => return WriteOutcome::Failed(e),
                    };
                    run_detached(async move { store.set(&key, payload).await })
                        .await
                        .into()
                }
            },
        )
        .await;

        match result {
            Ok(resolved) => {
                let origin = resolved.read.origin();
                match resolved.repopulated {
                    None => {
                        tracing::debug!(key = %key, "cache hit");
                    }
                    Some(WriteOutcome::Applied) => {
                        tracing::debug!(key = %key, origin = %origin, "served from source, cache populated");
                    }
                    Some(WriteOutcome::Failed(e)) => {
                        tracing::warn!(key = %key, origin = %origin, error = %e, "served from source, failed to populate cache");
                    }
                }
                Ok(resolved.read)
            }
            Err(e) => {
                tracing::debug!(key = %key, error = %e, "source fetch failed");
                Err(e)
            }
        }
    }

    /// Get the `T` collection owned by `owner`.
    pub async fn fetch_owned<T, S>(
        &self,
        owner: &OwnerId,
        source: &S,
    ) -> Result<CacheRead<Vec<T>>, SourceError>
    where
        T: CacheableRecord,
        S: SourceOfTruth<T> + ?Sized,
    {
        let key = T::cache_key(owner.clone());
        self.fetch_collection(&key, source).await
    }

    /// Drop the cached collection for a key.
    ///
    /// Call after every mutation that can change the collection. Never fails:
    /// a store error is logged and returned as `WriteOutcome::Failed`, and the
    /// stale entry then lives at most until its TTL. Invalidating a key with
    /// no entry is `Applied`.
    pub async fn invalidate(&self, key: &CacheKey) -> WriteOutcome {
        let store = Arc::clone(&self.store);
        let owned = key.clone();
        let outcome: WriteOutcome =
            run_detached(async move { store.delete(&owned).await.map(|_| ()) })
                .await
                .into();

        match &outcome {
            WriteOutcome::Applied => tracing::debug!(key = %key, "cache invalidated"),
            WriteOutcome::Failed(e) => {
                tracing::warn!(key = %key, error = %e, "cache invalidation failed, entry may be stale until TTL")
            }
        }
        outcome
    }

    /// Invalidate several keys, one outcome per key in order.
    pub async fn invalidate_all<'a, I>(&self, keys: I) -> Vec<WriteOutcome>
    where
        I: IntoIterator<Item = &'a CacheKey>,
    {
        let mut outcomes = Vec::new();
        for key in keys {
            outcomes.push(self.invalidate(key).await);
        }
        outcomes
    }

    /// Fast path: read and decode the cached snapshot.
    async fn lookup<T: CacheableRecord>(&self, key: &CacheKey) -> Lookup<Vec<T>> {
        match self.store.get(key).await {
            Ok(Some(entry)) => match decode_snapshot::<T>(key, &entry.payload) {
                Ok(value) => Lookup::Hit {
                    value,
                    cached_at: entry.cached_at,
                },
                Err(e) => {
                    tracing::warn!(key = %key, error = %e, "ignoring malformed cache entry");
                    Lookup::Malformed {
                        reason: e.to_string(),
                    }
                }
            },
            Ok(None) => Lookup::Absent,
            Err(e) => {
                tracing::warn!(key = %key, error = %e, "cache read failed, falling back to source");
                Lookup::Unavailable(e)
            }
        }
    }
}

impl<C: CacheStore + ?Sized> Clone for ReadThroughCache<C> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
        }
    }
}
