//! Vantage Test Utilities
//!
//! Shared test infrastructure for the Vantage workspace:
//! - A counting source of truth with a failure switch
//! - A cache store with injectable faults and raw payloads
//! - Proptest generators for keys and snapshots
//! - Fixtures for common scenarios

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::RwLock;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

pub use vantage_cache::{
    CacheEntry, CacheRead, CacheStats, CacheStore, CacheableRecord, InMemoryCacheStore,
    ReadOrigin, ReadThroughCache, SourceOfTruth, WriteOutcome,
};
pub use vantage_core::{
    CacheError, CacheKey, CollectionKind, OwnerId, SourceError, VantageError, VantageResult,
};

// ============================================================================
// TEST RECORD
// ============================================================================

/// Minimal cacheable record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Widget {
    pub id: u32,
    pub owner: String,
    pub label: String,
}

impl CacheableRecord for Widget {
    fn collection_kind() -> CollectionKind {
        CollectionKind::from_static("widgets")
    }
}

// ============================================================================
// COUNTING SOURCE
// ============================================================================

/// In-memory source of truth that counts fetches.
///
/// Keys with no collection return an empty list, like an owner with no rows,
/// unless the source is [`strict`](CountingSource::strict).
#[derive(Debug)]
pub struct CountingSource<T> {
    collections: RwLock<HashMap<CacheKey, Vec<T>>>,
    calls: AtomicUsize,
    failing: AtomicBool,
    strict: bool,
}

impl<T: Clone> CountingSource<T> {
    pub fn new() -> Self {
        Self {
            collections: RwLock::new(HashMap::new()),
            calls: AtomicUsize::new(0),
            failing: AtomicBool::new(false),
            strict: false,
        }
    }

    /// A source that answers `NotFound` for keys it holds nothing for.
    pub fn strict() -> Self {
        Self {
            strict: true,
            ..Self::new()
        }
    }

    /// Replace the collection stored under `key`.
    pub fn put(&self, key: &CacheKey, records: Vec<T>) {
        self.collections
            .write()
            .expect("source lock poisoned")
            .insert(key.clone(), records);
    }

    /// Append one record to the collection under `key`.
    pub fn push(&self, key: &CacheKey, record: T) {
        self.collections
            .write()
            .expect("source lock poisoned")
            .entry(key.clone())
            .or_default()
            .push(record);
    }

    /// Make every fetch fail until switched back.
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    /// Number of fetches so far, failed ones included.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn reset_calls(&self) {
        self.calls.store(0, Ordering::SeqCst);
    }
}

impl<T: Clone> Default for CountingSource<T> {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl<T: Clone + Send + Sync> SourceOfTruth<T> for CountingSource<T> {
    async fn fetch(&self, key: &CacheKey) -> Result<Vec<T>, SourceError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.failing.load(Ordering::SeqCst) {
            return Err(SourceError::unavailable("source switched off"));
        }
        let collections = self.collections.read().expect("source lock poisoned");
        match collections.get(key) {
            Some(records) => Ok(records.clone()),
            None if self.strict => Err(SourceError::not_found(key.as_str())),
            None => Ok(Vec::new()),
        }
    }
}

// ============================================================================
// FAULTY CACHE STORE
// ============================================================================

/// Cache store wrapper whose operations can be made to fail or stall.
///
/// Delegates to an [`InMemoryCacheStore`] while healthy.
pub struct FaultyCacheStore {
    inner: InMemoryCacheStore,
    fail_get: AtomicBool,
    fail_set: AtomicBool,
    fail_delete: AtomicBool,
    set_delay_ms: AtomicU64,
    sets: AtomicUsize,
    deletes: AtomicUsize,
}

impl FaultyCacheStore {
    pub fn new(ttl: Duration) -> Self {
        Self {
            inner: InMemoryCacheStore::new(ttl).expect("test TTL must be non-zero"),
            fail_get: AtomicBool::new(false),
            fail_set: AtomicBool::new(false),
            fail_delete: AtomicBool::new(false),
            set_delay_ms: AtomicU64::new(0),
            sets: AtomicUsize::new(0),
            deletes: AtomicUsize::new(0),
        }
    }

    pub fn fail_get(&self, fail: bool) {
        self.fail_get.store(fail, Ordering::SeqCst);
    }

    pub fn fail_set(&self, fail: bool) {
        self.fail_set.store(fail, Ordering::SeqCst);
    }

    pub fn fail_delete(&self, fail: bool) {
        self.fail_delete.store(fail, Ordering::SeqCst);
    }

    /// Fail every operation.
    pub fn fail_all(&self, fail: bool) {
        self.fail_get(fail);
        self.fail_set(fail);
        self.fail_delete(fail);
    }

    /// Stall each `set` before it is applied.
    pub fn delay_sets(&self, delay: Duration) {
        self.set_delay_ms
            .store(delay.as_millis() as u64, Ordering::SeqCst);
    }

    /// Store arbitrary bytes under `key`, bypassing any fault switch.
    pub async fn inject_raw(&self, key: &CacheKey, payload: &[u8]) {
        self.inner
            .set(key, payload.to_vec())
            .await
            .expect("in-memory set cannot fail");
    }

    /// Raw payload under `key`, if any.
    pub async fn raw(&self, key: &CacheKey) -> Option<Vec<u8>> {
        self.inner
            .get(key)
            .await
            .expect("in-memory get cannot fail")
            .map(|entry| entry.payload)
    }

    /// Number of `set` calls, failed ones included.
    pub fn sets(&self) -> usize {
        self.sets.load(Ordering::SeqCst)
    }

    /// Number of `delete` calls, failed ones included.
    pub fn deletes(&self) -> usize {
        self.deletes.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl CacheStore for FaultyCacheStore {
    async fn get(&self, key: &CacheKey) -> Result<Option<CacheEntry>, CacheError> {
        if self.fail_get.load(Ordering::SeqCst) {
            return Err(CacheError::unavailable("injected get failure"));
        }
        self.inner.get(key).await
    }

    async fn set(&self, key: &CacheKey, payload: Vec<u8>) -> Result<(), CacheError> {
        self.sets.fetch_add(1, Ordering::SeqCst);
        let delay = self.set_delay_ms.load(Ordering::SeqCst);
        if delay > 0 {
            tokio::time::sleep(Duration::from_millis(delay)).await;
        }
        if self.fail_set.load(Ordering::SeqCst) {
            return Err(CacheError::unavailable("injected set failure"));
        }
        self.inner.set(key, payload).await
    }

    async fn delete(&self, key: &CacheKey) -> Result<bool, CacheError> {
        self.deletes.fetch_add(1, Ordering::SeqCst);
        if self.fail_delete.load(Ordering::SeqCst) {
            return Err(CacheError::unavailable("injected delete failure"));
        }
        self.inner.delete(key).await
    }

    async fn stats(&self) -> Result<CacheStats, CacheError> {
        self.inner.stats().await
    }

    fn ttl(&self) -> Duration {
        self.inner.ttl()
    }
}

// ============================================================================
// PROPTEST GENERATORS
// ============================================================================

pub mod generators {
    //! Proptest strategies for keys and snapshots.

    use super::*;
    use proptest::prelude::*;

    /// Generate a valid owner id.
    pub fn arb_owner_id() -> impl Strategy<Value = OwnerId> {
        "[a-zA-Z0-9_.-]{1,32}".prop_map(|s| OwnerId::new(s).expect("pattern yields valid owner"))
    }

    /// Generate a valid collection kind.
    pub fn arb_collection_kind() -> impl Strategy<Value = CollectionKind> {
        "[a-z_]{1,16}".prop_map(|s| CollectionKind::new(s).expect("pattern yields valid kind"))
    }

    /// Generate a cache key for any kind.
    pub fn arb_cache_key() -> impl Strategy<Value = CacheKey> {
        (arb_collection_kind(), arb_owner_id()).prop_map(|(kind, owner)| CacheKey::new(kind, owner))
    }

    /// Generate a widget key.
    pub fn arb_widget_key() -> impl Strategy<Value = CacheKey> {
        arb_owner_id().prop_map(Widget::cache_key)
    }

    /// Generate a widget.
    pub fn arb_widget() -> impl Strategy<Value = Widget> {
        (any::<u32>(), "[a-z0-9]{1,12}", ".{0,40}").prop_map(|(id, owner, label)| Widget {
            id,
            owner,
            label,
        })
    }

    /// Generate a widget list, possibly empty.
    pub fn arb_snapshot() -> impl Strategy<Value = Vec<Widget>> {
        prop::collection::vec(arb_widget(), 0..16)
    }

    /// Generate a TTL between one second and one hour.
    pub fn arb_ttl() -> impl Strategy<Value = Duration> {
        (1u64..3600).prop_map(Duration::from_secs)
    }
}

// ============================================================================
// FIXTURES
// ============================================================================

pub mod fixtures {
    //! Pre-built values for common scenarios.

    use super::*;
    use std::sync::Arc;

    /// TTL long enough that nothing expires during a test.
    pub const TEST_TTL: Duration = Duration::from_secs(300);

    pub fn owner(raw: &str) -> OwnerId {
        OwnerId::new(raw).expect("fixture owner must be valid")
    }

    pub fn widget_key(raw_owner: &str) -> CacheKey {
        Widget::cache_key(owner(raw_owner))
    }

    pub fn widget(id: u32, raw_owner: &str, label: &str) -> Widget {
        Widget {
            id,
            owner: raw_owner.to_string(),
            label: label.to_string(),
        }
    }

    /// `count` widgets for one owner, ids starting at 1.
    pub fn widgets(raw_owner: &str, count: u32) -> Vec<Widget> {
        (1..=count)
            .map(|id| widget(id, raw_owner, &format!("widget {}", id)))
            .collect()
    }

    /// Coordinator over a fresh faulty store, plus the store handle.
    pub fn faulty_cache() -> (ReadThroughCache<FaultyCacheStore>, Arc<FaultyCacheStore>) {
        let store = Arc::new(FaultyCacheStore::new(TEST_TTL));
        (ReadThroughCache::new(Arc::clone(&store)), store)
    }

    /// Coordinator over a fresh in-memory store.
    pub fn memory_cache() -> ReadThroughCache<InMemoryCacheStore> {
        let store = InMemoryCacheStore::new(TEST_TTL).expect("fixture TTL is non-zero");
        ReadThroughCache::new(Arc::new(store))
    }

    /// Source holding `widgets(owner, count)` under the owner's widget key.
    pub fn seeded_source(raw_owner: &str, count: u32) -> CountingSource<Widget> {
        let source = CountingSource::new();
        source.put(&widget_key(raw_owner), widgets(raw_owner, count));
        source
    }
}

#[cfg(test)]
mod tests {
    use super::fixtures::*;
    use super::*;

    #[tokio::test]
    async fn test_counting_source_counts_and_fails() {
        let source = seeded_source("u1", 2);
        assert_eq!(source.fetch(&widget_key("u1")).await.expect("fetch").len(), 2);
        assert!(source.fetch(&widget_key("u2")).await.expect("fetch").is_empty());

        source.set_failing(true);
        assert!(source.fetch(&widget_key("u1")).await.is_err());
        assert_eq!(source.calls(), 3);
    }

    #[tokio::test]
    async fn test_strict_source_reports_not_found() {
        let source = CountingSource::<Widget>::strict();
        let err = source
            .fetch(&widget_key("ghost"))
            .await
            .expect_err("nothing stored");
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn test_faulty_store_switches() {
        let store = FaultyCacheStore::new(TEST_TTL);
        let key = widget_key("u1");

        store.set(&key, b"[]".to_vec()).await.expect("healthy set");
        store.fail_get(true);
        assert!(store.get(&key).await.is_err());
        store.fail_get(false);
        assert!(store.get(&key).await.expect("healthy get").is_some());

        store.fail_delete(true);
        assert!(store.delete(&key).await.is_err());
        assert_eq!(store.raw(&key).await, Some(b"[]".to_vec()));
        assert_eq!(store.sets(), 1);
        assert_eq!(store.deletes(), 1);
    }
}
