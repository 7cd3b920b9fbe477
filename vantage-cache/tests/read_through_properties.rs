//! Read-through behaviour against fault-injecting stores and counting sources.

use std::sync::Arc;
use std::time::Duration;

use proptest::prelude::*;
use vantage_cache::codec::encode_snapshot;
use vantage_cache::{CacheStore, CacheableRecord, InMemoryCacheStore, ReadOrigin, ReadThroughCache};
use vantage_core::{CacheKey, OwnerId, SourceError};
use vantage_test_utils::fixtures::{
    faulty_cache, memory_cache, seeded_source, widget, widget_key, widgets,
};
use vantage_test_utils::generators::{
    arb_cache_key, arb_owner_id, arb_snapshot, arb_ttl, arb_widget_key,
};
use vantage_test_utils::{CountingSource, FaultyCacheStore, Widget};

async fn cached_widgets(store: &FaultyCacheStore, key: &CacheKey) -> Option<Vec<Widget>> {
    store
        .raw(key)
        .await
        .map(|raw| serde_json::from_slice(&raw).expect("cached payload decodes"))
}

#[tokio::test]
async fn empty_cache_serves_source_and_populates() {
    let (cache, store) = faulty_cache();
    let source = seeded_source("u1", 3);
    let key = widget_key("u1");

    let read = cache
        .fetch_collection::<Widget, _>(&key, &source)
        .await
        .expect("source is healthy");

    assert_eq!(read.origin(), ReadOrigin::CacheMiss);
    assert_eq!(read.value(), &widgets("u1", 3));
    assert_eq!(cached_widgets(&store, &key).await, Some(widgets("u1", 3)));
}

#[tokio::test]
async fn populated_cache_skips_source() {
    let (cache, store) = faulty_cache();
    let source = CountingSource::<Widget>::new();
    let key = widget_key("u1");

    let payload = encode_snapshot(&key, &widgets("u1", 2)).expect("encodes");
    store.inject_raw(&key, &payload).await;

    let read = cache
        .fetch_collection::<Widget, _>(&key, &source)
        .await
        .expect("hit");

    assert!(read.was_cache_hit());
    assert_eq!(read.into_value(), widgets("u1", 2));
    assert_eq!(source.calls(), 0);
}

#[tokio::test]
async fn failing_store_read_falls_back_to_source() {
    let (cache, store) = faulty_cache();
    let source = seeded_source("u1", 1);
    let key = widget_key("u1");
    store.fail_get(true);

    let read = cache
        .fetch_collection::<Widget, _>(&key, &source)
        .await
        .expect("store failure is not a read failure");

    assert_eq!(read.origin(), ReadOrigin::CacheBypassed);
    assert_eq!(read.value(), &widgets("u1", 1));
    assert_eq!(source.calls(), 1);
}

#[tokio::test]
async fn failing_store_write_still_returns_fresh_snapshot() {
    let (cache, store) = faulty_cache();
    let source = seeded_source("u1", 2);
    let key = widget_key("u1");
    store.fail_set(true);

    let read = cache
        .fetch_collection::<Widget, _>(&key, &source)
        .await
        .expect("write failure is not a read failure");

    assert_eq!(read.into_value(), widgets("u1", 2));
    assert_eq!(store.sets(), 1);
    assert_eq!(cached_widgets(&store, &key).await, None);
}

#[tokio::test]
async fn fully_degraded_store_behaves_like_no_cache() {
    let (cache, store) = faulty_cache();
    let source = seeded_source("u1", 2);
    let key = widget_key("u1");
    store.fail_all(true);

    for _ in 0..3 {
        let read = cache
            .fetch_collection::<Widget, _>(&key, &source)
            .await
            .expect("source is healthy");
        assert_eq!(read.into_value(), widgets("u1", 2));
    }
    assert_eq!(source.calls(), 3);
    assert!(!cache.invalidate(&key).await.is_applied());
}

#[tokio::test]
async fn invalidate_forces_refetch() {
    let cache = memory_cache();
    let source = seeded_source("u1", 1);
    let key = widget_key("u1");

    cache
        .fetch_collection::<Widget, _>(&key, &source)
        .await
        .expect("first read");
    assert!(cache.invalidate(&key).await.is_applied());

    source.put(&key, widgets("u1", 4));
    let read = cache
        .fetch_collection::<Widget, _>(&key, &source)
        .await
        .expect("second read");

    assert_eq!(source.calls(), 2);
    assert_eq!(read.origin(), ReadOrigin::CacheMiss);
    assert_eq!(read.value().len(), 4);
}

#[tokio::test]
async fn invalidate_missing_key_is_applied() {
    let cache = memory_cache();
    let outcome = cache.invalidate(&widget_key("nobody")).await;
    assert!(outcome.is_applied());
    assert!(outcome.error().is_none());
}

#[tokio::test]
async fn dashboard_list_scenario() {
    #[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
    struct Dashboard {
        id: String,
        name: String,
    }

    impl CacheableRecord for Dashboard {
        fn collection_kind() -> vantage_core::CollectionKind {
            vantage_core::CollectionKind::from_static("dashboards")
        }
    }

    let key = CacheKey::parse("dashboards:u1").expect("valid key");
    let sales = vec![Dashboard {
        id: "d1".to_string(),
        name: "Sales".to_string(),
    }];
    let source = CountingSource::new();
    source.put(&key, sales.clone());
    let cache = memory_cache();

    let first = cache
        .fetch_collection::<Dashboard, _>(&key, &source)
        .await
        .expect("first read");
    assert_eq!(first.value(), &sales);
    assert_eq!(source.calls(), 1);

    let second = cache
        .fetch_collection::<Dashboard, _>(&key, &source)
        .await
        .expect("second read");
    assert_eq!(second.value(), &sales);
    assert!(second.was_cache_hit());
    assert_eq!(source.calls(), 1);

    cache.invalidate(&key).await;
    let third = cache
        .fetch_collection::<Dashboard, _>(&key, &source)
        .await
        .expect("third read");
    assert_eq!(third.value(), &sales);
    assert_eq!(source.calls(), 2);
}

#[tokio::test]
async fn missing_owner_scenario_caches_nothing() {
    let (cache, store) = faulty_cache();
    let source = CountingSource::<Widget>::strict();
    let key = widget_key("ghost");

    let err = cache
        .fetch_collection::<Widget, _>(&key, &source)
        .await
        .expect_err("owner does not exist");

    assert!(matches!(err, SourceError::NotFound { .. }));
    assert_eq!(store.sets(), 0);
    assert!(store.raw(&key).await.is_none());
}

#[tokio::test]
async fn malformed_entry_is_replaced() {
    let (cache, store) = faulty_cache();
    let source = seeded_source("u1", 1);
    let key = widget_key("u1");
    store.inject_raw(&key, br#"{"not":"a list"}"#).await;

    let read = cache
        .fetch_collection::<Widget, _>(&key, &source)
        .await
        .expect("malformed entry is a miss");

    assert_eq!(read.origin(), ReadOrigin::CacheRejected);
    assert_eq!(cached_widgets(&store, &key).await, Some(widgets("u1", 1)));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn abandoned_read_still_completes_its_write() {
    let (cache, store) = faulty_cache();
    let source = seeded_source("u1", 2);
    let key = widget_key("u1");
    store.delay_sets(Duration::from_millis(100));

    let abandoned = tokio::time::timeout(
        Duration::from_millis(20),
        cache.fetch_collection::<Widget, _>(&key, &source),
    )
    .await;
    assert!(abandoned.is_err(), "read should be cut off mid-write");

    tokio::time::sleep(Duration::from_millis(250)).await;
    assert_eq!(cached_widgets(&store, &key).await, Some(widgets("u1", 2)));
}

#[tokio::test]
async fn concurrent_misses_each_fetch_and_write() {
    let (cache, store) = faulty_cache();
    let source = seeded_source("u1", 2);
    let key = widget_key("u1");
    // Keep every write pending until all four lookups have missed
    store.delay_sets(Duration::from_millis(50));

    let (a, b, c, d) = tokio::join!(
        cache.fetch_collection::<Widget, _>(&key, &source),
        cache.fetch_collection::<Widget, _>(&key, &source),
        cache.fetch_collection::<Widget, _>(&key, &source),
        cache.fetch_collection::<Widget, _>(&key, &source),
    );

    for read in [a, b, c, d] {
        let read = read.expect("source is healthy");
        assert_eq!(read.origin(), ReadOrigin::CacheMiss);
        assert_eq!(read.into_value(), widgets("u1", 2));
    }
    assert_eq!(source.calls(), 4);
    assert_eq!(store.sets(), 4);
    assert_eq!(cached_widgets(&store, &key).await, Some(widgets("u1", 2)));
}

#[tokio::test]
async fn write_landing_after_invalidate_lives_until_ttl() {
    let ttl = Duration::from_millis(300);
    let store = Arc::new(FaultyCacheStore::new(ttl));
    let cache = ReadThroughCache::new(Arc::clone(&store));
    let source = seeded_source("u1", 1);
    let key = widget_key("u1");
    store.delay_sets(Duration::from_millis(100));

    let (first, invalidated) = tokio::join!(
        cache.fetch_collection::<Widget, _>(&key, &source),
        async {
            // The first read has fetched and its write is pending
            tokio::time::sleep(Duration::from_millis(20)).await;
            source.push(&key, widget(2, "u1", "added"));
            cache.invalidate(&key).await
        },
    );
    assert_eq!(first.expect("first read").into_value(), widgets("u1", 1));
    assert!(invalidated.is_applied());

    // The older snapshot landed after the invalidation
    assert_eq!(cached_widgets(&store, &key).await, Some(widgets("u1", 1)));
    let stale = cache
        .fetch_collection::<Widget, _>(&key, &source)
        .await
        .expect("stale hit");
    assert!(stale.was_cache_hit());
    assert_eq!(stale.value().len(), 1);
    assert_eq!(source.calls(), 1);

    tokio::time::sleep(ttl).await;
    store.delay_sets(Duration::ZERO);
    source.reset_calls();

    let fresh = cache
        .fetch_collection::<Widget, _>(&key, &source)
        .await
        .expect("read after expiry");
    assert_eq!(fresh.origin(), ReadOrigin::CacheMiss);
    assert_eq!(fresh.value().len(), 2);
    assert_eq!(source.calls(), 1);
}

#[tokio::test]
async fn owners_do_not_share_entries() {
    let cache = memory_cache();
    let source = CountingSource::new();
    source.put(&widget_key("u1"), widgets("u1", 1));
    source.put(&widget_key("u2"), widgets("u2", 3));

    let u1 = cache
        .fetch_owned::<Widget, _>(&OwnerId::new("u1").expect("valid owner"), &source)
        .await
        .expect("u1 read");
    let u2 = cache
        .fetch_owned::<Widget, _>(&OwnerId::new("u2").expect("valid owner"), &source)
        .await
        .expect("u2 read");

    assert_eq!(u1.value().len(), 1);
    assert_eq!(u2.value().len(), 3);
    assert_eq!(cache.store().stats().await.expect("stats").entry_count, 2);
}

#[tokio::test]
async fn shared_source_behind_arc() {
    let cache = memory_cache();
    let source = Arc::new(seeded_source("u1", 1));

    cache
        .fetch_collection::<Widget, _>(&widget_key("u1"), &source)
        .await
        .expect("Arc source works");
    assert_eq!(source.calls(), 1);
}

fn runtime() -> tokio::runtime::Runtime {
    tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .expect("runtime builds")
}

proptest! {
    #[test]
    fn prop_miss_returns_source_snapshot_and_populates(
        key in arb_widget_key(),
        snapshot in arb_snapshot(),
    ) {
        let rt = runtime();
        let (cache, store) = faulty_cache();
        let source = CountingSource::new();
        source.put(&key, snapshot.clone());

        let read = rt
            .block_on(cache.fetch_collection::<Widget, _>(&key, &source))
            .expect("source is healthy");
        prop_assert_eq!(read.into_value(), snapshot.clone());
        prop_assert_eq!(rt.block_on(cached_widgets(&store, &key)), Some(snapshot));
    }

    #[test]
    fn prop_hit_returns_cached_snapshot_without_source(
        owner in arb_owner_id(),
        snapshot in arb_snapshot(),
    ) {
        let rt = runtime();
        let (cache, store) = faulty_cache();
        let key = Widget::cache_key(owner);
        let source = CountingSource::<Widget>::new();
        source.set_failing(true);

        let payload = encode_snapshot(&key, &snapshot).expect("encodes");
        rt.block_on(store.inject_raw(&key, &payload));

        let read = rt
            .block_on(cache.fetch_collection::<Widget, _>(&key, &source))
            .expect("hit never touches the failing source");
        prop_assert!(read.was_cache_hit());
        prop_assert_eq!(read.into_value(), snapshot);
        prop_assert_eq!(source.calls(), 0);
    }

    #[test]
    fn prop_invalidate_is_idempotent_for_any_key(key in arb_cache_key()) {
        let rt = runtime();
        let cache = memory_cache();

        rt.block_on(cache.store().set(&key, b"[]".to_vec())).expect("memory set");
        prop_assert!(rt.block_on(cache.invalidate(&key)).is_applied());
        prop_assert!(rt.block_on(cache.invalidate(&key)).is_applied());
        prop_assert!(rt.block_on(cache.store().get(&key)).expect("memory get").is_none());
    }

    #[test]
    fn prop_bounded_ttls_are_accepted(ttl in arb_ttl(), snapshot in arb_snapshot()) {
        let rt = runtime();
        let store = InMemoryCacheStore::new(ttl).expect("ttl within bounds");
        prop_assert_eq!(store.ttl(), ttl);

        let cache = ReadThroughCache::new(Arc::new(store));
        let key = widget_key("u1");
        let source = CountingSource::new();
        source.put(&key, snapshot.clone());

        rt.block_on(cache.fetch_collection::<Widget, _>(&key, &source)).expect("miss");
        let hit = rt
            .block_on(cache.fetch_collection::<Widget, _>(&key, &source))
            .expect("hit");
        prop_assert!(hit.was_cache_hit());
        prop_assert_eq!(hit.into_value(), snapshot);
    }
}
