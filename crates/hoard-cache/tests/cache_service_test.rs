//! Cache service behaviour against the in-memory store.

mod common;

use common::{test_config, TestCache};
use hoard_cache::{CacheService, ConnectionState, KeyContext, KeyValueStore, MemoryStore, Ttl};
use hoard_config::CacheConfig;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct Product {
    id: u64,
    name: String,
    price_cents: i64,
}

fn product(id: u64) -> Product {
    Product {
        id,
        name: format!("product-{}", id),
        price_cents: 1_999,
    }
}

#[tokio::test(start_paused = true)]
async fn test_round_trip_until_ttl_elapses() {
    let t = TestCache::new().await;
    let key = t.cache.keys().entry(["products", "1"]);

    t.cache.set(&key, &product(1), Some(Ttl::from_secs(30).unwrap())).await;
    assert_eq!(t.cache.get::<Product>(&key).await, Some(product(1)));

    tokio::time::advance(Duration::from_secs(29)).await;
    assert_eq!(t.cache.get::<Product>(&key).await, Some(product(1)));

    tokio::time::advance(Duration::from_secs(1)).await;
    assert_eq!(t.cache.get::<Product>(&key).await, None);
}

#[tokio::test]
async fn test_overwrite_replaces_value() {
    let t = TestCache::new().await;

    t.cache.set("test:k", &1u32, None).await;
    t.cache.set("test:k", &2u32, None).await;
    assert_eq!(t.cache.get::<u32>("test:k").await, Some(2));
}

#[tokio::test]
async fn test_del_removes_entry() {
    let t = TestCache::new().await;

    t.cache.set("test:k", "v", None).await;
    t.cache.del("test:k").await;
    assert_eq!(t.cache.get::<String>("test:k").await, None);

    // Absent key
    t.cache.del("test:never").await;
    assert_eq!(t.cache.state(), ConnectionState::Ready);
}

#[tokio::test]
async fn test_corrupt_entry_reads_as_miss() {
    let t = TestCache::new().await;
    t.store.set_ex("test:raw", "{not an envelope", 60).await.unwrap();
    t.store.set_ex("test:plain", "\"hello\"", 60).await.unwrap();

    assert_eq!(t.cache.get::<String>("test:raw").await, None);
    assert_eq!(t.cache.get::<String>("test:plain").await, None);
    assert_eq!(t.cache.state(), ConnectionState::Ready);
}

#[tokio::test]
async fn test_type_mismatch_reads_as_miss() {
    let t = TestCache::new().await;
    t.cache.set("test:k", "text", None).await;
    assert_eq!(t.cache.get::<u64>("test:k").await, None);
}

#[tokio::test]
async fn test_del_by_pattern_removes_only_matches() {
    let t = TestCache::new().await;

    for i in 0..40 {
        t.cache.set(&format!("test:users:{}", i), &i, None).await;
    }
    for key in ["test:orders:1", "test:usersX", "other:users:1", "test:users"] {
        t.cache.set(key, &0, None).await;
    }

    let deleted = t.cache.del_by_pattern("test:users:*").await;
    assert_eq!(deleted, 40);

    for i in 0..40 {
        assert!(!t.store.contains(&format!("test:users:{}", i)));
    }
    for key in ["test:orders:1", "test:usersX", "other:users:1", "test:users"] {
        assert!(t.store.contains(key), "{} should survive", key);
    }
}

#[tokio::test]
async fn test_del_by_pattern_without_matches() {
    let t = TestCache::new().await;
    t.cache.set("test:a", &1, None).await;

    assert_eq!(t.cache.del_by_pattern("test:b:*").await, 0);
    assert!(t.store.contains("test:a"));
}

#[tokio::test]
async fn test_evict_tag_keeps_other_tags() {
    let t = TestCache::new().await;
    let k = t.cache.keys().entry(["products", "1"]);
    let other = t.cache.keys().entry(["products", "2"]);

    t.cache.set(&k, &product(1), None).await;
    t.cache.set(&other, &product(2), None).await;
    t.cache.set_tags(&k, &["catalog", "featured"]).await;
    t.cache.set_tags(&other, &["featured"]).await;

    let deleted = t.cache.evict_tags(&["catalog"]).await;
    assert_eq!(deleted, 2);

    assert!(!t.store.contains(&k));
    assert!(!t.store.contains("test:tag:catalog"));
    assert_eq!(t.cache.get::<Product>(&other).await, Some(product(2)));

    let featured = t.store.smembers_many(&["test:tag:featured".to_string()]).await.unwrap();
    assert_eq!(featured[0], vec![k.clone(), other.clone()]);
}

#[tokio::test]
async fn test_evict_several_tags_in_one_call() {
    let t = TestCache::new().await;
    for (key, tag) in [("test:a", "x"), ("test:b", "y"), ("test:c", "x")] {
        t.cache.set(key, &1, None).await;
        t.cache.set_tags(key, &[tag]).await;
    }
    t.cache.set_tags("test:a", &["y"]).await;

    let deleted = t.cache.evict_tags(&["x", "y"]).await;
    assert_eq!(deleted, 5);
    assert!(t.store.is_empty());
}

#[tokio::test]
async fn test_evict_unused_tag() {
    let t = TestCache::new().await;
    assert_eq!(t.cache.evict_tags(&["unused"]).await, 0);
    assert_eq!(t.cache.state(), ConnectionState::Ready);
}

#[tokio::test]
async fn test_set_tags_is_idempotent() {
    let t = TestCache::new().await;
    t.cache.set_tags("test:a", &["x"]).await;
    t.cache.set_tags("test:a", &["x"]).await;

    let members = t.store.smembers_many(&["test:tag:x".to_string()]).await.unwrap();
    assert_eq!(members[0], vec!["test:a".to_string()]);

    let calls = t.calls();
    t.cache.set_tags::<&str>("test:a", &[]).await;
    assert_eq!(t.calls(), calls);
}

#[tokio::test]
async fn test_mget_preserves_order_and_misses() {
    let t = TestCache::new().await;
    t.cache.set("test:1", &product(1), None).await;
    t.cache.set("test:3", &product(3), None).await;
    t.store.set_ex("test:4", "garbage", 60).await.unwrap();

    let values = t
        .cache
        .mget::<Product, _>(&["test:3", "test:2", "test:1", "test:4"])
        .await;
    assert_eq!(values, vec![Some(product(3)), None, Some(product(1)), None]);
}

#[tokio::test]
async fn test_mget_empty_input_skips_store() {
    let t = TestCache::new().await;
    let calls = t.calls();

    let values = t.cache.mget::<u32, String>(&[]).await;
    assert!(values.is_empty());
    assert_eq!(t.calls(), calls);
}

#[tokio::test]
async fn test_disabled_cache_never_touches_store() {
    let store = Arc::new(MemoryStore::new());
    let cache = CacheService::with_store(CacheConfig::disabled(), Arc::clone(&store) as Arc<dyn KeyValueStore>).unwrap();
    cache.start().await.unwrap();

    assert!(!cache.is_enabled());
    assert_eq!(cache.state(), ConnectionState::Uninitialized);

    cache.set("k", &1u32, None).await;
    assert_eq!(cache.get::<u32>("k").await, None);
    cache.del("k").await;
    assert_eq!(cache.del_by_pattern("*").await, 0);
    assert_eq!(cache.mget::<u32, _>(&["a", "b"]).await, vec![None, None]);
    cache.set_tags("k", &["t"]).await;
    assert_eq!(cache.evict_tags(&["t"]).await, 0);
    assert_eq!(cache.with_lock("k", || async { 7 }).await.unwrap(), 7);
    assert!(cache.health_check().await.is_err());

    assert_eq!(store.calls(), 0);
    cache.stop().await;
    assert_eq!(store.calls(), 0);
    assert_eq!(cache.state(), ConnectionState::Uninitialized);
}

#[tokio::test]
async fn test_outage_degrades_to_empty_results() {
    let t = TestCache::new().await;
    t.cache.set("test:a", &1u32, None).await;
    t.cache.set_tags("test:a", &["x"]).await;

    t.store.set_available(false);

    assert_eq!(t.cache.get::<u32>("test:a").await, None);
    assert_eq!(t.cache.state(), ConnectionState::Degraded);
    t.cache.set("test:b", &2u32, None).await;
    t.cache.del("test:a").await;
    assert_eq!(t.cache.del_by_pattern("test:*").await, 0);
    assert_eq!(t.cache.mget::<u32, _>(&["test:a", "test:b"]).await, vec![None, None]);
    assert_eq!(t.cache.evict_tags(&["x"]).await, 0);

    t.store.set_available(true);
    assert_eq!(t.cache.get::<u32>("test:a").await, Some(1));
    assert_eq!(t.cache.state(), ConnectionState::Ready);
}

#[tokio::test]
async fn test_get_or_set_computes_once() {
    let t = TestCache::new().await;
    let computed = AtomicU32::new(0);

    for _ in 0..3 {
        let value: Result<Product, std::convert::Infallible> = t
            .cache
            .get_or_set("test:p:9", None, || async {
                computed.fetch_add(1, Ordering::SeqCst);
                Ok(product(9))
            })
            .await;
        assert_eq!(value.unwrap(), product(9));
    }

    assert_eq!(computed.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_get_or_set_surfaces_factory_error_only() {
    let t = TestCache::new().await;

    let err = t
        .cache
        .get_or_set::<u32, _, _, _>("test:x", None, || async { Err("backend down") })
        .await
        .unwrap_err();
    assert_eq!(err, "backend down");
    assert!(!t.store.contains("test:x"));

    t.store.set_available(false);
    let value = t
        .cache
        .get_or_set::<u32, (), _, _>("test:x", None, || async { Ok(5) })
        .await;
    assert_eq!(value, Ok(5));
}

#[tokio::test]
async fn test_scoped_keys_follow_config() {
    let t = TestCache::new().await;
    let ctx = KeyContext {
        path: "/products",
        query: Some("page=1"),
        user_id: Some("u7"),
    };
    let key = t.cache.keys().scoped(&ctx);
    assert_eq!(key, "test:route:global:/products");

    t.cache.set(&key, &vec![product(1)], None).await;
    assert_eq!(t.cache.get::<Vec<Product>>(&key).await, Some(vec![product(1)]));
}

#[tokio::test]
async fn test_new_without_store_uses_config() {
    let config = CacheConfig {
        enabled: false,
        ..test_config()
    };
    let cache = CacheService::new(config).unwrap();
    cache.start().await.unwrap();
    assert_eq!(cache.keys().prefix(), "test");
    assert_eq!(cache.get::<u32>("test:a").await, None);
}
