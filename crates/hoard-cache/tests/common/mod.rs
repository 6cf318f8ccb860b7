//! Shared setup for cache service integration tests.

#![allow(dead_code)]

use hoard_cache::{CacheService, KeyValueStore, MemoryStore};
use hoard_config::{CacheConfig, LockConfig};
use std::sync::Arc;

/// A started cache service over an in-memory store.
pub struct TestCache {
    pub store: Arc<MemoryStore>,
    pub cache: CacheService,
}

impl TestCache {
    /// Starts a service with [`test_config`].
    pub async fn new() -> Self {
        Self::with_config(test_config()).await
    }

    /// Starts a service with the given configuration.
    pub async fn with_config(config: CacheConfig) -> Self {
        let store = Arc::new(MemoryStore::new());
        let cache = CacheService::with_store(config, Arc::clone(&store) as Arc<dyn KeyValueStore>)
            .expect("valid cache config");
        cache.start().await.expect("cache start");
        Self { store, cache }
    }

    /// Number of store commands issued so far.
    pub fn calls(&self) -> u64 {
        self.store.calls()
    }
}

/// Small scan pages and fast lock retries.
pub fn test_config() -> CacheConfig {
    CacheConfig {
        key_prefix: "test".to_string(),
        scan_count: 3,
        lock: LockConfig {
            retry_count: 20,
            retry_delay_ms: 50,
            retry_jitter_ms: 10,
            ttl_ms: 2_000,
            fail_closed: false,
        },
        ..Default::default()
    }
}
