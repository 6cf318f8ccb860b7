//! Key-value store abstraction.
//!
//! The cache service talks to the store only through [`KeyValueStore`], so a
//! Redis pool in production and an in-process map in tests are
//! interchangeable.

mod glob;
mod memory;
mod redis_store;

pub use glob::{glob_match, RedisGlob};
pub use memory::MemoryStore;
pub use redis_store::RedisStore;

use crate::CacheResult;
use async_trait::async_trait;
use std::collections::BTreeSet;

/// One step of a cursor-based key scan.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScanPage {
    /// Cursor for the next step; `0` when the scan is complete.
    pub cursor: u64,
    /// Keys returned by this step. May repeat keys from earlier steps.
    pub keys: Vec<String>,
}

/// Commands the cache service needs from its backing store.
#[async_trait]
pub trait KeyValueStore: Send + Sync {
    /// Short human-readable identifier for logs.
    fn name(&self) -> &str;

    /// Round-trip check.
    async fn ping(&self) -> CacheResult<()>;

    /// Read one string value.
    async fn get(&self, key: &str) -> CacheResult<Option<String>>;

    /// Read many string values, preserving input order.
    async fn mget(&self, keys: &[String]) -> CacheResult<Vec<Option<String>>>;

    /// Write a string value with an expiry in seconds.
    async fn set_ex(&self, key: &str, value: &str, ttl_secs: u64) -> CacheResult<()>;

    /// Delete keys in one atomic batch, returning how many existed.
    async fn del(&self, keys: &[String]) -> CacheResult<u64>;

    /// One incremental `SCAN` step.
    async fn scan(&self, cursor: u64, pattern: &str, count: usize) -> CacheResult<ScanPage>;

    /// Add `(set, member)` pairs in one pipeline.
    async fn sadd_many(&self, entries: &[(String, String)]) -> CacheResult<()>;

    /// Read the members of each set in one pipeline, preserving input order.
    async fn smembers_many(&self, keys: &[String]) -> CacheResult<Vec<Vec<String>>>;

    /// Set `key` to `value` only if absent, expiring after `ttl_ms`.
    async fn set_nx_px(&self, key: &str, value: &str, ttl_ms: u64) -> CacheResult<bool>;

    /// Delete `key` only if it still holds `value`.
    async fn del_if_eq(&self, key: &str, value: &str) -> CacheResult<bool>;

    /// Release connections. Further calls fail.
    async fn close(&self);
}

/// Runs a full cursor scan for `pattern`, returning each matching key once.
pub async fn scan_all(store: &dyn KeyValueStore, pattern: &str, count: usize) -> CacheResult<Vec<String>> {
    let mut cursor = 0;
    let mut found = BTreeSet::new();

    loop {
        let page = store.scan(cursor, pattern, count).await?;
        found.extend(page.keys);

        cursor = page.cursor;
        if cursor == 0 {
            break;
        }
    }

    Ok(found.into_iter().collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_scan_all_walks_every_page() {
        let store = MemoryStore::new();
        for i in 0..25 {
            store.set_ex(&format!("a:{}", i), "v", 60).await.unwrap();
        }
        store.set_ex("b:1", "v", 60).await.unwrap();

        let keys = scan_all(&store, "a:*", 4).await.unwrap();
        assert_eq!(keys.len(), 25);
        assert!(keys.iter().all(|k| k.starts_with("a:")));
    }

    #[tokio::test]
    async fn test_scan_all_no_matches() {
        let store = MemoryStore::new();
        store.set_ex("b:1", "v", 60).await.unwrap();

        let keys = scan_all(&store, "a:*", 10).await.unwrap();
        assert!(keys.is_empty());
    }
}
