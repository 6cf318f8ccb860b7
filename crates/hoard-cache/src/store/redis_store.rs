//! Redis store backed by a `deadpool-redis` connection pool.

use super::{KeyValueStore, ScanPage};
use crate::{CacheError, CacheResult};
use async_trait::async_trait;
use deadpool_redis::{Config, Pool, Runtime};
use hoard_config::CacheConfig;
use redis::AsyncCommands;
use tracing::{debug, info};

/// Keys per `DEL` command inside one atomic batch.
const DEL_CHUNK: usize = 500;

/// Deletes the lock only while it still carries the caller's token.
const RELEASE_SCRIPT: &str = r#"
    if redis.call("get", KEYS[1]) == ARGV[1] then
        return redis.call("del", KEYS[1])
    else
        return 0
    end
"#;

/// Redis-backed store.
///
/// The pool hands out fresh connections after failures, so reconnection is
/// left to the pool; the store never blocks waiting for a dead host longer
/// than the configured wait timeout.
pub struct RedisStore {
    pool: Pool,
    name: String,
    release_script: redis::Script,
}

impl RedisStore {
    /// Create the connection pool. No connection is opened until first use.
    pub fn connect(config: &CacheConfig) -> CacheResult<Self> {
        info!("Creating Redis connection pool for cache...");

        let pool = Config::from_url(&config.url)
            .builder()
            .map_err(|e| CacheError::Configuration(format!("Invalid Redis config: {}", e)))?
            .max_size(config.pool_size)
            .wait_timeout(Some(config.connect_timeout()))
            .create_timeout(Some(config.connect_timeout()))
            .runtime(Runtime::Tokio1)
            .build()
            .map_err(|e| CacheError::Configuration(format!("Failed to create pool: {}", e)))?;

        Ok(Self::from_pool(pool, redacted_host(&config.url)))
    }

    /// Wrap an existing pool.
    pub fn from_pool(pool: Pool, name: impl Into<String>) -> Self {
        Self {
            pool,
            name: name.into(),
            release_script: redis::Script::new(RELEASE_SCRIPT),
        }
    }

    /// Get a connection from the pool.
    async fn conn(&self) -> CacheResult<deadpool_redis::Connection> {
        Ok(self.pool.get().await?)
    }
}

#[async_trait]
impl KeyValueStore for RedisStore {
    fn name(&self) -> &str {
        &self.name
    }

    async fn ping(&self) -> CacheResult<()> {
        let mut conn = self.conn().await?;
        let _: String = redis::cmd("PING").query_async(&mut *conn).await?;
        Ok(())
    }

    async fn get(&self, key: &str) -> CacheResult<Option<String>> {
        let mut conn = self.conn().await?;
        let value: Option<String> = conn.get(key).await?;
        Ok(value)
    }

    async fn mget(&self, keys: &[String]) -> CacheResult<Vec<Option<String>>> {
        if keys.is_empty() {
            return Ok(Vec::new());
        }

        let mut conn = self.conn().await?;
        let values: Vec<Option<String>> = redis::cmd("MGET").arg(keys).query_async(&mut *conn).await?;
        Ok(values)
    }

    async fn set_ex(&self, key: &str, value: &str, ttl_secs: u64) -> CacheResult<()> {
        let mut conn = self.conn().await?;
        let _: () = conn.set_ex(key, value, ttl_secs).await?;
        Ok(())
    }

    async fn del(&self, keys: &[String]) -> CacheResult<u64> {
        if keys.is_empty() {
            return Ok(0);
        }

        let mut conn = self.conn().await?;

        if keys.len() <= DEL_CHUNK {
            let deleted: u64 = conn.del(keys).await?;
            return Ok(deleted);
        }

        // MULTI/EXEC keeps chunked deletes a single batch
        let mut pipe = redis::pipe();
        pipe.atomic();
        for chunk in keys.chunks(DEL_CHUNK) {
            pipe.del(chunk);
        }

        let counts: Vec<u64> = pipe.query_async(&mut *conn).await?;
        let deleted = counts.iter().sum();
        debug!(requested = keys.len(), deleted, "Deleted keys in atomic batch");
        Ok(deleted)
    }

    async fn scan(&self, cursor: u64, pattern: &str, count: usize) -> CacheResult<ScanPage> {
        let mut conn = self.conn().await?;

        let (cursor, keys): (u64, Vec<String>) = redis::cmd("SCAN")
            .arg(cursor)
            .arg("MATCH")
            .arg(pattern)
            .arg("COUNT")
            .arg(count)
            .query_async(&mut *conn)
            .await?;

        Ok(ScanPage { cursor, keys })
    }

    async fn sadd_many(&self, entries: &[(String, String)]) -> CacheResult<()> {
        if entries.is_empty() {
            return Ok(());
        }

        let mut conn = self.conn().await?;
        let mut pipe = redis::pipe();
        for (set, member) in entries {
            pipe.sadd(set, member).ignore();
        }

        let _: () = pipe.query_async(&mut *conn).await?;
        Ok(())
    }

    async fn smembers_many(&self, keys: &[String]) -> CacheResult<Vec<Vec<String>>> {
        if keys.is_empty() {
            return Ok(Vec::new());
        }

        let mut conn = self.conn().await?;
        let mut pipe = redis::pipe();
        for key in keys {
            pipe.smembers(key);
        }

        let members: Vec<Vec<String>> = pipe.query_async(&mut *conn).await?;
        Ok(members)
    }

    async fn set_nx_px(&self, key: &str, value: &str, ttl_ms: u64) -> CacheResult<bool> {
        let mut conn = self.conn().await?;

        let result: Option<String> = redis::cmd("SET")
            .arg(key)
            .arg(value)
            .arg("NX")
            .arg("PX")
            .arg(ttl_ms)
            .query_async(&mut *conn)
            .await?;

        Ok(result.is_some())
    }

    async fn del_if_eq(&self, key: &str, value: &str) -> CacheResult<bool> {
        let mut conn = self.conn().await?;

        let removed: i32 = self
            .release_script
            .key(key)
            .arg(value)
            .invoke_async(&mut *conn)
            .await?;

        Ok(removed > 0)
    }

    async fn close(&self) {
        self.pool.close();
        debug!(store = %self.name, "Redis pool closed");
    }
}

/// Host part of a store URL, without credentials, for log fields.
fn redacted_host(url: &str) -> String {
    let without_scheme = url.split_once("://").map_or(url, |(_, rest)| rest);
    let host = without_scheme.rsplit_once('@').map_or(without_scheme, |(_, host)| host);
    host.split('/').next().unwrap_or(host).to_string()
}
