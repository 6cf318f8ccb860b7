//! Keyed cache service.
//!
//! Every public operation goes through one gate, `active_store`, which
//! yields nothing when caching is disabled, not started or stopped.
//! Read and write failures are logged and swallowed; only the lock, the
//! lifecycle and the health check report errors to the caller.

use crate::entry::{self, Ttl};
use crate::lock::{LockManager, LockSettings};
use crate::log_guard::ErrorLogGuard;
use crate::metrics::CacheMetrics;
use crate::state::{ConnectionState, StateCell};
use crate::store::{scan_all, KeyValueStore, RedisStore};
use crate::{CacheError, CacheKeys, CacheResult};
use futures::FutureExt;
use hoard_config::CacheConfig;
use parking_lot::{Mutex, RwLock};
use serde::{de::DeserializeOwned, Serialize};
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, error, info, warn};

/// Shortest health probe period.
const MIN_PROBE_INTERVAL: Duration = Duration::from_secs(1);

/// Keyed cache over a shared store.
///
/// Cloning is cheap; clones share the connection and lifecycle.
#[derive(Clone)]
pub struct CacheService {
    inner: Arc<Inner>,
}

struct Inner {
    config: CacheConfig,
    keys: CacheKeys,
    default_ttl: Ttl,
    lock_settings: LockSettings,
    store: RwLock<Option<Arc<dyn KeyValueStore>>>,
    state: StateCell,
    log_guard: ErrorLogGuard,
    metrics: CacheMetrics,
    probe: Mutex<Option<JoinHandle<()>>>,
}

impl std::fmt::Debug for CacheService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CacheService").finish_non_exhaustive()
    }
}

impl CacheService {
    /// Create a service that connects to the configured Redis URL on
    /// [`CacheService::start`].
    pub fn new(config: CacheConfig) -> CacheResult<Self> {
        Self::build(config, None)
    }

    /// Create a service over an existing store.
    pub fn with_store(config: CacheConfig, store: Arc<dyn KeyValueStore>) -> CacheResult<Self> {
        Self::build(config, Some(store))
    }

    fn build(config: CacheConfig, store: Option<Arc<dyn KeyValueStore>>) -> CacheResult<Self> {
        let default_ttl = Ttl::from_secs(config.default_ttl_secs)
            .map_err(|_| CacheError::Configuration("default_ttl_secs must be positive".to_string()))?;

        Ok(Self {
            inner: Arc::new(Inner {
                keys: CacheKeys::from_config(&config),
                default_ttl,
                lock_settings: LockSettings::from(&config.lock),
                store: RwLock::new(store),
                state: StateCell::default(),
                log_guard: ErrorLogGuard::new(config.error_window(), config.reconnect_notice_interval()),
                metrics: CacheMetrics::new(config.metrics_enabled),
                probe: Mutex::new(None),
                config,
            }),
        })
    }

    /// Whether caching is switched on in configuration.
    #[must_use]
    pub fn is_enabled(&self) -> bool {
        self.inner.config.enabled
    }

    /// Current connection state.
    #[must_use]
    pub fn state(&self) -> ConnectionState {
        self.inner.state.get()
    }

    /// Key builder for this service's namespace.
    #[must_use]
    pub fn keys(&self) -> &CacheKeys {
        &self.inner.keys
    }

    /// The configuration the service was built with.
    #[must_use]
    pub fn config(&self) -> &CacheConfig {
        &self.inner.config
    }

    /// Connect to the store and start the background health probe.
    ///
    /// An unreachable store is not an error: the service starts degraded and
    /// the probe keeps retrying. Only an invalid store configuration fails.
    pub async fn start(&self) -> CacheResult<()> {
        let inner = &self.inner;

        if !inner.config.enabled {
            info!("Cache disabled; all cache operations are no-ops");
            return Ok(());
        }

        if inner.state.transition(ConnectionState::Starting).is_none() {
            debug!(state = %self.state(), "Cache service already started");
            return Ok(());
        }

        let existing = inner.store.read().clone();
        let store = match existing {
            Some(store) => store,
            None => match RedisStore::connect(&inner.config) {
                Ok(store) => {
                    let store: Arc<dyn KeyValueStore> = Arc::new(store);
                    *inner.store.write() = Some(Arc::clone(&store));
                    store
                }
                Err(e) => {
                    inner.state.transition(ConnectionState::Closed);
                    error!(error = %e, "Failed to create cache store");
                    return Err(e);
                }
            },
        };

        info!(store = store.name(), prefix = inner.keys.prefix(), "Connecting to cache store");

        match store.ping().await {
            Ok(()) => {
                inner.state.transition(ConnectionState::Ready);
                info!(store = store.name(), "Cache store ready");
            }
            Err(e) => {
                inner.state.transition(ConnectionState::Degraded);
                inner.log_guard.report("connect", &e);
                warn!("Cache starting degraded; operations fail soft until the store answers");
            }
        }
        inner.metrics.state(self.state());

        self.spawn_probe();
        Ok(())
    }

    /// Stop the health probe and close the store. Idempotent.
    ///
    /// A disabled service has nothing to stop and stays `Uninitialized`.
    pub async fn stop(&self) {
        let inner = &self.inner;
        if !inner.config.enabled {
            return;
        }

        if let Some(handle) = inner.probe.lock().take() {
            handle.abort();
        }

        if inner.state.transition(ConnectionState::Closed).is_none() {
            return;
        }

        let store = inner.store.write().take();
        if let Some(store) = store {
            store.close().await;
            info!(store = store.name(), "Cache store closed");
        }
        inner.metrics.state(ConnectionState::Closed);
    }

    /// Round-trip to the store.
    pub async fn health_check(&self) -> CacheResult<()> {
        let store = self.active_store().ok_or(CacheError::Disabled)?;
        self.inner.call("ping", store.ping()).await
    }

    /// Read and decode one entry. Missing, corrupt and unreachable all read
    /// as `None`.
    pub async fn get<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        let store = self.active_store()?;
        let inner = &self.inner;

        let raw = inner.call("get", store.get(key)).await.ok().flatten();
        let value = raw.and_then(|raw| inner.decode(key, &raw));

        match &value {
            Some(_) => inner.metrics.lookups(1, 0),
            None => inner.metrics.lookups(0, 1),
        }
        value
    }

    /// Store `value` under `key`. `None` uses the configured default TTL.
    pub async fn set<T: Serialize + ?Sized>(&self, key: &str, value: &T, ttl: Option<Ttl>) {
        let Some(store) = self.active_store() else {
            return;
        };
        let inner = &self.inner;

        let raw = match entry::encode(value) {
            Ok(raw) => raw,
            Err(e) => {
                inner.fail("set", &e);
                return;
            }
        };

        let ttl = ttl.unwrap_or(inner.default_ttl);
        let _ = inner.call("set", store.set_ex(key, &raw, ttl.as_secs())).await;
    }

    /// Remove `key`. A missing key is not an error.
    pub async fn del(&self, key: &str) {
        let Some(store) = self.active_store() else {
            return;
        };
        let _ = self.inner.call("del", store.del(&[key.to_string()])).await;
    }

    /// Remove every key matching the glob `pattern`, returning how many were
    /// removed.
    ///
    /// Keys are collected with incremental `SCAN` steps and removed in one
    /// batch; keys written during the scan may survive.
    pub async fn del_by_pattern(&self, pattern: &str) -> u64 {
        let Some(store) = self.active_store() else {
            return 0;
        };
        let inner = &self.inner;

        let Ok(keys) = inner
            .call("del_by_pattern", scan_all(store.as_ref(), pattern, inner.config.scan_count))
            .await
        else {
            return 0;
        };

        if keys.is_empty() {
            debug!(pattern, "No keys match pattern");
            return 0;
        }

        let deleted = inner.call("del_by_pattern", store.del(&keys)).await.unwrap_or(0);
        inner.metrics.evicted("pattern", deleted);
        debug!(pattern, matched = keys.len(), deleted, "Deleted keys by pattern");
        deleted
    }

    /// Read many entries, preserving input order and length.
    pub async fn mget<T, S>(&self, keys: &[S]) -> Vec<Option<T>>
    where
        T: DeserializeOwned,
        S: AsRef<str>,
    {
        if keys.is_empty() {
            return Vec::new();
        }

        let misses = || keys.iter().map(|_| None).collect::<Vec<Option<T>>>();

        let Some(store) = self.active_store() else {
            return misses();
        };
        let inner = &self.inner;

        let owned: Vec<String> = keys.iter().map(|k| k.as_ref().to_string()).collect();
        let Ok(raws) = inner.call("mget", store.mget(&owned)).await else {
            inner.metrics.lookups(0, keys.len() as u64);
            return misses();
        };

        let values: Vec<Option<T>> = owned
            .iter()
            .zip(raws)
            .map(|(key, raw)| raw.and_then(|raw| inner.decode(key, &raw)))
            .collect();

        let hits = values.iter().filter(|v| v.is_some()).count() as u64;
        inner.metrics.lookups(hits, values.len() as u64 - hits);
        values
    }

    /// Add `key` to the member set of every tag.
    pub async fn set_tags<S: AsRef<str>>(&self, key: &str, tags: &[S]) {
        if tags.is_empty() {
            return;
        }
        let Some(store) = self.active_store() else {
            return;
        };

        let entries: Vec<(String, String)> = tags
            .iter()
            .map(|tag| (self.inner.keys.tag(tag.as_ref()), key.to_string()))
            .collect();
        let _ = self.inner.call("set_tags", store.sadd_many(&entries)).await;
    }

    /// Remove every key tagged with any of `tags`, plus the tag sets.
    ///
    /// Member keys and tag sets are deleted in one atomic batch. Returns the
    /// number of keys removed, tag sets included.
    pub async fn evict_tags<S: AsRef<str>>(&self, tags: &[S]) -> u64 {
        if tags.is_empty() {
            return 0;
        }
        let Some(store) = self.active_store() else {
            return 0;
        };
        let inner = &self.inner;

        let tag_keys: Vec<String> = tags.iter().map(|tag| inner.keys.tag(tag.as_ref())).collect();

        let Ok(members) = inner.call("evict_tags", store.smembers_many(&tag_keys)).await else {
            return 0;
        };

        let mut doomed: Vec<String> = members.into_iter().flatten().collect();
        doomed.extend(tag_keys.iter().cloned());
        doomed.sort_unstable();
        doomed.dedup();

        let deleted = inner.call("evict_tags", store.del(&doomed)).await.unwrap_or(0);
        inner.metrics.evicted("tags", deleted);
        debug!(tags = tag_keys.len(), deleted, "Evicted tagged keys");
        deleted
    }

    /// Run `work` while holding the distributed lock for `key`.
    ///
    /// The lock is released after `work` completes or panics. If the lock
    /// store is unreachable `work` runs unprotected, unless
    /// `lock.fail_closed` is set. If the lock stays held elsewhere for every
    /// attempt, `work` does not run and [`CacheError::LockContended`] is
    /// returned.
    pub async fn with_lock<T, F, Fut>(&self, key: &str, work: F) -> CacheResult<T>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = T>,
    {
        let Some(store) = self.active_store() else {
            return Ok(work().await);
        };
        let inner = &self.inner;
        let lock_key = CacheKeys::lock(key);

        let locks = LockManager::single(store, inner.lock_settings.clone());
        let guard = match locks.acquire(&lock_key).await {
            Ok(guard) => {
                inner.succeed();
                Some(guard)
            }
            Err(e @ CacheError::LockUnavailable { .. }) => {
                inner.degrade();
                if inner.config.lock.fail_closed {
                    inner.fail("with_lock", &e);
                    return Err(e);
                }
                inner.metrics.error("with_lock", e.label());
                inner.log_guard.report_lock_fallback(&lock_key, &e);
                inner.metrics.lock_fallback();
                None
            }
            Err(e) => {
                debug!(lock = %lock_key, error = %e, "Lock not acquired");
                return Err(e);
            }
        };

        let outcome = AssertUnwindSafe(async move { work().await }).catch_unwind().await;

        if let Some(guard) = guard {
            if let Err(e) = guard.release().await {
                error!(lock = %lock_key, error = %e, "Failed to release lock");
            }
        }

        match outcome {
            Ok(value) => Ok(value),
            Err(panic) => std::panic::resume_unwind(panic),
        }
    }

    /// Return the cached value for `key`, or compute, cache and return it.
    ///
    /// Only `factory` errors are returned; cache failures fall through to
    /// computing the value.
    pub async fn get_or_set<T, E, F, Fut>(&self, key: &str, ttl: Option<Ttl>, factory: F) -> Result<T, E>
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        if let Some(value) = self.get(key).await {
            return Ok(value);
        }

        let value = factory().await?;
        self.set(key, &value, ttl).await;
        Ok(value)
    }

    /// Store handle if store calls should be attempted.
    fn active_store(&self) -> Option<Arc<dyn KeyValueStore>> {
        let inner = &self.inner;
        if !inner.config.enabled || !inner.state.get().is_usable() {
            return None;
        }
        inner.store.read().clone()
    }

    fn spawn_probe(&self) {
        let period = self.inner.config.reconnect_interval().max(MIN_PROBE_INTERVAL);
        let weak: Weak<Inner> = Arc::downgrade(&self.inner);

        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                ticker.tick().await;
                let Some(inner) = weak.upgrade() else {
                    break;
                };
                if !inner.probe_once().await {
                    break;
                }
            }
        });

        *self.inner.probe.lock() = Some(handle);
    }
}

impl Inner {
    /// Runs a store call, tracking its outcome.
    async fn call<T>(&self, operation: &'static str, fut: impl Future<Output = CacheResult<T>>) -> CacheResult<T> {
        let started = Instant::now();
        let result = fut.await;
        self.metrics.operation(operation, started.elapsed());

        match &result {
            Ok(_) => self.succeed(),
            Err(e) => {
                if e.is_transport() {
                    self.degrade();
                }
                self.fail(operation, e);
            }
        }
        result
    }

    fn decode<T: DeserializeOwned>(&self, key: &str, raw: &str) -> Option<T> {
        match entry::decode(raw) {
            Ok(value) => Some(value),
            Err(e) => {
                debug!(key, "Discarding undecodable cache entry");
                self.fail("decode", &e);
                None
            }
        }
    }

    fn fail(&self, operation: &'static str, err: &CacheError) {
        self.metrics.error(operation, err.label());
        self.log_guard.report(operation, err);
    }

    fn succeed(&self) {
        if self.state.transition_from(ConnectionState::Degraded, ConnectionState::Ready) {
            self.log_guard.report_recovered();
            self.metrics.state(ConnectionState::Ready);
        }
    }

    fn degrade(&self) {
        if self.state.transition_from(ConnectionState::Ready, ConnectionState::Degraded) {
            warn!("Cache store connection lost; operations fail soft until it answers");
            self.metrics.state(ConnectionState::Degraded);
        }
    }

    /// One health probe tick. Returns false once the service is closed.
    async fn probe_once(&self) -> bool {
        let state = self.state.get();
        if !state.is_usable() {
            return state != ConnectionState::Closed;
        }

        let store = self.store.read().clone();
        let Some(store) = store else {
            return true;
        };

        if state == ConnectionState::Degraded && self.log_guard.reconnect_notice() {
            info!(
                store = store.name(),
                interval_secs = self.config.reconnect_interval_secs,
                "Attempting to reconnect to cache store"
            );
        }

        let _ = self.call("health_probe", store.ping()).await;
        true
    }
}
