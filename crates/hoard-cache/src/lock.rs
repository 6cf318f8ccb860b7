//! Distributed lock over one or more key-value stores.
//!
//! Acquisition writes a random token with `SET NX PX` on every store and
//! succeeds once a majority accepted it while enough of the TTL remains.
//! Release only removes keys that still carry the caller's token.

use crate::store::KeyValueStore;
use crate::{CacheError, CacheResult};
use hoard_config::LockConfig;
use rand::Rng;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, warn};
use uuid::Uuid;

/// Fixed clock drift allowance added to the proportional part.
const DRIFT_FLOOR: Duration = Duration::from_millis(2);

/// Lock timing and retry settings.
#[derive(Debug, Clone)]
pub struct LockSettings {
    /// Attempts after the first; negative retries forever.
    pub retry_count: i32,
    /// Base wait between attempts.
    pub retry_delay: Duration,
    /// Upper bound of random extra wait.
    pub retry_jitter: Duration,
    /// Lock lifetime.
    pub ttl: Duration,
}

impl Default for LockSettings {
    fn default() -> Self {
        Self::from(&LockConfig::default())
    }
}

impl From<&LockConfig> for LockSettings {
    fn from(config: &LockConfig) -> Self {
        Self {
            retry_count: config.retry_count,
            retry_delay: config.retry_delay(),
            retry_jitter: config.retry_jitter(),
            ttl: config.ttl(),
        }
    }
}

impl LockSettings {
    /// Clock drift allowance: 1% of the TTL plus two milliseconds.
    #[must_use]
    pub fn drift(&self) -> Duration {
        self.ttl / 100 + DRIFT_FLOOR
    }

    fn ttl_ms(&self) -> u64 {
        u64::try_from(self.ttl.as_millis()).unwrap_or(u64::MAX).max(1)
    }

    fn may_retry(&self, attempts: u32) -> bool {
        match u32::try_from(self.retry_count) {
            Ok(retries) => attempts <= retries,
            Err(_) => true,
        }
    }

    fn next_wait(&self) -> Duration {
        let jitter_ms = u64::try_from(self.retry_jitter.as_millis()).unwrap_or(u64::MAX);
        let extra = if jitter_ms == 0 {
            0
        } else {
            rand::thread_rng().gen_range(0..jitter_ms)
        };
        self.retry_delay + Duration::from_millis(extra)
    }
}

/// Quorum lock manager.
#[derive(Clone)]
pub struct LockManager {
    stores: Vec<Arc<dyn KeyValueStore>>,
    settings: LockSettings,
}

impl LockManager {
    /// Create a manager over several independent stores.
    pub fn new(stores: Vec<Arc<dyn KeyValueStore>>, settings: LockSettings) -> Self {
        Self { stores, settings }
    }

    /// Create a manager over a single store.
    pub fn single(store: Arc<dyn KeyValueStore>, settings: LockSettings) -> Self {
        Self::new(vec![store], settings)
    }

    /// Lock settings in use.
    #[must_use]
    pub fn settings(&self) -> &LockSettings {
        &self.settings
    }

    /// Stores that must accept an acquisition.
    #[must_use]
    pub fn quorum(&self) -> usize {
        self.stores.len() / 2 + 1
    }

    /// Acquire the lock stored under `key`.
    ///
    /// Returns [`CacheError::LockUnavailable`] as soon as fewer than a
    /// quorum of stores answer, and [`CacheError::LockContended`] once every
    /// configured attempt found the lock held elsewhere.
    pub async fn acquire(&self, key: &str) -> CacheResult<LockGuard> {
        let token = Uuid::new_v4().to_string();
        let ttl_ms = self.settings.ttl_ms();
        let quorum = self.quorum();
        let mut attempts: u32 = 0;

        loop {
            attempts += 1;
            let started = Instant::now();
            let mut acquired = 0;
            let mut answered = 0;
            let mut last_error = None;

            for store in &self.stores {
                match store.set_nx_px(key, &token, ttl_ms).await {
                    Ok(won) => {
                        answered += 1;
                        acquired += usize::from(won);
                    }
                    Err(e) => {
                        debug!(lock = %key, store = store.name(), error = %e, "Lock store did not answer");
                        last_error = Some(e);
                    }
                }
            }

            let validity = self
                .settings
                .ttl
                .checked_sub(started.elapsed() + self.settings.drift())
                .filter(|v| !v.is_zero());

            if let (true, Some(validity)) = (acquired >= quorum, validity) {
                debug!(lock = %key, attempts, validity_ms = validity.as_millis() as u64, "Lock acquired");
                return Ok(LockGuard {
                    key: key.to_string(),
                    token,
                    stores: self.stores.clone(),
                    validity,
                });
            }

            if acquired > 0 {
                self.release_partial(key, &token).await;
            }

            if answered < quorum {
                let reason = last_error.map_or_else(
                    || format!("only {} of {} lock stores answered", answered, self.stores.len()),
                    |e| e.to_string(),
                );
                return Err(CacheError::LockUnavailable {
                    key: key.to_string(),
                    reason,
                });
            }

            if !self.settings.may_retry(attempts) {
                return Err(CacheError::LockContended {
                    key: key.to_string(),
                    attempts,
                });
            }

            tokio::time::sleep(self.settings.next_wait()).await;
        }
    }

    async fn release_partial(&self, key: &str, token: &str) {
        for store in &self.stores {
            if let Err(e) = store.del_if_eq(key, token).await {
                debug!(lock = %key, store = store.name(), error = %e, "Failed to undo partial lock");
            }
        }
    }
}

/// Held lock. Dropping it without [`LockGuard::release`] leaves the lock to
/// expire on its TTL.
#[must_use = "an unreleased lock stays held until its TTL expires"]
pub struct LockGuard {
    key: String,
    token: String,
    stores: Vec<Arc<dyn KeyValueStore>>,
    validity: Duration,
}

impl std::fmt::Debug for LockGuard {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LockGuard")
            .field("key", &self.key)
            .field("token", &self.token)
            .field("validity", &self.validity)
            .finish_non_exhaustive()
    }
}

impl LockGuard {
    /// Lock key.
    #[must_use]
    pub fn key(&self) -> &str {
        &self.key
    }

    /// Owner token written to the stores.
    #[must_use]
    pub fn token(&self) -> &str {
        &self.token
    }

    /// Time the lock was guaranteed held for at acquisition.
    #[must_use]
    pub fn validity(&self) -> Duration {
        self.validity
    }

    /// Remove the lock from every store that still holds our token.
    pub async fn release(self) -> CacheResult<()> {
        let mut removed = 0;
        let mut failures = Vec::new();

        for store in &self.stores {
            match store.del_if_eq(&self.key, &self.token).await {
                Ok(true) => removed += 1,
                Ok(false) => {}
                Err(e) => failures.push(format!("{}: {}", store.name(), e)),
            }
        }

        if !failures.is_empty() {
            return Err(CacheError::LockReleaseFailure {
                key: self.key,
                reason: failures.join("; "),
            });
        }

        if removed == 0 {
            warn!(lock = %self.key, "Lock expired before release");
        } else {
            debug!(lock = %self.key, "Lock released");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::MemoryStore;

    fn settings(retry_count: i32) -> LockSettings {
        LockSettings {
            retry_count,
            retry_delay: Duration::from_millis(50),
            retry_jitter: Duration::from_millis(10),
            ttl: Duration::from_secs(5),
        }
    }

    fn stores(n: usize) -> Vec<Arc<MemoryStore>> {
        (0..n).map(|i| Arc::new(MemoryStore::named(format!("m{}", i)))).collect()
    }

    fn manager(stores: &[Arc<MemoryStore>], retry_count: i32) -> LockManager {
        let dyn_stores = stores
            .iter()
            .map(|s| Arc::clone(s) as Arc<dyn KeyValueStore>)
            .collect();
        LockManager::new(dyn_stores, settings(retry_count))
    }

    #[test]
    fn test_drift_and_quorum() {
        let s = settings(0);
        assert_eq!(s.drift(), Duration::from_millis(52));
        assert_eq!(manager(&stores(1), 0).quorum(), 1);
        assert_eq!(manager(&stores(3), 0).quorum(), 2);
        assert_eq!(manager(&stores(4), 0).quorum(), 3);
    }

    #[test]
    fn test_retry_budget() {
        assert!(settings(2).may_retry(2));
        assert!(!settings(2).may_retry(3));
        assert!(!settings(0).may_retry(1));
        assert!(settings(-1).may_retry(u32::MAX));
    }

    #[tokio::test(start_paused = true)]
    async fn test_acquire_and_release() {
        let s = stores(1);
        let locks = manager(&s, 0);

        let guard = locks.acquire("k:lock").await.unwrap();
        assert!(s[0].contains("k:lock"));
        assert!(guard.validity() > Duration::ZERO);

        guard.release().await.unwrap();
        assert!(!s[0].contains("k:lock"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_contended_after_retries() {
        let s = stores(1);
        let locks = manager(&s, 2);
        let _held = locks.acquire("k:lock").await.unwrap();

        let err = locks.acquire("k:lock").await.unwrap_err();
        assert!(matches!(err, CacheError::LockContended { attempts: 3, .. }));
    }

    #[tokio::test(start_paused = true)]
    async fn test_unavailable_fails_fast() {
        let s = stores(1);
        s[0].set_available(false);
        let locks = manager(&s, 5);

        let err = locks.acquire("k:lock").await.unwrap_err();
        assert!(matches!(err, CacheError::LockUnavailable { .. }));
        assert_eq!(s[0].calls(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_quorum_tolerates_minority_outage() {
        let s = stores(3);
        s[2].set_available(false);
        let locks = manager(&s, 0);
        let guard = locks.acquire("k:lock").await.unwrap();
        let released = guard.release().await;
        assert!(matches!(released, Err(CacheError::LockReleaseFailure { .. })));

        s[1].set_available(false);
        let err = locks.acquire("k:lock").await.unwrap_err();
        assert!(matches!(err, CacheError::LockUnavailable { .. }));
    }

    #[tokio::test(start_paused = true)]
    async fn test_partial_acquisition_is_undone() {
        let s = stores(3);
        s[0].set_nx_px("k:lock", "other", 5_000).await.unwrap();
        s[1].set_nx_px("k:lock", "other", 5_000).await.unwrap();

        let err = manager(&s, 0).acquire("k:lock").await.unwrap_err();
        assert!(matches!(err, CacheError::LockContended { .. }));
        assert!(!s[2].contains("k:lock"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_unlimited_retries_wait_for_holder() {
        let s = stores(1);
        let locks = manager(&s, -1);
        let held = locks.acquire("k:lock").await.unwrap();

        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(1)).await;
            held.release().await.unwrap();
        });

        let guard = locks.acquire("k:lock").await.unwrap();
        guard.release().await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_release_after_expiry_keeps_new_owner() {
        let s = stores(1);
        let locks = manager(&s, 0);
        let stale = locks.acquire("k:lock").await.unwrap();

        tokio::time::advance(Duration::from_secs(6)).await;
        let fresh = locks.acquire("k:lock").await.unwrap();

        stale.release().await.unwrap();
        assert!(s[0].contains("k:lock"));
        fresh.release().await.unwrap();
    }
}
