//! In-process store for tests and local development.

use super::{KeyValueStore, RedisGlob, ScanPage};
use crate::{CacheError, CacheResult, TransportKind};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::{BTreeSet, HashMap};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;
use tokio::time::Instant;

#[derive(Debug, Clone)]
enum Value {
    Str(String),
    Set(BTreeSet<String>),
}

#[derive(Debug, Clone)]
struct Slot {
    value: Value,
    expires_at: Option<Instant>,
}

impl Slot {
    fn is_live(&self, now: Instant) -> bool {
        self.expires_at.map_or(true, |at| at > now)
    }
}

/// Map-backed [`KeyValueStore`] with Redis-like expiry and `SCAN` paging.
///
/// Expiry follows `tokio::time`, so paused-clock tests can advance past a
/// TTL. [`MemoryStore::set_available`] simulates an outage: every command
/// then fails with a connection-refused transport error.
#[derive(Debug)]
pub struct MemoryStore {
    name: String,
    entries: Mutex<HashMap<String, Slot>>,
    available: AtomicBool,
    calls: AtomicU64,
}

impl MemoryStore {
    /// Create an empty, reachable store.
    #[must_use]
    pub fn new() -> Self {
        Self::named("memory")
    }

    /// Create an empty store with a name used in logs.
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            entries: Mutex::new(HashMap::new()),
            available: AtomicBool::new(true),
            calls: AtomicU64::new(0),
        }
    }

    /// Toggle simulated reachability.
    pub fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::SeqCst);
    }

    /// Number of commands received, including failed ones.
    #[must_use]
    pub fn calls(&self) -> u64 {
        self.calls.load(Ordering::SeqCst)
    }

    /// Returns true if `key` exists and has not expired.
    #[must_use]
    pub fn contains(&self, key: &str) -> bool {
        let now = Instant::now();
        self.entries.lock().get(key).is_some_and(|slot| slot.is_live(now))
    }

    /// Remaining lifetime of `key`, if it exists and expires.
    #[must_use]
    pub fn expires_in(&self, key: &str) -> Option<Duration> {
        let now = Instant::now();
        self.entries
            .lock()
            .get(key)
            .filter(|slot| slot.is_live(now))
            .and_then(|slot| slot.expires_at)
            .map(|at| at.saturating_duration_since(now))
    }

    /// Number of live keys.
    #[must_use]
    pub fn len(&self) -> usize {
        let now = Instant::now();
        self.entries.lock().values().filter(|slot| slot.is_live(now)).count()
    }

    /// Returns true if no live keys remain.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Counts the command and fails it while the store is unavailable.
    fn check(&self) -> CacheResult<()> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.available.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(CacheError::transport(
                TransportKind::ConnectionRefused,
                format!("{}: Connection refused (os error 111)", self.name),
            ))
        }
    }

    /// Locks the map after dropping expired keys.
    fn live_entries(&self) -> parking_lot::MutexGuard<'_, HashMap<String, Slot>> {
        let now = Instant::now();
        let mut entries = self.entries.lock();
        entries.retain(|_, slot| slot.is_live(now));
        entries
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

fn wrong_type(key: &str) -> CacheError {
    CacheError::Command(format!(
        "WRONGTYPE Operation against a key holding the wrong kind of value: {}",
        key
    ))
}

#[async_trait]
impl KeyValueStore for MemoryStore {
    fn name(&self) -> &str {
        &self.name
    }

    async fn ping(&self) -> CacheResult<()> {
        self.check()
    }

    async fn get(&self, key: &str) -> CacheResult<Option<String>> {
        self.check()?;
        match self.live_entries().get(key).map(|slot| &slot.value) {
            Some(Value::Str(value)) => Ok(Some(value.clone())),
            Some(Value::Set(_)) => Err(wrong_type(key)),
            None => Ok(None),
        }
    }

    async fn mget(&self, keys: &[String]) -> CacheResult<Vec<Option<String>>> {
        self.check()?;
        let entries = self.live_entries();
        // MGET reports non-string keys as missing
        Ok(keys
            .iter()
            .map(|key| match entries.get(key).map(|slot| &slot.value) {
                Some(Value::Str(value)) => Some(value.clone()),
                _ => None,
            })
            .collect())
    }

    async fn set_ex(&self, key: &str, value: &str, ttl_secs: u64) -> CacheResult<()> {
        self.check()?;
        if ttl_secs == 0 {
            return Err(CacheError::Command("ERR invalid expire time in 'setex' command".to_string()));
        }

        self.live_entries().insert(
            key.to_string(),
            Slot {
                value: Value::Str(value.to_string()),
                expires_at: Some(Instant::now() + Duration::from_secs(ttl_secs)),
            },
        );
        Ok(())
    }

    async fn del(&self, keys: &[String]) -> CacheResult<u64> {
        self.check()?;
        let mut entries = self.live_entries();
        let deleted = keys.iter().filter(|key| entries.remove(key.as_str()).is_some()).count();
        Ok(deleted as u64)
    }

    async fn scan(&self, cursor: u64, pattern: &str, count: usize) -> CacheResult<ScanPage> {
        self.check()?;
        let mut keys: Vec<String> = self.live_entries().keys().cloned().collect();
        keys.sort_unstable();

        let start = usize::try_from(cursor).unwrap_or(usize::MAX).min(keys.len());
        let end = start.saturating_add(count.max(1)).min(keys.len());

        let glob = RedisGlob::new(pattern);
        let page = keys[start..end]
            .iter()
            .filter(|key| glob.is_match(key))
            .cloned()
            .collect();
        let next = if end >= keys.len() { 0 } else { end as u64 };

        Ok(ScanPage { cursor: next, keys: page })
    }

    async fn sadd_many(&self, entries: &[(String, String)]) -> CacheResult<()> {
        self.check()?;
        let mut map = self.live_entries();

        if let Some((set, _)) = entries
            .iter()
            .find(|(set, _)| matches!(map.get(set).map(|slot| &slot.value), Some(Value::Str(_))))
        {
            return Err(wrong_type(set));
        }

        for (set, member) in entries {
            let slot = map.entry(set.clone()).or_insert_with(|| Slot {
                value: Value::Set(BTreeSet::new()),
                expires_at: None,
            });
            if let Value::Set(members) = &mut slot.value {
                members.insert(member.clone());
            }
        }
        Ok(())
    }

    async fn smembers_many(&self, keys: &[String]) -> CacheResult<Vec<Vec<String>>> {
        self.check()?;
        let entries = self.live_entries();
        keys.iter()
            .map(|key| match entries.get(key).map(|slot| &slot.value) {
                Some(Value::Set(members)) => Ok(members.iter().cloned().collect()),
                Some(Value::Str(_)) => Err(wrong_type(key)),
                None => Ok(Vec::new()),
            })
            .collect()
    }

    async fn set_nx_px(&self, key: &str, value: &str, ttl_ms: u64) -> CacheResult<bool> {
        self.check()?;
        let mut entries = self.live_entries();
        if entries.contains_key(key) {
            return Ok(false);
        }

        entries.insert(
            key.to_string(),
            Slot {
                value: Value::Str(value.to_string()),
                expires_at: Some(Instant::now() + Duration::from_millis(ttl_ms)),
            },
        );
        Ok(true)
    }

    async fn del_if_eq(&self, key: &str, value: &str) -> CacheResult<bool> {
        self.check()?;
        let mut entries = self.live_entries();
        let holds = matches!(entries.get(key).map(|slot| &slot.value), Some(Value::Str(v)) if v == value);
        if holds {
            entries.remove(key);
        }
        Ok(holds)
    }

    async fn close(&self) {
        self.set_available(false);
    }
}
