//! Hoard Cache - Keyed Cache Service
//!
//! A single point of access to a shared Redis store with:
//! - Typed get/set with per-entry TTL and fail-soft reads
//! - Non-blocking pattern deletion (cursor based `SCAN`)
//! - Tag groups invalidated in one atomic batch
//! - Per-key distributed locking with best-effort degradation
//! - Connection lifecycle with de-duplicated error logging
//!
//! # Example
//!
//! ```rust,ignore
//! use hoard_cache::{CacheService, Ttl};
//!
//! let cache = CacheService::new(config.cache.clone())?;
//! cache.start().await?;
//!
//! let key = cache.keys().entry(["users", "42"]);
//! cache.set(&key, &user, Some(Ttl::from_secs(60)?)).await;
//! cache.set_tags(&key, &["users"]).await;
//!
//! let reindexed = cache.with_lock("reindex:users", || async { reindex().await }).await?;
//!
//! cache.evict_tags(&["users"]).await;
//! cache.stop().await;
//! ```

pub mod entry;
pub mod error;
pub mod keys;
pub mod lock;
pub mod log_guard;
pub mod metrics;
pub mod service;
pub mod state;
pub mod store;

pub use entry::Ttl;
pub use error::{CacheError, CacheResult, TransportKind};
pub use keys::{CacheKeys, KeyContext};
pub use lock::{LockGuard, LockManager, LockSettings};
pub use log_guard::{ErrorDecision, ErrorLogGuard, SuppressedSummary};
pub use metrics::{register_metrics, CacheMetrics};
pub use service::CacheService;
pub use state::ConnectionState;
pub use store::{KeyValueStore, MemoryStore, RedisStore, ScanPage};
