//! Application configuration structures.

use crate::{CacheScope, KeyStrategy};
use hoard_core::LoggingConfig;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Root application configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Application name and metadata.
    #[serde(default)]
    pub app: AppMetadata,

    /// Cache service configuration.
    #[serde(default)]
    pub cache: CacheConfig,

    /// Log sink configuration.
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Application metadata.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppMetadata {
    /// Application name.
    pub name: String,
    /// Application version.
    pub version: String,
    /// Environment (development, staging, production).
    pub environment: String,
}

impl Default for AppMetadata {
    fn default() -> Self {
        Self {
            name: "hoard".to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            environment: "development".to_string(),
        }
    }
}

/// Cache service configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    /// Enable caching. When false every cache operation is a no-op.
    #[serde(default = "default_enabled")]
    pub enabled: bool,

    /// Redis URL.
    #[serde(default = "default_url")]
    pub url: String,

    /// Prefix for every key the service derives (tags, scoped entries).
    #[serde(default = "default_key_prefix")]
    pub key_prefix: String,

    /// TTL used by `set` when the caller gives none, in seconds.
    #[serde(default = "default_ttl_secs")]
    pub default_ttl_secs: u64,

    /// Default scope for derived request keys.
    #[serde(default)]
    pub default_scope: CacheScope,

    /// Default key derivation strategy for request keys.
    #[serde(default)]
    pub key_strategy: KeyStrategy,

    /// Record hit/miss/error counters.
    #[serde(default)]
    pub metrics_enabled: bool,

    /// Connection pool size.
    #[serde(default = "default_pool_size")]
    pub pool_size: usize,

    /// Timeout for acquiring a pooled connection, in seconds.
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_secs: u64,

    /// `COUNT` hint passed to each `SCAN` step.
    #[serde(default = "default_scan_count")]
    pub scan_count: usize,

    /// Window during which identical transport errors are logged once.
    #[serde(default = "default_error_window")]
    pub error_window_secs: u64,

    /// Minimum spacing between reconnect notices in the log.
    #[serde(default = "default_reconnect_notice_interval")]
    pub reconnect_notice_interval_secs: u64,

    /// Interval of the background health probe that re-establishes the
    /// connection after an outage.
    #[serde(default = "default_reconnect_interval")]
    pub reconnect_interval_secs: u64,

    /// Distributed lock settings.
    #[serde(default)]
    pub lock: LockConfig,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: default_enabled(),
            url: default_url(),
            key_prefix: default_key_prefix(),
            default_ttl_secs: default_ttl_secs(),
            default_scope: CacheScope::default(),
            key_strategy: KeyStrategy::default(),
            metrics_enabled: false,
            pool_size: default_pool_size(),
            connect_timeout_secs: default_connect_timeout(),
            scan_count: default_scan_count(),
            error_window_secs: default_error_window(),
            reconnect_notice_interval_secs: default_reconnect_notice_interval(),
            reconnect_interval_secs: default_reconnect_interval(),
            lock: LockConfig::default(),
        }
    }
}

fn default_enabled() -> bool {
    true
}

fn default_url() -> String {
    "redis://localhost:6379".to_string()
}

fn default_key_prefix() -> String {
    "hoard".to_string()
}

fn default_ttl_secs() -> u64 {
    300 // 5 minutes
}

fn default_pool_size() -> usize {
    10
}

fn default_connect_timeout() -> u64 {
    5
}

fn default_scan_count() -> usize {
    100
}

fn default_error_window() -> u64 {
    60
}

fn default_reconnect_notice_interval() -> u64 {
    30
}

fn default_reconnect_interval() -> u64 {
    5
}

impl CacheConfig {
    /// Returns a configuration with caching switched off.
    #[must_use]
    pub fn disabled() -> Self {
        Self {
            enabled: false,
            ..Default::default()
        }
    }

    /// Returns the default entry TTL as a Duration.
    #[must_use]
    pub const fn default_ttl(&self) -> Duration {
        Duration::from_secs(self.default_ttl_secs)
    }

    /// Returns the pool wait timeout as a Duration.
    #[must_use]
    pub const fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }

    /// Returns the error de-duplication window as a Duration.
    #[must_use]
    pub const fn error_window(&self) -> Duration {
        Duration::from_secs(self.error_window_secs)
    }

    /// Returns the reconnect notice spacing as a Duration.
    #[must_use]
    pub const fn reconnect_notice_interval(&self) -> Duration {
        Duration::from_secs(self.reconnect_notice_interval_secs)
    }

    /// Returns the health probe interval as a Duration.
    #[must_use]
    pub const fn reconnect_interval(&self) -> Duration {
        Duration::from_secs(self.reconnect_interval_secs)
    }
}

/// Distributed lock configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LockConfig {
    /// Additional acquisition attempts after the first; negative retries
    /// until the lock is obtained.
    #[serde(default = "default_retry_count")]
    pub retry_count: i32,

    /// Base delay between attempts, in milliseconds.
    #[serde(default = "default_retry_delay")]
    pub retry_delay_ms: u64,

    /// Upper bound of the random delay added to each wait, in milliseconds.
    #[serde(default = "default_retry_jitter")]
    pub retry_jitter_ms: u64,

    /// Lock lifetime, in milliseconds.
    #[serde(default = "default_lock_ttl")]
    pub ttl_ms: u64,

    /// Refuse to run guarded work when the lock back-end is unreachable
    /// instead of running it unprotected.
    #[serde(default)]
    pub fail_closed: bool,
}

impl Default for LockConfig {
    fn default() -> Self {
        Self {
            retry_count: default_retry_count(),
            retry_delay_ms: default_retry_delay(),
            retry_jitter_ms: default_retry_jitter(),
            ttl_ms: default_lock_ttl(),
            fail_closed: false,
        }
    }
}

fn default_retry_count() -> i32 {
    50
}

fn default_retry_delay() -> u64 {
    200
}

fn default_retry_jitter() -> u64 {
    200
}

fn default_lock_ttl() -> u64 {
    10_000
}

impl LockConfig {
    /// Returns the base retry delay as a Duration.
    #[must_use]
    pub const fn retry_delay(&self) -> Duration {
        Duration::from_millis(self.retry_delay_ms)
    }

    /// Returns the jitter bound as a Duration.
    #[must_use]
    pub const fn retry_jitter(&self) -> Duration {
        Duration::from_millis(self.retry_jitter_ms)
    }

    /// Returns the lock TTL as a Duration.
    #[must_use]
    pub const fn ttl(&self) -> Duration {
        Duration::from_millis(self.ttl_ms)
    }

    /// Shortest total time a waiter keeps retrying, jitter excluded.
    /// `None` when retries are unlimited.
    #[must_use]
    pub fn retry_budget(&self) -> Option<Duration> {
        let retries = u64::try_from(self.retry_count).ok()?;
        Some(Duration::from_millis((retries + 1).saturating_mul(self.retry_delay_ms)))
    }
}
