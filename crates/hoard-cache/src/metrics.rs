//! Prometheus metrics for cache monitoring.

use crate::ConnectionState;
use metrics::{counter, describe_counter, describe_gauge, describe_histogram, gauge, histogram};
use std::time::Duration;

/// Metric names for the cache service.
pub mod names {
    /// Reads that found a decodable entry.
    pub const HITS_TOTAL: &str = "hoard_cache_hits_total";
    /// Reads that found nothing usable.
    pub const MISSES_TOTAL: &str = "hoard_cache_misses_total";
    /// Store or serialization failures swallowed by the service.
    pub const ERRORS_TOTAL: &str = "hoard_cache_errors_total";
    /// Guarded work run without a lock because the lock store was down.
    pub const LOCK_FALLBACKS_TOTAL: &str = "hoard_cache_lock_fallbacks_total";
    /// Keys removed by pattern deletes and tag evictions.
    pub const EVICTED_KEYS_TOTAL: &str = "hoard_cache_evicted_keys_total";

    /// 1 while the store is reachable.
    pub const CONNECTED: &str = "hoard_cache_connected";

    /// Store round-trip duration in seconds.
    pub const OPERATION_DURATION: &str = "hoard_cache_operation_duration_seconds";
}

/// Register all metric descriptions.
pub fn register_metrics() {
    describe_counter!(names::HITS_TOTAL, "Total number of cache hits");
    describe_counter!(names::MISSES_TOTAL, "Total number of cache misses");
    describe_counter!(names::ERRORS_TOTAL, "Total number of swallowed cache errors");
    describe_counter!(
        names::LOCK_FALLBACKS_TOTAL,
        "Total number of lock-guarded calls run without a lock"
    );
    describe_counter!(
        names::EVICTED_KEYS_TOTAL,
        "Total number of keys removed by pattern delete or tag eviction"
    );
    describe_gauge!(
        names::CONNECTED,
        "Whether the cache store is reachable (1) or not (0)"
    );
    describe_histogram!(
        names::OPERATION_DURATION,
        "Cache store operation duration in seconds"
    );
}

/// Cache metrics recorder. Records nothing unless enabled.
#[derive(Debug, Clone, Copy)]
pub struct CacheMetrics {
    enabled: bool,
}

impl CacheMetrics {
    /// Create a recorder.
    #[must_use]
    pub const fn new(enabled: bool) -> Self {
        Self { enabled }
    }

    /// Returns true if metrics are recorded.
    #[must_use]
    pub const fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Record read results.
    pub fn lookups(&self, hits: u64, misses: u64) {
        if !self.enabled {
            return;
        }
        if hits > 0 {
            counter!(names::HITS_TOTAL).increment(hits);
        }
        if misses > 0 {
            counter!(names::MISSES_TOTAL).increment(misses);
        }
    }

    /// Record a swallowed error.
    pub fn error(&self, operation: &'static str, kind: &'static str) {
        if self.enabled {
            counter!(names::ERRORS_TOTAL, "operation" => operation, "kind" => kind).increment(1);
        }
    }

    /// Record unprotected lock-guarded work.
    pub fn lock_fallback(&self) {
        if self.enabled {
            counter!(names::LOCK_FALLBACKS_TOTAL).increment(1);
        }
    }

    /// Record removed keys.
    pub fn evicted(&self, source: &'static str, count: u64) {
        if self.enabled && count > 0 {
            counter!(names::EVICTED_KEYS_TOTAL, "source" => source).increment(count);
        }
    }

    /// Record a connection state change.
    pub fn state(&self, state: ConnectionState) {
        if self.enabled {
            let connected = if state == ConnectionState::Ready { 1.0 } else { 0.0 };
            gauge!(names::CONNECTED).set(connected);
        }
    }

    /// Record a store round-trip.
    pub fn operation(&self, operation: &'static str, duration: Duration) {
        if self.enabled {
            histogram!(names::OPERATION_DURATION, "operation" => operation).record(duration.as_secs_f64());
        }
    }
}
