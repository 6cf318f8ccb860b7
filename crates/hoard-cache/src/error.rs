//! Cache error types.

use hoard_core::HoardError;
use std::fmt;
use thiserror::Error;

/// Result type for cache operations.
pub type CacheResult<T> = Result<T, CacheError>;

/// Coarse classification of a transport failure, used for friendly log
/// diagnostics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TransportKind {
    /// DNS lookup of the store host failed.
    HostUnresolvable,
    /// The host answered but nothing listens on the port.
    ConnectionRefused,
    /// The store or the pool did not answer in time.
    TimedOut,
    /// Any other I/O or connection failure.
    Other,
}

impl TransportKind {
    /// Classifies a failure from its error message.
    #[must_use]
    pub fn from_message(message: &str) -> Self {
        let lower = message.to_lowercase();
        if lower.contains("failed to lookup address")
            || lower.contains("name or service not known")
            || lower.contains("nodename nor servname")
            || lower.contains("no such host")
            || lower.contains("enotfound")
        {
            Self::HostUnresolvable
        } else if lower.contains("connection refused") || lower.contains("econnrefused") {
            Self::ConnectionRefused
        } else if lower.contains("timed out") || lower.contains("timeout") {
            Self::TimedOut
        } else {
            Self::Other
        }
    }

    /// Operator-facing hint attached to error logs.
    #[must_use]
    pub const fn hint(&self) -> &'static str {
        match self {
            Self::HostUnresolvable => "cache host cannot be resolved; check the cache URL hostname and DNS",
            Self::ConnectionRefused => "cache host refused the connection; is the store running and listening on that port?",
            Self::TimedOut => "cache store did not answer in time; check network latency and store load",
            Self::Other => "cache store connection failed",
        }
    }
}

impl fmt::Display for TransportKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::HostUnresolvable => write!(f, "host-unresolvable"),
            Self::ConnectionRefused => write!(f, "connection-refused"),
            Self::TimedOut => write!(f, "timed-out"),
            Self::Other => write!(f, "other"),
        }
    }
}

/// Cache-related errors.
///
/// Most operations of [`crate::CacheService`] swallow these after logging;
/// they surface to callers only from lock, lifecycle and store-level APIs.
#[derive(Debug, Error)]
pub enum CacheError {
    /// Caching is switched off.
    #[error("Cache is disabled")]
    Disabled,

    /// Network or connection failure.
    #[error("Cache transport error ({kind}): {message}")]
    Transport { kind: TransportKind, message: String },

    /// The store answered but rejected the command.
    #[error("Cache command rejected: {0}")]
    Command(String),

    /// Stored payload could not be encoded or decoded.
    #[error("Cache serialization error: {0}")]
    Serialization(String),

    /// No lock store answered the acquisition.
    #[error("Lock back-end unavailable for '{key}': {reason}")]
    LockUnavailable { key: String, reason: String },

    /// The lock stayed held elsewhere for every configured attempt.
    #[error("Lock '{key}' still held elsewhere after {attempts} attempts")]
    LockContended { key: String, attempts: u32 },

    /// Releasing an acquired lock failed.
    #[error("Failed to release lock '{key}': {reason}")]
    LockReleaseFailure { key: String, reason: String },

    /// TTL outside the accepted range.
    #[error("Invalid TTL: {0}")]
    InvalidTtl(String),

    /// Invalid cache configuration.
    #[error("Cache configuration error: {0}")]
    Configuration(String),
}

impl CacheError {
    /// Creates a transport error.
    #[must_use]
    pub fn transport(kind: TransportKind, message: impl Into<String>) -> Self {
        Self::Transport {
            kind,
            message: message.into(),
        }
    }

    /// Returns true for failures that indicate the store is unreachable.
    #[must_use]
    pub const fn is_transport(&self) -> bool {
        matches!(self, Self::Transport { .. })
    }

    /// Returns the transport classification, if this is a transport error.
    #[must_use]
    pub const fn transport_kind(&self) -> Option<TransportKind> {
        match self {
            Self::Transport { kind, .. } => Some(*kind),
            _ => None,
        }
    }

    /// Short label used for metrics.
    #[must_use]
    pub const fn label(&self) -> &'static str {
        match self {
            Self::Disabled => "disabled",
            Self::Transport { .. } => "transport",
            Self::Command(_) => "command",
            Self::Serialization(_) => "serialization",
            Self::LockUnavailable { .. } => "lock_unavailable",
            Self::LockContended { .. } => "lock_contended",
            Self::LockReleaseFailure { .. } => "lock_release",
            Self::InvalidTtl(_) => "invalid_ttl",
            Self::Configuration(_) => "configuration",
        }
    }

    /// Text used to recognise repeats of this error in logs.
    ///
    /// Lock errors drop the lock key, so one outage seen through many locks
    /// reads as a single repeated error.
    #[must_use]
    pub fn fingerprint(&self) -> String {
        match self {
            Self::LockUnavailable { reason, .. } => format!("Lock back-end unavailable: {}", reason),
            Self::LockContended { attempts, .. } => format!("Lock still held elsewhere after {} attempts", attempts),
            Self::LockReleaseFailure { reason, .. } => format!("Failed to release lock: {}", reason),
            other => other.to_string(),
        }
    }
}

impl From<redis::RedisError> for CacheError {
    fn from(err: redis::RedisError) -> Self {
        let message = err.to_string();
        if err.is_connection_refusal() {
            Self::transport(TransportKind::ConnectionRefused, message)
        } else if err.is_timeout() {
            Self::transport(TransportKind::TimedOut, message)
        } else if err.is_io_error() || err.is_connection_dropped() {
            Self::transport(TransportKind::from_message(&message), message)
        } else {
            Self::Command(message)
        }
    }
}

impl From<deadpool_redis::PoolError> for CacheError {
    fn from(err: deadpool_redis::PoolError) -> Self {
        let message = err.to_string();
        match err {
            deadpool_redis::PoolError::Backend(e) => e.into(),
            deadpool_redis::PoolError::Timeout(_) => Self::transport(TransportKind::TimedOut, message),
            _ => Self::transport(TransportKind::from_message(&message), message),
        }
    }
}

impl From<deadpool_redis::CreatePoolError> for CacheError {
    fn from(err: deadpool_redis::CreatePoolError) -> Self {
        Self::Configuration(format!("Invalid Redis config: {}", err))
    }
}

impl From<serde_json::Error> for CacheError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}

impl From<CacheError> for HoardError {
    fn from(err: CacheError) -> Self {
        match err {
            CacheError::Configuration(message) => HoardError::Configuration(message),
            CacheError::LockUnavailable { .. }
            | CacheError::LockContended { .. }
            | CacheError::LockReleaseFailure { .. } => HoardError::Lock(err.to_string()),
            other => HoardError::Cache(other.to_string()),
        }
    }
}
