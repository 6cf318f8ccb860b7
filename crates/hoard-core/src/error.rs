//! Unified error type for the Hoard workspace.

use serde::{Deserialize, Serialize};
use std::fmt::Debug;
use thiserror::Error;

/// A specialized `Result` type for Hoard operations.
pub type HoardResult<T> = Result<T, HoardError>;

/// Application-level error shared by the config loader, the cache service
/// host and the server binary.
///
/// Cache operations themselves fail soft and carry their own
/// `CacheError`; only failures that reach the host surface as `HoardError`.
#[derive(Error, Debug)]
pub enum HoardError {
    /// Configuration error
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Redis/Cache error
    #[error("Cache error: {0}")]
    Cache(String),

    /// Lock could not be obtained
    #[error("Lock error: {0}")]
    Lock(String),

    /// Host setup failure, with its cause chain
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl HoardError {
    /// Returns a machine-readable error code.
    #[must_use]
    pub const fn error_code(&self) -> &'static str {
        match self {
            Self::Configuration(_) => "CONFIGURATION_ERROR",
            Self::Cache(_) => "CACHE_ERROR",
            Self::Lock(_) => "LOCK_ERROR",
            Self::Other(_) => "INTERNAL_ERROR",
        }
    }

    /// Creates a configuration error.
    #[must_use]
    pub fn configuration<T: Into<String>>(message: T) -> Self {
        Self::Configuration(message.into())
    }
}

/// Serializable error summary, used by health reporting.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorSummary {
    /// Machine-readable error code
    pub code: String,
    /// Human-readable error message
    pub message: String,
}

impl From<&HoardError> for ErrorSummary {
    fn from(error: &HoardError) -> Self {
        Self {
            code: error.error_code().to_string(),
            message: error.to_string(),
        }
    }
}
