//! Configuration validation module.
//!
//! Fails fast on invalid configuration rather than at the first cache call.

use crate::AppConfig;
use std::fmt;
use url::Url;

/// Configuration validation error variants.
#[derive(Debug, Clone, PartialEq)]
pub enum ConfigValidationError {
    /// URL format is invalid.
    InvalidUrl { url_type: String, message: String },
    /// Pool size is zero.
    EmptyPool,
    /// Pool size exceeds maximum allowed.
    PoolSizeTooLarge { value: usize, maximum: usize },
    /// A duration that must be positive is zero.
    NonPositiveDuration { name: String },
    /// Key prefix is empty or contains whitespace.
    InvalidKeyPrefix { value: String },
    /// Lock retry jitter is larger than the lock itself lives.
    LockJitterExceedsTtl { jitter_ms: u64, ttl_ms: u64 },
    /// Waiters give up before a crashed holder's lock expires.
    LockRetryBudgetBelowTtl { budget_ms: u64, ttl_ms: u64 },
}

impl fmt::Display for ConfigValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidUrl { url_type, message } => {
                write!(f, "Invalid {} URL: {}", url_type, message)
            }
            Self::EmptyPool => write!(f, "Cache pool size must be at least 1"),
            Self::PoolSizeTooLarge { value, maximum } => {
                write!(f, "Pool size {} exceeds maximum allowed ({})", value, maximum)
            }
            Self::NonPositiveDuration { name } => {
                write!(f, "'{}' must be positive", name)
            }
            Self::InvalidKeyPrefix { value } => {
                write!(f, "Invalid key prefix '{}': must be non-empty without whitespace", value)
            }
            Self::LockJitterExceedsTtl { jitter_ms, ttl_ms } => {
                write!(
                    f,
                    "Lock retry jitter ({}ms) must be smaller than the lock TTL ({}ms)",
                    jitter_ms, ttl_ms
                )
            }
            Self::LockRetryBudgetBelowTtl { budget_ms, ttl_ms } => {
                write!(
                    f,
                    "Lock retries stop after {}ms, before the lock TTL ({}ms) expires; raise lock.retry_count or lock.retry_delay_ms",
                    budget_ms, ttl_ms
                )
            }
        }
    }
}

impl std::error::Error for ConfigValidationError {}

/// Configuration validator.
pub struct ConfigValidator;

impl ConfigValidator {
    /// Maximum connection pool size.
    const MAX_POOL_SIZE: usize = 1000;

    /// Validates the entire application configuration.
    ///
    /// Returns Ok(()) if valid, or Err with all validation errors found.
    pub fn validate(config: &AppConfig) -> Result<(), Vec<ConfigValidationError>> {
        let mut errors = Vec::new();

        Self::validate_cache(&config.cache, &mut errors);

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }

    /// Validates cache configuration.
    fn validate_cache(config: &crate::CacheConfig, errors: &mut Vec<ConfigValidationError>) {
        // The prefix shapes every derived key, so it is checked even when disabled.
        if config.key_prefix.is_empty() || config.key_prefix.chars().any(char::is_whitespace) {
            errors.push(ConfigValidationError::InvalidKeyPrefix {
                value: config.key_prefix.clone(),
            });
        }

        if config.default_ttl_secs == 0 {
            errors.push(ConfigValidationError::NonPositiveDuration {
                name: "cache.default_ttl_secs".to_string(),
            });
        }

        if !config.enabled {
            return;
        }

        match Url::parse(&config.url) {
            Ok(url) if url.scheme() == "redis" || url.scheme() == "rediss" => {}
            Ok(url) => errors.push(ConfigValidationError::InvalidUrl {
                url_type: "redis".to_string(),
                message: format!("unsupported scheme '{}', expected redis:// or rediss://", url.scheme()),
            }),
            Err(e) => errors.push(ConfigValidationError::InvalidUrl {
                url_type: "redis".to_string(),
                message: e.to_string(),
            }),
        }

        if config.pool_size == 0 {
            errors.push(ConfigValidationError::EmptyPool);
        } else if config.pool_size > Self::MAX_POOL_SIZE {
            errors.push(ConfigValidationError::PoolSizeTooLarge {
                value: config.pool_size,
                maximum: Self::MAX_POOL_SIZE,
            });
        }

        for (name, value) in [
            ("cache.connect_timeout_secs", config.connect_timeout_secs),
            ("cache.reconnect_interval_secs", config.reconnect_interval_secs),
            ("cache.scan_count", config.scan_count as u64),
            ("cache.lock.ttl_ms", config.lock.ttl_ms),
        ] {
            if value == 0 {
                errors.push(ConfigValidationError::NonPositiveDuration { name: name.to_string() });
            }
        }

        if config.lock.ttl_ms > 0 && config.lock.retry_jitter_ms >= config.lock.ttl_ms {
            errors.push(ConfigValidationError::LockJitterExceedsTtl {
                jitter_ms: config.lock.retry_jitter_ms,
                ttl_ms: config.lock.ttl_ms,
            });
        }

        if let Some(budget) = config.lock.retry_budget() {
            let budget_ms = u64::try_from(budget.as_millis()).unwrap_or(u64::MAX);
            if budget_ms < config.lock.ttl_ms {
                errors.push(ConfigValidationError::LockRetryBudgetBelowTtl {
                    budget_ms,
                    ttl_ms: config.lock.ttl_ms,
                });
            }
        }
    }
}

/// Formats validation errors for display.
pub fn format_validation_errors(errors: &[ConfigValidationError]) -> String {
    let mut output = String::from("Configuration validation failed:\n");
    for (i, error) in errors.iter().enumerate() {
        output.push_str(&format!("  {}. {}\n", i + 1, error));
    }
    output
}
