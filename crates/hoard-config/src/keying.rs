//! Key derivation settings for request-scoped cache entries.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Who a derived cache entry is shared between.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum CacheScope {
    /// One entry shared by every caller.
    #[default]
    Global,
    /// One entry per authenticated user.
    User,
}

impl fmt::Display for CacheScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Global => write!(f, "global"),
            Self::User => write!(f, "user"),
        }
    }
}

impl FromStr for CacheScope {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "global" => Ok(Self::Global),
            "user" => Ok(Self::User),
            _ => Err(format!("Unknown cache scope: {}", s)),
        }
    }
}

/// Which parts of a request identify a derived cache entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum KeyStrategy {
    /// Request path only.
    #[default]
    Path,
    /// Request path plus the normalised query string.
    PathWithQuery,
}

impl fmt::Display for KeyStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Path => write!(f, "path"),
            Self::PathWithQuery => write!(f, "path_with_query"),
        }
    }
}

impl FromStr for KeyStrategy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().replace('-', "_").as_str() {
            "path" => Ok(Self::Path),
            "path_with_query" => Ok(Self::PathWithQuery),
            _ => Err(format!("Unknown key strategy: {}", s)),
        }
    }
}
