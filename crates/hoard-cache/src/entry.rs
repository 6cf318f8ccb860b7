//! Stored entry format and TTL type.

use crate::{CacheError, CacheResult};
use chrono::{DateTime, Utc};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use std::num::NonZeroU64;
use std::time::Duration;

/// Current envelope format.
pub(crate) const ENVELOPE_VERSION: u8 = 1;

/// Positive whole-second expiry for a cache entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Ttl(NonZeroU64);

impl Ttl {
    /// Creates a TTL of `secs` seconds. Zero is rejected.
    pub fn from_secs(secs: u64) -> CacheResult<Self> {
        NonZeroU64::new(secs)
            .map(Self)
            .ok_or_else(|| CacheError::InvalidTtl("TTL must be at least one second".to_string()))
    }

    /// Creates a TTL from a duration, rounding partial seconds up.
    pub fn from_duration(duration: Duration) -> CacheResult<Self> {
        let secs = duration.as_secs() + u64::from(duration.subsec_nanos() > 0);
        Self::from_secs(secs)
    }

    /// Returns the TTL in seconds.
    #[must_use]
    pub const fn as_secs(&self) -> u64 {
        self.0.get()
    }

    /// Returns the TTL as a Duration.
    #[must_use]
    pub const fn as_duration(&self) -> Duration {
        Duration::from_secs(self.0.get())
    }
}

impl TryFrom<Duration> for Ttl {
    type Error = CacheError;

    fn try_from(duration: Duration) -> Result<Self, Self::Error> {
        Self::from_duration(duration)
    }
}

/// On-store representation of a cached value.
#[derive(Debug, Serialize, Deserialize)]
struct Envelope<T> {
    v: u8,
    at: DateTime<Utc>,
    data: T,
}

/// Serializes `value` into the stored envelope.
pub(crate) fn encode<T: Serialize + ?Sized>(value: &T) -> CacheResult<String> {
    let envelope = Envelope {
        v: ENVELOPE_VERSION,
        at: Utc::now(),
        data: value,
    };
    Ok(serde_json::to_string(&envelope)?)
}

/// Decodes a stored envelope back into `T`.
pub(crate) fn decode<T: DeserializeOwned>(raw: &str) -> CacheResult<T> {
    let envelope: Envelope<T> = serde_json::from_str(raw)?;
    if envelope.v != ENVELOPE_VERSION {
        return Err(CacheError::Serialization(format!(
            "unsupported entry format version {}",
            envelope.v
        )));
    }
    Ok(envelope.data)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, PartialEq, Serialize, Deserialize)]
    struct Profile {
        id: u64,
        name: String,
        tags: Vec<String>,
    }

    #[test]
    fn test_ttl_rejects_zero() {
        assert!(matches!(Ttl::from_secs(0), Err(CacheError::InvalidTtl(_))));
        assert_eq!(Ttl::from_secs(30).unwrap().as_secs(), 30);
    }

    #[test]
    fn test_ttl_rounds_partial_seconds_up() {
        assert_eq!(Ttl::from_duration(Duration::from_millis(1500)).unwrap().as_secs(), 2);
        assert_eq!(Ttl::from_duration(Duration::from_millis(1)).unwrap().as_secs(), 1);
        assert!(Ttl::try_from(Duration::ZERO).is_err());
    }

    #[test]
    fn test_envelope_preserves_value() {
        let profile = Profile {
            id: 7,
            name: "ada".to_string(),
            tags: vec!["admin".to_string()],
        };
        let raw = encode(&profile).unwrap();
        assert!(raw.contains("\"v\":1"));
        assert_eq!(decode::<Profile>(&raw).unwrap(), profile);
    }

    #[test]
    fn test_decode_rejects_corrupt_payload() {
        assert!(matches!(decode::<Profile>("{not json"), Err(CacheError::Serialization(_))));
        assert!(matches!(decode::<Profile>("\"plain string\""), Err(CacheError::Serialization(_))));
    }

    #[test]
    fn test_decode_rejects_unknown_version() {
        let raw = r#"{"v":9,"at":"2024-01-01T00:00:00Z","data":1}"#;
        assert!(matches!(decode::<u32>(raw), Err(CacheError::Serialization(_))));
    }
}
