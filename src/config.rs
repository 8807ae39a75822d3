//! Configuration Module
//!
//! Handles loading, parsing and validating cache configuration.

use std::env;
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{CacheError, Result};

/// Cache configuration parameters.
///
/// Every bound is optional: an empty configuration describes an unbounded cache
/// whose entries never expire. Durations are carried in milliseconds when the
/// configuration is read from the environment or from JSON.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CacheConfig {
    /// Maximum number of entries, None = unbounded
    pub maximum_size: Option<u64>,
    /// Idle time after which an entry expires
    #[serde(rename = "expire_after_access_ms", with = "duration_ms")]
    pub expire_after_access: Option<Duration>,
    /// Age after which an entry expires, regardless of reads
    #[serde(rename = "expire_after_write_ms", with = "duration_ms")]
    pub expire_after_write: Option<Duration>,
    /// Upper bound on asynchronous loads running at once
    pub max_concurrent_loads: Option<usize>,
    /// Interval of the optional background cleanup task
    #[serde(rename = "cleanup_interval_ms", with = "duration_ms")]
    pub cleanup_interval: Option<Duration>,
}

impl CacheConfig {
    /// Creates a new CacheConfig by loading values from environment variables.
    ///
    /// # Environment Variables
    /// - `CACHE_MAXIMUM_SIZE` - Maximum cache entries (default: unbounded)
    /// - `CACHE_EXPIRE_AFTER_ACCESS_MS` - Idle expiry in milliseconds (default: none)
    /// - `CACHE_EXPIRE_AFTER_WRITE_MS` - Write expiry in milliseconds (default: none)
    /// - `CACHE_MAX_CONCURRENT_LOADS` - Async load concurrency (default: unbounded)
    /// - `CACHE_CLEANUP_INTERVAL_MS` - Background cleanup frequency (default: disabled)
    ///
    /// Unlike a lenient parser, malformed values are rejected rather than
    /// silently replaced by defaults.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|name| env::var(name).ok())
    }

    /// Same as [`CacheConfig::from_env`], reading variables through `lookup`.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let config = Self {
            maximum_size: parse_var(&lookup, "CACHE_MAXIMUM_SIZE")?,
            expire_after_access: parse_var(&lookup, "CACHE_EXPIRE_AFTER_ACCESS_MS")?
                .map(Duration::from_millis),
            expire_after_write: parse_var(&lookup, "CACHE_EXPIRE_AFTER_WRITE_MS")?
                .map(Duration::from_millis),
            max_concurrent_loads: parse_var(&lookup, "CACHE_MAX_CONCURRENT_LOADS")?,
            cleanup_interval: parse_var(&lookup, "CACHE_CLEANUP_INTERVAL_MS")?
                .map(Duration::from_millis),
        };
        config.validate()?;
        Ok(config)
    }

    /// Parses and validates a JSON document.
    pub fn from_json(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)
            .map_err(|e| CacheError::CapacityConfig(format!("malformed configuration: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    /// Checks that every configured bound is usable.
    pub fn validate(&self) -> Result<()> {
        ensure_positive("expire_after_access", self.expire_after_access)?;
        ensure_positive("expire_after_write", self.expire_after_write)?;
        ensure_positive("cleanup_interval", self.cleanup_interval)?;
        if self.max_concurrent_loads == Some(0) {
            return Err(CacheError::CapacityConfig(
                "max_concurrent_loads must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

fn ensure_positive(name: &str, value: Option<Duration>) -> Result<()> {
    match value {
        Some(duration) if duration.is_zero() => Err(CacheError::CapacityConfig(format!(
            "{name} must be a positive duration"
        ))),
        _ => Ok(()),
    }
}

fn parse_var<T, F>(lookup: &F, name: &str) -> Result<Option<T>>
where
    T: FromStr,
    T::Err: fmt::Display,
    F: Fn(&str) -> Option<String>,
{
    let Some(raw) = lookup(name) else {
        return Ok(None);
    };
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Ok(None);
    }
    trimmed
        .parse()
        .map(Some)
        .map_err(|e| CacheError::CapacityConfig(format!("{name}={raw:?} is invalid: {e}")))
}

mod duration_ms {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S>(value: &Option<Duration>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match value {
            Some(duration) => {
                let millis = u64::try_from(duration.as_millis()).unwrap_or(u64::MAX);
                serializer.serialize_some(&millis)
            }
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<Duration>, D::Error>
    where
        D: Deserializer<'de>,
    {
        Ok(Option::<u64>::deserialize(deserializer)?.map(Duration::from_millis))
    }
}
