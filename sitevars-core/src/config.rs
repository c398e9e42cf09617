//! Configuration types

use crate::ConfigError;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Default namespace for shared cache keys.
pub const DEFAULT_KEY_PREFIX: &str = "sitevars";

/// Longest accepted cache TTL (365 days).
pub const MAX_CACHE_TTL: Duration = Duration::from_secs(365 * 24 * 60 * 60);

/// Environment variable toggling the cache (`false`/`0` disables it).
pub const ENV_USE_CACHE: &str = "SITEVARS_USE_CACHE";

/// Environment variable holding the cache TTL in seconds.
pub const ENV_CACHE_TTL_SECS: &str = "SITEVARS_CACHE_TTL_SECS";

/// Environment variable overriding the cache key prefix.
pub const ENV_CACHE_KEY_PREFIX: &str = "SITEVARS_CACHE_KEY_PREFIX";

/// Configuration for the site variable cache.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SitevarsConfig {
    /// When false, every read goes straight to the backing store and the
    /// shared cache is never touched.
    pub use_cache: bool,
    /// Expiry handed to the shared cache on population. `None` means the
    /// entry lives until invalidated or evicted.
    pub cache_ttl: Option<Duration>,
    /// Namespace for cache keys; keys are `"{key_prefix}:{site_id}"`.
    pub key_prefix: String,
}

impl Default for SitevarsConfig {
    fn default() -> Self {
        Self {
            use_cache: true,
            cache_ttl: None,
            key_prefix: DEFAULT_KEY_PREFIX.to_string(),
        }
    }
}

impl SitevarsConfig {
    /// Create a config with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Enable or disable the shared cache.
    pub fn with_use_cache(mut self, enabled: bool) -> Self {
        self.use_cache = enabled;
        self
    }

    /// Set the TTL for populated cache entries.
    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.cache_ttl = Some(ttl);
        self
    }

    /// Set the cache key prefix.
    pub fn with_key_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.key_prefix = prefix.into();
        self
    }

    /// Create a config from environment variables.
    ///
    /// # Environment Variables
    /// - `SITEVARS_USE_CACHE`: `false` or `0` disables the cache (default: true)
    /// - `SITEVARS_CACHE_TTL_SECS`: TTL for cache entries (default: none)
    /// - `SITEVARS_CACHE_KEY_PREFIX`: cache key namespace (default: `sitevars`)
    ///
    /// Unparsable values fall back to the default.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build a config from an arbitrary variable lookup.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();

        let use_cache = lookup(ENV_USE_CACHE)
            .map(|s| {
                let s = s.trim().to_lowercase();
                s != "false" && s != "0"
            })
            .unwrap_or(defaults.use_cache);

        let cache_ttl = lookup(ENV_CACHE_TTL_SECS)
            .and_then(|s| s.trim().parse::<u64>().ok())
            .map(Duration::from_secs)
            .or(defaults.cache_ttl);

        let key_prefix = lookup(ENV_CACHE_KEY_PREFIX)
            .filter(|s| !s.trim().is_empty())
            .unwrap_or(defaults.key_prefix);

        Self {
            use_cache,
            cache_ttl,
            key_prefix,
        }
    }

    /// Check the config for values the cache layer cannot work with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.key_prefix.is_empty() {
            return Err(ConfigError::InvalidValue {
                field: "key_prefix".to_string(),
                value: self.key_prefix.clone(),
                reason: "must not be empty".to_string(),
            });
        }
        if self
            .key_prefix
            .chars()
            .any(|c| c == ':' || c.is_whitespace())
        {
            return Err(ConfigError::InvalidValue {
                field: "key_prefix".to_string(),
                value: self.key_prefix.clone(),
                reason: "must not contain ':' or whitespace".to_string(),
            });
        }
        if self.cache_ttl == Some(Duration::ZERO) {
            return Err(ConfigError::InvalidValue {
                field: "cache_ttl".to_string(),
                value: "0".to_string(),
                reason: "must be positive when set".to_string(),
            });
        }
        if let Some(ttl) = self.cache_ttl.filter(|ttl| *ttl > MAX_CACHE_TTL) {
            return Err(ConfigError::InvalidValue {
                field: "cache_ttl".to_string(),
                value: format!("{}s", ttl.as_secs()),
                reason: format!("must not exceed {}s", MAX_CACHE_TTL.as_secs()),
            });
        }
        Ok(())
    }
}
