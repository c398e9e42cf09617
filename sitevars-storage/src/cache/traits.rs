//! Shared cache service trait.

use std::time::Duration;

use sitevars_core::{CacheError, SiteVarMap};

use super::key::SiteCacheKey;

/// Process- or deployment-wide key/value cache for site variable maps.
///
/// Implementations must be thread-safe. Deleting an absent key is a no-op
/// and reading one returns `Ok(None)`. No ordering is required between
/// concurrent `set` and `delete` calls on the same key.
pub trait SharedCache: Send + Sync {
    /// Get a site's cached map, or `None` on a miss.
    fn get(&self, key: &SiteCacheKey) -> Result<Option<SiteVarMap>, CacheError>;

    /// Store a site's map, optionally expiring after `ttl`.
    fn set(
        &self,
        key: &SiteCacheKey,
        map: &SiteVarMap,
        ttl: Option<Duration>,
    ) -> Result<(), CacheError>;

    /// Remove a site's map.
    fn delete(&self, key: &SiteCacheKey) -> Result<(), CacheError>;

    /// Get cache statistics.
    fn stats(&self) -> Result<CacheStats, CacheError>;
}

/// Statistics about cache usage.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CacheStats {
    /// Number of cache hits.
    pub hits: u64,
    /// Number of cache misses, expired entries included.
    pub misses: u64,
    /// Number of successful stores.
    pub sets: u64,
    /// Number of deletes that removed an entry.
    pub deletes: u64,
    /// Number of entries currently in cache.
    pub entry_count: u64,
}

impl CacheStats {
    /// Calculate the hit rate (0.0 to 1.0).
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}
