//! Process-local shared cache.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, RwLock};
use std::time::Duration;

use chrono::{DateTime, Utc};
use sitevars_core::{CacheError, SiteVarMap};

use super::key::SiteCacheKey;
use super::traits::{CacheStats, SharedCache};

#[derive(Debug, Clone)]
struct CachedMap {
    map: SiteVarMap,
    expires_at: Option<DateTime<Utc>>,
}

impl CachedMap {
    fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.is_some_and(|at| at <= now)
    }
}

/// Number of calls made to each cache operation, failed calls included.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheCalls {
    pub gets: u64,
    pub sets: u64,
    pub deletes: u64,
}

impl CacheCalls {
    /// Total calls across all operations.
    pub fn total(&self) -> u64 {
        self.gets + self.sets + self.deletes
    }
}

/// In-memory [`SharedCache`] with TTL support and call accounting.
///
/// Call counters and the delete log make it usable as a test double that
/// verifies exactly which cache operations a caller performed.
#[derive(Debug, Default)]
pub struct InMemoryCache {
    entries: RwLock<HashMap<String, CachedMap>>,
    stats: RwLock<CacheStats>,
    gets: AtomicU64,
    sets: AtomicU64,
    deletes: AtomicU64,
    delete_log: Mutex<Vec<String>>,
    failure: RwLock<Option<CacheError>>,
}

impl InMemoryCache {
    /// Create an empty cache.
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every subsequent operation fail with `error`.
    pub fn fail_with(&self, error: CacheError) {
        if let Ok(mut failure) = self.failure.write() {
            *failure = Some(error);
        }
    }

    /// Stop failing operations.
    pub fn recover(&self) {
        if let Ok(mut failure) = self.failure.write() {
            *failure = None;
        }
    }

    /// Call counts since creation or the last [`InMemoryCache::reset_calls`].
    pub fn calls(&self) -> CacheCalls {
        CacheCalls {
            gets: self.gets.load(Ordering::SeqCst),
            sets: self.sets.load(Ordering::SeqCst),
            deletes: self.deletes.load(Ordering::SeqCst),
        }
    }

    /// Reset call counts and the delete log.
    pub fn reset_calls(&self) {
        self.gets.store(0, Ordering::SeqCst);
        self.sets.store(0, Ordering::SeqCst);
        self.deletes.store(0, Ordering::SeqCst);
        if let Ok(mut log) = self.delete_log.lock() {
            log.clear();
        }
    }

    /// Encoded keys passed to `delete`, in call order.
    pub fn delete_log(&self) -> Vec<String> {
        self.delete_log
            .lock()
            .map(|log| log.clone())
            .unwrap_or_default()
    }

    /// Read an entry without touching counters or statistics.
    pub fn peek(&self, key: &SiteCacheKey) -> Option<SiteVarMap> {
        let entries = self.entries.read().ok()?;
        entries
            .get(&key.encode())
            .filter(|cached| !cached.is_expired(Utc::now()))
            .map(|cached| cached.map.clone())
    }

    /// Whether a live entry exists for `key`.
    pub fn contains(&self, key: &SiteCacheKey) -> bool {
        self.peek(key).is_some()
    }

    /// Number of stored entries, expired ones included until next touched.
    pub fn len(&self) -> usize {
        self.entries.read().map(|e| e.len()).unwrap_or(0)
    }

    /// Whether the cache holds no entries.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn check_failure(&self) -> Result<(), CacheError> {
        match self.failure.read() {
            Ok(failure) => match failure.as_ref() {
                Some(err) => Err(err.clone()),
                None => Ok(()),
            },
            Err(_) => Err(poisoned()),
        }
    }

    fn with_stats(&self, update: impl FnOnce(&mut CacheStats)) {
        if let Ok(mut stats) = self.stats.write() {
            update(&mut stats);
        }
    }
}

fn expiry_after(ttl: Duration) -> Result<DateTime<Utc>, CacheError> {
    let out_of_range = || CacheError::Serialization {
        reason: format!("ttl of {}s is out of range", ttl.as_secs()),
    };
    let delta = chrono::Duration::from_std(ttl).map_err(|_| out_of_range())?;
    Utc::now().checked_add_signed(delta).ok_or_else(out_of_range)
}

fn poisoned() -> CacheError {
    CacheError::Unavailable {
        reason: "cache lock poisoned".to_string(),
    }
}

impl SharedCache for InMemoryCache {
    fn get(&self, key: &SiteCacheKey) -> Result<Option<SiteVarMap>, CacheError> {
        self.gets.fetch_add(1, Ordering::SeqCst);
        self.check_failure()?;

        let encoded = key.encode();
        let now = Utc::now();
        let mut entries = self.entries.write().map_err(|_| poisoned())?;
        match entries.get(&encoded) {
            Some(cached) if !cached.is_expired(now) => {
                let map = cached.map.clone();
                self.with_stats(|s| s.hits += 1);
                Ok(Some(map))
            }
            Some(_) => {
                entries.remove(&encoded);
                let remaining = entries.len() as u64;
                self.with_stats(|s| {
                    s.misses += 1;
                    s.entry_count = remaining;
                });
                Ok(None)
            }
            None => {
                self.with_stats(|s| s.misses += 1);
                Ok(None)
            }
        }
    }

    fn set(
        &self,
        key: &SiteCacheKey,
        map: &SiteVarMap,
        ttl: Option<Duration>,
    ) -> Result<(), CacheError> {
        self.sets.fetch_add(1, Ordering::SeqCst);
        self.check_failure()?;

        let expires_at = ttl.map(expiry_after).transpose()?;

        let mut entries = self.entries.write().map_err(|_| poisoned())?;
        entries.insert(
            key.encode(),
            CachedMap {
                map: map.clone(),
                expires_at,
            },
        );
        let count = entries.len() as u64;
        self.with_stats(|s| {
            s.sets += 1;
            s.entry_count = count;
        });
        Ok(())
    }

    fn delete(&self, key: &SiteCacheKey) -> Result<(), CacheError> {
        self.deletes.fetch_add(1, Ordering::SeqCst);
        let encoded = key.encode();
        if let Ok(mut log) = self.delete_log.lock() {
            log.push(encoded.clone());
        }
        self.check_failure()?;

        let mut entries = self.entries.write().map_err(|_| poisoned())?;
        let removed = entries.remove(&encoded).is_some();
        let count = entries.len() as u64;
        self.with_stats(|s| {
            if removed {
                s.deletes += 1;
            }
            s.entry_count = count;
        });
        Ok(())
    }

    fn stats(&self) -> Result<CacheStats, CacheError> {
        self.stats.read().map(|s| s.clone()).map_err(|_| poisoned())
    }
}
