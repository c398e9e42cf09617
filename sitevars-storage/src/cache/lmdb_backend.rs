//! LMDB-backed shared cache.
//!
//! Uses the heed crate (Rust bindings for LMDB) to provide a memory-mapped
//! key-value store for site variable maps. Several worker processes on one
//! host can open the same directory and share cached maps, which makes
//! invalidation by one process visible to the others.
//!
//! # Value Format
//!
//! `[expires_at: 8 bytes, little-endian unix millis, 0 = never][json map]`
//!
//! Expired entries read as a miss and stay on disk until overwritten,
//! deleted or cleared.

use std::path::Path;
use std::sync::{Arc, RwLock};
use std::time::Duration;

use chrono::Utc;
use heed::types::Bytes;
use heed::{Database, Env, EnvOpenOptions};
use sitevars_core::{CacheError, SiteVarMap};

use super::key::SiteCacheKey;
use super::traits::{CacheStats, SharedCache};

/// Width of the expiry header in front of every stored value.
const HEADER_LEN: usize = 8;

/// Error type for LMDB cache operations.
#[derive(Debug, thiserror::Error)]
pub enum LmdbCacheError {
    /// Failed to open or create the LMDB environment.
    #[error("Failed to open LMDB environment: {0}")]
    EnvOpen(String),

    /// Failed to open the database within the environment.
    #[error("Failed to open database: {0}")]
    DbOpen(String),

    /// Transaction error.
    #[error("Transaction error: {0}")]
    Transaction(String),

    /// Serialization error.
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Deserialization error.
    #[error("Deserialization error: {0}")]
    Deserialization(String),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<LmdbCacheError> for CacheError {
    fn from(e: LmdbCacheError) -> Self {
        let reason = e.to_string();
        match e {
            LmdbCacheError::Serialization(_) => CacheError::Serialization { reason },
            LmdbCacheError::Deserialization(_) => CacheError::Deserialization { reason },
            LmdbCacheError::EnvOpen(_) | LmdbCacheError::DbOpen(_) | LmdbCacheError::Io(_) => {
                CacheError::Environment { reason }
            }
            LmdbCacheError::Transaction(_) => CacheError::Unavailable { reason },
        }
    }
}

/// LMDB-backed [`SharedCache`].
///
/// # Example
///
/// ```ignore
/// use sitevars_storage::{LmdbSiteCache, SharedCache, SiteCacheKey};
///
/// let cache = LmdbSiteCache::new("/var/cache/sitevars", 64)?;
/// let key = SiteCacheKey::for_site(site_id);
/// cache.set(&key, &map, None)?;
/// assert_eq!(cache.get(&key)?, Some(map));
/// ```
pub struct LmdbSiteCache {
    /// The LMDB environment.
    env: Env,
    /// The main database (single unnamed database).
    db: Database<Bytes, Bytes>,
    /// Statistics for this handle.
    stats: Arc<RwLock<CacheStats>>,
}

impl std::fmt::Debug for LmdbSiteCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LmdbSiteCache")
            .field("path", &self.env.path())
            .finish()
    }
}

impl LmdbSiteCache {
    /// Open (or create) an LMDB cache.
    ///
    /// # Arguments
    ///
    /// * `path` - Directory where LMDB files will be stored
    /// * `max_size_mb` - Maximum size of the database in megabytes
    ///
    /// # Errors
    ///
    /// Returns an error if the directory cannot be created or the LMDB
    /// environment or database cannot be opened.
    pub fn new<P: AsRef<Path>>(path: P, max_size_mb: usize) -> Result<Self, LmdbCacheError> {
        let map_size = max_size_mb
            .checked_mul(1024 * 1024)
            .ok_or_else(|| {
                LmdbCacheError::EnvOpen(format!("map size of {} MB is too large", max_size_mb))
            })?;
        std::fs::create_dir_all(&path)?;

        // SAFETY: the environment is opened once per handle and the map is
        // never truncated while open.
        let env = unsafe {
            EnvOpenOptions::new()
                .map_size(map_size)
                .max_dbs(1)
                .open(path.as_ref())
        }
        .map_err(|e| LmdbCacheError::EnvOpen(e.to_string()))?;

        let mut wtxn = env
            .write_txn()
            .map_err(|e| LmdbCacheError::Transaction(e.to_string()))?;

        let db: Database<Bytes, Bytes> = env
            .create_database(&mut wtxn, None)
            .map_err(|e| LmdbCacheError::DbOpen(e.to_string()))?;

        wtxn.commit()
            .map_err(|e| LmdbCacheError::Transaction(e.to_string()))?;

        Ok(Self {
            env,
            db,
            stats: Arc::new(RwLock::new(CacheStats::default())),
        })
    }

    /// Remove every entry. Returns the number of entries removed.
    pub fn clear(&self) -> Result<u64, LmdbCacheError> {
        let mut wtxn = self
            .env
            .write_txn()
            .map_err(|e| LmdbCacheError::Transaction(e.to_string()))?;
        let removed = self
            .db
            .len(&wtxn)
            .map_err(|e| LmdbCacheError::Transaction(e.to_string()))?;
        self.db
            .clear(&mut wtxn)
            .map_err(|e| LmdbCacheError::Transaction(e.to_string()))?;
        wtxn.commit()
            .map_err(|e| LmdbCacheError::Transaction(e.to_string()))?;

        if let Ok(mut stats) = self.stats.write() {
            stats.deletes += removed;
        }
        Ok(removed)
    }

    fn record(&self, update: impl FnOnce(&mut CacheStats)) {
        if let Ok(mut stats) = self.stats.write() {
            update(&mut stats);
        }
    }

    fn encode_value(map: &SiteVarMap, ttl: Option<Duration>) -> Result<Vec<u8>, LmdbCacheError> {
        let expires_at = match ttl {
            Some(ttl) => {
                let ttl_millis = i64::try_from(ttl.as_millis())
                    .map_err(|e| LmdbCacheError::Serialization(e.to_string()))?;
                Utc::now().timestamp_millis().saturating_add(ttl_millis.max(1))
            }
            None => 0,
        };
        let value_bytes =
            serde_json::to_vec(map).map_err(|e| LmdbCacheError::Serialization(e.to_string()))?;

        let mut full_bytes = Vec::with_capacity(HEADER_LEN + value_bytes.len());
        full_bytes.extend_from_slice(&expires_at.to_le_bytes());
        full_bytes.extend_from_slice(&value_bytes);
        Ok(full_bytes)
    }

    /// Decode a stored value, returning `None` if it has expired.
    fn decode_value(bytes: &[u8]) -> Result<Option<SiteVarMap>, LmdbCacheError> {
        if bytes.len() < HEADER_LEN {
            return Err(LmdbCacheError::Deserialization(
                "value shorter than expiry header".into(),
            ));
        }
        let header: [u8; HEADER_LEN] = bytes[..HEADER_LEN]
            .try_into()
            .map_err(|_| LmdbCacheError::Deserialization("Invalid expiry header".into()))?;
        let expires_at = i64::from_le_bytes(header);
        if expires_at != 0 && expires_at <= Utc::now().timestamp_millis() {
            return Ok(None);
        }

        serde_json::from_slice(&bytes[HEADER_LEN..])
            .map(Some)
            .map_err(|e| LmdbCacheError::Deserialization(e.to_string()))
    }
}

impl SharedCache for LmdbSiteCache {
    fn get(&self, key: &SiteCacheKey) -> Result<Option<SiteVarMap>, CacheError> {
        let encoded_key = key.encode();

        let rtxn = self
            .env
            .read_txn()
            .map_err(|e| LmdbCacheError::Transaction(e.to_string()))?;

        match self.db.get(&rtxn, encoded_key.as_bytes()) {
            Ok(Some(bytes)) => match Self::decode_value(bytes)? {
                Some(map) => {
                    self.record(|s| s.hits += 1);
                    Ok(Some(map))
                }
                None => {
                    self.record(|s| s.misses += 1);
                    Ok(None)
                }
            },
            Ok(None) => {
                self.record(|s| s.misses += 1);
                Ok(None)
            }
            Err(e) => {
                self.record(|s| s.misses += 1);
                Err(LmdbCacheError::Transaction(e.to_string()).into())
            }
        }
    }

    fn set(
        &self,
        key: &SiteCacheKey,
        map: &SiteVarMap,
        ttl: Option<Duration>,
    ) -> Result<(), CacheError> {
        let encoded_key = key.encode();
        let full_bytes = Self::encode_value(map, ttl)?;

        let mut wtxn = self
            .env
            .write_txn()
            .map_err(|e| LmdbCacheError::Transaction(e.to_string()))?;

        self.db
            .put(&mut wtxn, encoded_key.as_bytes(), &full_bytes)
            .map_err(|e| LmdbCacheError::Transaction(e.to_string()))?;

        wtxn.commit()
            .map_err(|e| LmdbCacheError::Transaction(e.to_string()))?;

        self.record(|s| s.sets += 1);
        Ok(())
    }

    fn delete(&self, key: &SiteCacheKey) -> Result<(), CacheError> {
        let encoded_key = key.encode();

        let mut wtxn = self
            .env
            .write_txn()
            .map_err(|e| LmdbCacheError::Transaction(e.to_string()))?;

        let deleted = self
            .db
            .delete(&mut wtxn, encoded_key.as_bytes())
            .map_err(|e| LmdbCacheError::Transaction(e.to_string()))?;

        wtxn.commit()
            .map_err(|e| LmdbCacheError::Transaction(e.to_string()))?;

        if deleted {
            self.record(|s| s.deletes += 1);
        }
        Ok(())
    }

    fn stats(&self) -> Result<CacheStats, CacheError> {
        let rtxn = self
            .env
            .read_txn()
            .map_err(|e| LmdbCacheError::Transaction(e.to_string()))?;
        let entry_count = self
            .db
            .len(&rtxn)
            .map_err(|e| LmdbCacheError::Transaction(e.to_string()))?;

        let mut stats = self
            .stats
            .read()
            .map(|s| s.clone())
            .unwrap_or_default();
        stats.entry_count = entry_count;
        Ok(stats)
    }
}
