//! Transaction-aware read-through cache for site variables.
//!
//! [`SiteVarCache`] is the single authority for reading and invalidating the
//! per-site variable map. Two rules keep the shared cache consistent with
//! committed data:
//!
//! 1. The cache is never populated from inside an open transaction. A map
//!    built from a transaction's uncommitted view must not become visible to
//!    other readers, and must not survive a rollback.
//! 2. Invalidation inside a transaction is deferred to a commit hook, so a
//!    rollback leaves the cache exactly as it was.
//!
//! Cache-service errors never reach callers: reads fall back to the store and
//! failed writes to the cache are logged.

use std::str::FromStr;
use std::sync::Arc;

use sitevars_core::{
    SiteId, SiteVarMap, SitevarsConfig, SitevarsError, SitevarsResult, ValidationError,
};

use crate::accessor::SiteVars;
use crate::cache::{SharedCache, SiteCacheKey};
use crate::transaction::TransactionCoordinator;
use crate::VariableStore;

/// Read-through cache manager for site variable maps.
///
/// # Type Parameters
///
/// - `S`: the backing store, source of truth for variable records
/// - `C`: the shared cache service holding per-site maps
/// - `T`: the transaction coordinator for the store's connection
///
/// # Example
///
/// ```ignore
/// let db = Arc::new(MemoryDatabase::new());
/// let cache = SiteVarCache::new(
///     Arc::clone(&db),
///     Arc::new(InMemoryCache::new()),
///     Arc::clone(&db),
///     SitevarsConfig::default(),
/// );
///
/// cache.set_value(site_id, "greeting", "hi")?;
/// assert_eq!(cache.get_value(site_id, "greeting", None)?, Some("hi".into()));
/// ```
pub struct SiteVarCache<S, C, T>
where
    S: VariableStore,
    C: SharedCache + 'static,
    T: TransactionCoordinator,
{
    store: Arc<S>,
    cache: Arc<C>,
    transactions: Arc<T>,
    config: SitevarsConfig,
}

impl<S, C, T> SiteVarCache<S, C, T>
where
    S: VariableStore,
    C: SharedCache + 'static,
    T: TransactionCoordinator,
{
    /// Create a cache manager.
    pub fn new(store: Arc<S>, cache: Arc<C>, transactions: Arc<T>, config: SitevarsConfig) -> Self {
        Self {
            store,
            cache,
            transactions,
            config,
        }
    }

    /// Create a cache manager after validating `config`.
    pub fn try_new(
        store: Arc<S>,
        cache: Arc<C>,
        transactions: Arc<T>,
        config: SitevarsConfig,
    ) -> SitevarsResult<Self> {
        config.validate()?;
        Ok(Self::new(store, cache, transactions, config))
    }

    /// Get the configuration.
    pub fn config(&self) -> &SitevarsConfig {
        &self.config
    }

    /// Get a reference to the backing store.
    pub fn store(&self) -> &S {
        &self.store
    }

    /// Get a reference to the shared cache.
    pub fn cache(&self) -> &C {
        &self.cache
    }

    /// Get a reference to the transaction coordinator.
    pub fn transactions(&self) -> &T {
        &self.transactions
    }

    /// Cache key for a site under the configured prefix.
    pub fn cache_key(&self, site_id: SiteId) -> SiteCacheKey {
        SiteCacheKey::new(self.config.key_prefix.as_str(), site_id)
    }

    /// Accessor bound to one site.
    pub fn for_site(&self, site_id: SiteId) -> SiteVars<'_, S, C, T> {
        SiteVars::new(self, site_id)
    }

    /// Get the full name -> value map for a site.
    ///
    /// - Cache disabled: always loads from the store, no cache calls at all.
    /// - Inside an open transaction: loads from the store so the caller sees
    ///   its own uncommitted writes; the cache is neither read nor populated.
    /// - Otherwise: returns the cached map on a hit. On a miss (or cache
    ///   error) loads from the store and populates the cache.
    ///
    /// A site with no variables yields an empty map.
    pub fn get_site_map(&self, site_id: SiteId) -> SitevarsResult<SiteVarMap> {
        if !self.config.use_cache {
            return self.load_from_store(site_id);
        }

        if self.transactions.in_transaction() {
            tracing::debug!(
                site_id = %site_id,
                "inside open transaction; reading site variables from store"
            );
            return self.load_from_store(site_id);
        }

        let key = self.cache_key(site_id);
        match self.cache.get(&key) {
            Ok(Some(map)) => {
                tracing::debug!(site_id = %site_id, "site variable cache hit");
                return Ok(map);
            }
            Ok(None) => {
                tracing::debug!(site_id = %site_id, "site variable cache miss");
            }
            Err(e) => {
                tracing::warn!(
                    site_id = %site_id,
                    error = %e,
                    "shared cache read failed; falling back to store"
                );
            }
        }

        let map = self.load_from_store(site_id)?;
        if let Err(e) = self.cache.set(&key, &map, self.config.cache_ttl) {
            tracing::warn!(
                site_id = %site_id,
                error = %e,
                "failed to populate shared cache"
            );
        }
        Ok(map)
    }

    /// Look up one variable, returning `default` when it is not set.
    pub fn get_value(
        &self,
        site_id: SiteId,
        name: &str,
        default: Option<&str>,
    ) -> SitevarsResult<Option<String>> {
        let map = self.get_site_map(site_id)?;
        Ok(map
            .get(name)
            .cloned()
            .or_else(|| default.map(str::to_string)))
    }

    /// Look up one variable and parse it.
    ///
    /// The string `default` is parsed the same way when the variable is not
    /// set. Returns `Ok(None)` when neither exists.
    pub fn get_value_as<V>(
        &self,
        site_id: SiteId,
        name: &str,
        default: Option<&str>,
    ) -> SitevarsResult<Option<V>>
    where
        V: FromStr,
        V::Err: std::fmt::Display,
    {
        match self.get_value(site_id, name, default)? {
            Some(raw) => raw.parse::<V>().map(Some).map_err(|e| {
                SitevarsError::from(ValidationError::InvalidValue {
                    field: name.to_string(),
                    reason: e.to_string(),
                })
            }),
            None => Ok(None),
        }
    }

    /// Drop a site's cached map.
    ///
    /// Inside an open transaction the delete is registered as a commit hook
    /// and nothing happens now; after a rollback it never happens. Outside a
    /// transaction the entry is deleted immediately. Deleting an absent entry
    /// is a no-op. Cache errors are logged, never returned.
    ///
    /// Does nothing when the cache is disabled.
    pub fn invalidate(&self, site_id: SiteId) {
        if !self.config.use_cache {
            return;
        }
        let key = self.cache_key(site_id);

        if self.transactions.in_transaction() {
            tracing::debug!(site_id = %site_id, "deferring site variable invalidation to commit");
            let cache = Arc::clone(&self.cache);
            self.transactions
                .on_commit(Box::new(move || delete_quietly(cache.as_ref(), &key)));
        } else {
            delete_quietly(self.cache.as_ref(), &key);
        }
    }

    /// Drop the cached map of every site the store knows about.
    ///
    /// Follows the same transaction policy as [`SiteVarCache::invalidate`],
    /// registering a single commit hook for the whole batch.
    pub fn invalidate_all(&self) -> SitevarsResult<()> {
        if !self.config.use_cache {
            return Ok(());
        }
        let keys: Vec<SiteCacheKey> = self
            .store
            .list_sites()?
            .into_iter()
            .map(|site_id| self.cache_key(site_id))
            .collect();

        if self.transactions.in_transaction() {
            tracing::debug!(sites = keys.len(), "deferring invalidation of all sites to commit");
            let cache = Arc::clone(&self.cache);
            self.transactions.on_commit(Box::new(move || {
                for key in &keys {
                    delete_quietly(cache.as_ref(), key);
                }
            }));
        } else {
            for key in &keys {
                delete_quietly(self.cache.as_ref(), key);
            }
        }
        Ok(())
    }

    /// Build a site's map straight from the store.
    pub fn load_from_store(&self, site_id: SiteId) -> SitevarsResult<SiteVarMap> {
        Ok(self
            .store
            .list_variables(site_id)?
            .into_iter()
            .map(|var| (var.name, var.value))
            .collect())
    }
}

fn delete_quietly<C: SharedCache + ?Sized>(cache: &C, key: &SiteCacheKey) {
    match cache.delete(key) {
        Ok(()) => {
            tracing::debug!(site_id = %key.site_id(), "site variable cache invalidated");
        }
        Err(e) => {
            tracing::warn!(
                site_id = %key.site_id(),
                error = %e,
                "failed to invalidate shared cache entry"
            );
        }
    }
}

impl<S, C, T> Clone for SiteVarCache<S, C, T>
where
    S: VariableStore,
    C: SharedCache + 'static,
    T: TransactionCoordinator,
{
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
            cache: Arc::clone(&self.cache),
            transactions: Arc::clone(&self.transactions),
            config: self.config.clone(),
        }
    }
}
