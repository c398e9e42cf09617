//! Sitevars Storage - Storage Traits and Transaction-Aware Cache
//!
//! Defines the backing store abstraction for site variables, the shared
//! cache and transaction coordinator seams, and the [`SiteVarCache`] manager
//! that keeps the per-site cache consistent with committed writes.

pub mod accessor;
pub mod cache;
pub mod manager;
pub mod memory;
pub mod transaction;
pub mod writer;

pub use accessor::SiteVars;
pub use cache::{
    CacheCalls, CacheStats, InMemoryCache, LmdbCacheError, LmdbSiteCache, SharedCache,
    SiteCacheKey,
};
pub use manager::SiteVarCache;
pub use memory::{MemoryDatabase, Transaction};
pub use transaction::{CommitCallback, NoTransactions, TransactionCoordinator};

use sitevars_core::{SiteId, SiteVar, SitevarsResult};

// ============================================================================
// STORAGE TRAIT
// ============================================================================

/// Durable storage for site variable records.
///
/// The (site, name) pair is unique. Every method must work both inside and
/// outside an open transaction; inside one, reads observe the transaction's
/// own uncommitted writes.
pub trait VariableStore: Send + Sync {
    /// List every variable belonging to a site, ordered by name.
    fn list_variables(&self, site_id: SiteId) -> SitevarsResult<Vec<SiteVar>>;

    /// Get a single variable.
    fn get_variable(&self, site_id: SiteId, name: &str) -> SitevarsResult<Option<SiteVar>>;

    /// Insert a new variable. Fails with `UniqueViolation` if it exists.
    fn create(&self, var: &SiteVar) -> SitevarsResult<()>;

    /// Replace the value of an existing variable. Fails with `NotFound` if absent.
    fn update(&self, var: &SiteVar) -> SitevarsResult<()>;

    /// Remove a variable. Fails with `NotFound` if absent.
    fn delete(&self, site_id: SiteId, name: &str) -> SitevarsResult<()>;

    /// List every site the store knows about.
    fn list_sites(&self) -> SitevarsResult<Vec<SiteId>>;
}
