//! Shared cache seam and backends for per-site variable maps.
//!
//! The shared cache is a disposable accelerator, never the source of truth.
//! It holds exactly one shape: the full [`SiteVarMap`] of a site, stored
//! under a [`SiteCacheKey`]. Entries may vanish at any moment (eviction, TTL,
//! another process invalidating) and the manager falls back to the store.
//!
//! Two backends are provided:
//!
//! - [`InMemoryCache`]: process-local, counts every call, and can simulate an
//!   unreachable service.
//! - [`LmdbSiteCache`]: memory-mapped LMDB file that several worker
//!   processes on one host can share.
//!
//! [`SiteVarMap`]: sitevars_core::SiteVarMap

pub mod key;
pub mod lmdb_backend;
pub mod memory;
pub mod traits;

pub use key::SiteCacheKey;
pub use lmdb_backend::{LmdbCacheError, LmdbSiteCache};
pub use memory::{CacheCalls, InMemoryCache};
pub use traits::{CacheStats, SharedCache};
