//! Sitevars Core - Site Variable Types
//!
//! Pure data structures shared by every sitevars crate: the site identifier,
//! the variable record, the cached per-site map, the error taxonomy and the
//! configuration. This crate contains no storage or caching behavior.

pub mod config;
pub mod entities;
pub mod error;
pub mod identity;

pub use config::{
    SitevarsConfig, DEFAULT_KEY_PREFIX, ENV_CACHE_KEY_PREFIX, ENV_CACHE_TTL_SECS, ENV_USE_CACHE,
    MAX_CACHE_TTL,
};
pub use entities::{validate_name, SiteVar, SiteVarMap, MAX_NAME_LENGTH};
pub use error::{
    CacheError, ConfigError, SitevarsError, SitevarsResult, StorageError, ValidationError,
};
pub use identity::SiteId;
