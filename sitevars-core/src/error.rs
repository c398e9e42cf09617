//! Error types for site variable operations

use crate::SiteId;
use thiserror::Error;

/// Backing store errors.
///
/// These are the only errors a write operation can report; they are passed
/// to the caller unmodified.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum StorageError {
    #[error("Site variable not found: {name} on site {site_id}")]
    NotFound { site_id: SiteId, name: String },

    #[error("Site variable already exists: {name} on site {site_id}")]
    UniqueViolation { site_id: SiteId, name: String },

    #[error("Backend error: {reason}")]
    Backend { reason: String },

    #[error("Transaction failed: {reason}")]
    TransactionFailed { reason: String },

    #[error("Storage lock poisoned")]
    LockPoisoned,
}

/// Shared cache service errors.
///
/// The cache is disposable, so the cache manager logs and swallows these.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum CacheError {
    #[error("Cache unavailable: {reason}")]
    Unavailable { reason: String },

    #[error("Cache serialization error: {reason}")]
    Serialization { reason: String },

    #[error("Cache deserialization error: {reason}")]
    Deserialization { reason: String },

    #[error("Cache environment error: {reason}")]
    Environment { reason: String },
}

/// Validation errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("Required field missing: {field}")]
    RequiredFieldMissing { field: String },

    #[error("Variable name too long: {got} characters, max {max}")]
    NameTooLong { max: usize, got: usize },

    #[error("Invalid value for {field}: {reason}")]
    InvalidValue { field: String, reason: String },
}

/// Configuration errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Invalid value for {field}: {value} - {reason}")]
    InvalidValue {
        field: String,
        value: String,
        reason: String,
    },
}

/// Master error type for all sitevars errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum SitevarsError {
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Cache error: {0}")]
    Cache(#[from] CacheError),

    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    #[error("Config error: {0}")]
    Config(#[from] ConfigError),
}

/// Result type alias for sitevars operations.
pub type SitevarsResult<T> = Result<T, SitevarsError>;

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    #[test]
    fn test_storage_error_display_not_found() {
        let err = StorageError::NotFound {
            site_id: SiteId::new(Uuid::nil()),
            name: "greeting".to_string(),
        };
        let msg = format!("{}", err);
        assert!(msg.contains("not found"));
        assert!(msg.contains("greeting"));
        assert!(msg.contains("00000000-0000-0000-0000-000000000000"));
    }

    #[test]
    fn test_storage_error_display_unique_violation() {
        let err = StorageError::UniqueViolation {
            site_id: SiteId::new(Uuid::nil()),
            name: "greeting".to_string(),
        };
        assert!(err.to_string().contains("already exists"));
    }

    #[test]
    fn test_validation_error_display_name_too_long() {
        let err = ValidationError::NameTooLong { max: 100, got: 120 };
        let msg = format!("{}", err);
        assert!(msg.contains("120"));
        assert!(msg.contains("100"));
    }

    #[test]
    fn test_sitevars_error_from_variants() {
        let storage = SitevarsError::from(StorageError::LockPoisoned);
        assert!(matches!(storage, SitevarsError::Storage(_)));

        let cache = SitevarsError::from(CacheError::Unavailable {
            reason: "connection refused".to_string(),
        });
        assert!(matches!(cache, SitevarsError::Cache(_)));

        let validation = SitevarsError::from(ValidationError::RequiredFieldMissing {
            field: "name".to_string(),
        });
        assert!(matches!(validation, SitevarsError::Validation(_)));

        let config = SitevarsError::from(ConfigError::InvalidValue {
            field: "key_prefix".to_string(),
            value: "".to_string(),
            reason: "must not be empty".to_string(),
        });
        assert!(matches!(config, SitevarsError::Config(_)));
    }
}
