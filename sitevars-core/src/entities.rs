//! Variable records and the per-site map

use crate::{SiteId, SitevarsResult, ValidationError};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Maximum length of a variable name, in characters.
pub const MAX_NAME_LENGTH: usize = 100;

/// Name -> value view of every variable belonging to one site.
///
/// This is the only shape the shared cache ever holds. It is always
/// reconstructible from the site's variable records.
pub type SiteVarMap = BTreeMap<String, String>;

/// A durable (site, name) -> value record.
///
/// The (site_id, name) pair is unique in the backing store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SiteVar {
    pub site_id: SiteId,
    pub name: String,
    pub value: String,
}

impl SiteVar {
    /// Build a record, validating the name.
    pub fn new(
        site_id: SiteId,
        name: impl Into<String>,
        value: impl Into<String>,
    ) -> SitevarsResult<Self> {
        let name = name.into();
        validate_name(&name)?;
        Ok(Self {
            site_id,
            name,
            value: value.into(),
        })
    }
}

impl fmt::Display for SiteVar {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}={} ({})", self.name, self.value, self.site_id)
    }
}

/// Check that a variable name is non-empty and within [`MAX_NAME_LENGTH`].
pub fn validate_name(name: &str) -> Result<(), ValidationError> {
    if name.is_empty() {
        return Err(ValidationError::RequiredFieldMissing {
            field: "name".to_string(),
        });
    }
    let len = name.chars().count();
    if len > MAX_NAME_LENGTH {
        return Err(ValidationError::NameTooLong {
            max: MAX_NAME_LENGTH,
            got: len,
        });
    }
    Ok(())
}
