//! Site-scoped cache keys.
//!
//! A `SiteCacheKey` cannot be built without a site, so every cache operation
//! is partitioned by site by construction.

use sitevars_core::{SiteId, DEFAULT_KEY_PREFIX};

/// Separator between the namespace prefix and the site identifier.
const SEPARATOR: char = ':';

/// Cache key for one site's variable map.
///
/// # Format
///
/// `"{prefix}:{site_id}"`, e.g. `sitevars:0190f1c2-...`. The prefix lets
/// several applications share one cache service without colliding.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SiteCacheKey {
    /// Private inner data - cannot be constructed externally
    inner: SiteKeyInner,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct SiteKeyInner {
    prefix: String,
    site_id: SiteId,
}

impl SiteCacheKey {
    /// Create a key under the given namespace prefix.
    pub fn new(prefix: impl Into<String>, site_id: SiteId) -> Self {
        Self {
            inner: SiteKeyInner {
                prefix: prefix.into(),
                site_id,
            },
        }
    }

    /// Create a key under the default `sitevars` prefix.
    pub fn for_site(site_id: SiteId) -> Self {
        Self::new(DEFAULT_KEY_PREFIX, site_id)
    }

    /// The site this key belongs to.
    pub fn site_id(&self) -> SiteId {
        self.inner.site_id
    }

    /// The namespace prefix.
    pub fn prefix(&self) -> &str {
        &self.inner.prefix
    }

    /// Encode to the string form used by cache services.
    pub fn encode(&self) -> String {
        format!("{}{}{}", self.inner.prefix, SEPARATOR, self.inner.site_id)
    }

    /// Decode a key previously produced by [`SiteCacheKey::encode`].
    ///
    /// Returns `None` if there is no separator, the prefix is empty, or the
    /// site part is not a valid site identifier.
    pub fn decode(encoded: &str) -> Option<Self> {
        let (prefix, site) = encoded.rsplit_once(SEPARATOR)?;
        if prefix.is_empty() {
            return None;
        }
        let site_id = site.parse().ok()?;
        Some(Self::new(prefix, site_id))
    }
}

impl std::fmt::Display for SiteCacheKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}{}{}", self.inner.prefix, SEPARATOR, self.inner.site_id)
    }
}
