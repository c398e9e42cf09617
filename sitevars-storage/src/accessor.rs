//! Per-site accessor.

use std::str::FromStr;

use sitevars_core::{SiteId, SiteVar, SiteVarMap, SitevarsResult};

use crate::cache::SharedCache;
use crate::manager::SiteVarCache;
use crate::transaction::TransactionCoordinator;
use crate::VariableStore;

/// Variable lookups bound to one site.
///
/// Obtained from [`SiteVarCache::for_site`]. Holds no state of its own;
/// every call goes through the manager.
pub struct SiteVars<'a, S, C, T>
where
    S: VariableStore,
    C: SharedCache + 'static,
    T: TransactionCoordinator,
{
    cache: &'a SiteVarCache<S, C, T>,
    site_id: SiteId,
}

impl<'a, S, C, T> SiteVars<'a, S, C, T>
where
    S: VariableStore,
    C: SharedCache + 'static,
    T: TransactionCoordinator,
{
    pub(crate) fn new(cache: &'a SiteVarCache<S, C, T>, site_id: SiteId) -> Self {
        Self { cache, site_id }
    }

    /// The site this accessor reads and writes.
    pub fn site_id(&self) -> SiteId {
        self.site_id
    }

    /// Every variable of the site.
    pub fn all(&self) -> SitevarsResult<SiteVarMap> {
        self.cache.get_site_map(self.site_id)
    }

    /// Look up one variable, falling back to `default`.
    pub fn get_value(&self, name: &str, default: Option<&str>) -> SitevarsResult<Option<String>> {
        self.cache.get_value(self.site_id, name, default)
    }

    /// Look up one variable and parse it with [`FromStr`].
    pub fn get_value_as<V>(&self, name: &str, default: Option<&str>) -> SitevarsResult<Option<V>>
    where
        V: FromStr,
        V::Err: std::fmt::Display,
    {
        self.cache.get_value_as(self.site_id, name, default)
    }

    /// Create or update a variable.
    pub fn set_value(&self, name: &str, value: impl Into<String>) -> SitevarsResult<SiteVar> {
        self.cache.set_value(self.site_id, name, value)
    }

    /// Remove a variable. Fails with `NotFound` if absent.
    pub fn delete(&self, name: &str) -> SitevarsResult<()> {
        self.cache.delete(self.site_id, name)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use sitevars_core::SitevarsConfig;

    use crate::cache::InMemoryCache;
    use crate::memory::MemoryDatabase;

    use super::*;

    fn setup() -> SiteVarCache<MemoryDatabase, InMemoryCache, MemoryDatabase> {
        let db = Arc::new(MemoryDatabase::new());
        SiteVarCache::new(
            Arc::clone(&db),
            Arc::new(InMemoryCache::new()),
            db,
            SitevarsConfig::default(),
        )
    }

    #[test]
    fn test_accessor_round_trip() {
        let cache = setup();
        let site = SiteId::new_v7();
        let vars = cache.for_site(site);

        assert_eq!(vars.site_id(), site);
        vars.set_value("greeting", "hi").unwrap();
        assert_eq!(
            vars.get_value("greeting", None).unwrap(),
            Some("hi".to_string())
        );

        vars.delete("greeting").unwrap();
        assert_eq!(
            vars.get_value("greeting", Some("bye")).unwrap(),
            Some("bye".to_string())
        );
    }

    #[test]
    fn test_accessor_is_site_scoped() {
        let cache = setup();
        let site1 = SiteId::new_v7();
        let site2 = SiteId::new_v7();

        cache.for_site(site1).set_value("testvar", "one").unwrap();
        cache.for_site(site2).set_value("testvar", "two").unwrap();

        assert_eq!(
            cache.for_site(site1).all().unwrap().get("testvar").cloned(),
            Some("one".to_string())
        );
        assert_eq!(
            cache.for_site(site2).all().unwrap().get("testvar").cloned(),
            Some("two".to_string())
        );
    }

    #[test]
    fn test_accessor_typed_read() {
        let cache = setup();
        let vars = cache.for_site(SiteId::new_v7());
        vars.set_value("maintenance", "true").unwrap();

        assert_eq!(vars.get_value_as::<bool>("maintenance", None).unwrap(), Some(true));
        assert!(vars.get_value_as::<i64>("maintenance", None).is_err());
    }
}
