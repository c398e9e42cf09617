//! Write path for site variables.
//!
//! Every operation persists first and invalidates second. A persistence
//! error returns before invalidation, so a failed write never touches the
//! cache. Cache errors during invalidation are swallowed by
//! [`SiteVarCache::invalidate`].

use sitevars_core::{validate_name, SiteId, SiteVar, SitevarsResult};

use crate::cache::SharedCache;
use crate::manager::SiteVarCache;
use crate::transaction::TransactionCoordinator;
use crate::VariableStore;

impl<S, C, T> SiteVarCache<S, C, T>
where
    S: VariableStore,
    C: SharedCache + 'static,
    T: TransactionCoordinator,
{
    /// Insert a new variable. Fails with `UniqueViolation` if it already exists.
    pub fn create(&self, var: &SiteVar) -> SitevarsResult<()> {
        validate_name(&var.name)?;
        self.store().create(var)?;
        self.invalidate(var.site_id);
        Ok(())
    }

    /// Change the value of an existing variable. Fails with `NotFound` if absent.
    pub fn update(&self, var: &SiteVar) -> SitevarsResult<()> {
        validate_name(&var.name)?;
        self.store().update(var)?;
        self.invalidate(var.site_id);
        Ok(())
    }

    /// Create or update a variable, returning the stored record.
    pub fn set_value(
        &self,
        site_id: SiteId,
        name: &str,
        value: impl Into<String>,
    ) -> SitevarsResult<SiteVar> {
        let var = SiteVar::new(site_id, name, value)?;
        self.upsert(&var)?;
        self.invalidate(site_id);
        Ok(var)
    }

    /// Remove a variable. Fails with `NotFound` if absent.
    pub fn delete(&self, site_id: SiteId, name: &str) -> SitevarsResult<()> {
        self.store().delete(site_id, name)?;
        self.invalidate(site_id);
        Ok(())
    }

    /// Upsert several variables of one site, invalidating once.
    ///
    /// All names are validated before anything is written. If a write fails
    /// part way, the records already written stay written and the site is
    /// still invalidated before the error is returned.
    ///
    /// Returns the number of records written.
    pub fn set_many<I, K, V>(&self, site_id: SiteId, values: I) -> SitevarsResult<usize>
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        let vars = values
            .into_iter()
            .map(|(name, value)| SiteVar::new(site_id, name, value))
            .collect::<SitevarsResult<Vec<_>>>()?;

        let mut written = 0;
        let mut outcome = Ok(());
        for var in &vars {
            if let Err(e) = self.upsert(var) {
                outcome = Err(e);
                break;
            }
            written += 1;
        }

        if written > 0 {
            self.invalidate(site_id);
        }
        outcome.map(|()| written)
    }

    fn upsert(&self, var: &SiteVar) -> SitevarsResult<()> {
        match self.store().get_variable(var.site_id, &var.name)? {
            Some(existing) if existing.value == var.value => Ok(()),
            Some(_) => self.store().update(var),
            None => self.store().create(var),
        }
    }
}
