//! In-memory transactional backing store.
//!
//! [`MemoryDatabase`] models a single database connection: it stores site
//! variable records and is also the [`TransactionCoordinator`] for writes
//! made through it. Nested [`MemoryDatabase::begin`] calls behave as
//! savepoints.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, RwLock};

use sitevars_core::{SiteId, SiteVar, SitevarsError, SitevarsResult, StorageError};

use crate::transaction::{CommitCallback, TransactionCoordinator};
use crate::VariableStore;

type RecordKey = (SiteId, String);
type Records = BTreeMap<RecordKey, String>;

/// One open transaction or savepoint.
struct Frame {
    id: u64,
    /// Records as they were when this frame began.
    snapshot: Records,
    /// Known sites as they were when this frame began.
    sites: BTreeSet<SiteId>,
    callbacks: Vec<CommitCallback>,
}

impl fmt::Debug for Frame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Frame")
            .field("id", &self.id)
            .field("snapshot_len", &self.snapshot.len())
            .field("sites", &self.sites.len())
            .field("callbacks", &self.callbacks.len())
            .finish()
    }
}

/// In-memory store with transactions and commit hooks.
#[derive(Debug, Default)]
pub struct MemoryDatabase {
    records: RwLock<Records>,
    sites: RwLock<BTreeSet<SiteId>>,
    frames: Mutex<Vec<Frame>>,
    next_transaction_id: AtomicU64,
}

impl MemoryDatabase {
    /// Create an empty database.
    pub fn new() -> Self {
        Self::default()
    }

    /// Make a site known to [`VariableStore::list_sites`] without giving it
    /// any variables.
    pub fn register_site(&self, site_id: SiteId) -> SitevarsResult<()> {
        self.sites
            .write()
            .map_err(|_| StorageError::LockPoisoned)?
            .insert(site_id);
        Ok(())
    }

    /// Write a record directly, bypassing any cache layer.
    ///
    /// Simulates another writer touching the database.
    pub fn raw_set(&self, site_id: SiteId, name: &str, value: &str) -> SitevarsResult<()> {
        self.register_site(site_id)?;
        self.write_records()?
            .insert((site_id, name.to_string()), value.to_string());
        Ok(())
    }

    /// Total number of records across all sites.
    pub fn record_count(&self) -> SitevarsResult<usize> {
        Ok(self.read_records()?.len())
    }

    /// Number of open transactions and savepoints.
    pub fn depth(&self) -> SitevarsResult<usize> {
        Ok(self.lock_frames()?.len())
    }

    /// Open a transaction, or a savepoint if one is already open.
    ///
    /// The returned guard rolls back when dropped unfinished.
    pub fn begin(&self) -> SitevarsResult<Transaction<'_>> {
        let snapshot = self.read_records()?.clone();
        let sites = self
            .sites
            .read()
            .map_err(|_| StorageError::LockPoisoned)?
            .clone();
        let id = self.next_transaction_id.fetch_add(1, Ordering::SeqCst) + 1;
        self.lock_frames()?.push(Frame {
            id,
            snapshot,
            sites,
            callbacks: Vec::new(),
        });
        tracing::trace!(transaction_id = id, "transaction opened");
        Ok(Transaction {
            db: self,
            id,
            finished: false,
        })
    }

    /// Run `f` inside a transaction, committing on `Ok` and rolling back on `Err`.
    pub fn atomic<R, E, F>(&self, f: F) -> Result<R, E>
    where
        F: FnOnce() -> Result<R, E>,
        E: From<SitevarsError>,
    {
        let transaction = self.begin()?;
        match f() {
            Ok(value) => {
                transaction.commit()?;
                Ok(value)
            }
            Err(e) => {
                if let Err(rollback_err) = transaction.rollback() {
                    tracing::error!(error = %rollback_err, "rollback failed");
                }
                Err(e)
            }
        }
    }

    fn commit_frame(&self, id: u64) -> SitevarsResult<()> {
        let callbacks = {
            let mut frames = self.lock_frames()?;
            let frame = pop_innermost(&mut frames, id)?;
            match frames.last_mut() {
                Some(parent) => {
                    // Savepoint release: hooks wait for the outer commit.
                    parent.callbacks.extend(frame.callbacks);
                    tracing::trace!(transaction_id = id, "savepoint released");
                    return Ok(());
                }
                None => frame.callbacks,
            }
        };

        tracing::trace!(
            transaction_id = id,
            callbacks = callbacks.len(),
            "transaction committed"
        );
        for callback in callbacks {
            callback();
        }
        Ok(())
    }

    fn rollback_frame(&self, id: u64) -> SitevarsResult<()> {
        let frame = {
            let mut frames = self.lock_frames()?;
            pop_innermost(&mut frames, id)?
        };
        *self.write_records()? = frame.snapshot;
        *self
            .sites
            .write()
            .map_err(|_| StorageError::LockPoisoned)? = frame.sites;
        tracing::trace!(
            transaction_id = id,
            discarded_callbacks = frame.callbacks.len(),
            "transaction rolled back"
        );
        Ok(())
    }

    fn read_records(&self) -> SitevarsResult<std::sync::RwLockReadGuard<'_, Records>> {
        self.records
            .read()
            .map_err(|_| SitevarsError::from(StorageError::LockPoisoned))
    }

    fn write_records(&self) -> SitevarsResult<std::sync::RwLockWriteGuard<'_, Records>> {
        self.records
            .write()
            .map_err(|_| SitevarsError::from(StorageError::LockPoisoned))
    }

    fn lock_frames(&self) -> SitevarsResult<std::sync::MutexGuard<'_, Vec<Frame>>> {
        self.frames
            .lock()
            .map_err(|_| SitevarsError::from(StorageError::LockPoisoned))
    }
}

fn pop_innermost(frames: &mut Vec<Frame>, id: u64) -> SitevarsResult<Frame> {
    match frames.last() {
        Some(frame) if frame.id == id => {}
        _ => {
            return Err(StorageError::TransactionFailed {
                reason: format!("transaction {} is not the innermost open transaction", id),
            }
            .into())
        }
    }
    frames.pop().ok_or_else(|| {
        StorageError::TransactionFailed {
            reason: "no open transaction".to_string(),
        }
        .into()
    })
}

/// Guard for an open transaction or savepoint on a [`MemoryDatabase`].
#[derive(Debug)]
pub struct Transaction<'a> {
    db: &'a MemoryDatabase,
    id: u64,
    finished: bool,
}

impl Transaction<'_> {
    /// Transaction identifier, unique per database.
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Commit. For the outermost transaction this runs every commit hook
    /// registered inside it.
    pub fn commit(mut self) -> SitevarsResult<()> {
        self.finished = true;
        self.db.commit_frame(self.id)
    }

    /// Roll back, restoring records and dropping registered commit hooks.
    pub fn rollback(mut self) -> SitevarsResult<()> {
        self.finished = true;
        self.db.rollback_frame(self.id)
    }
}

impl Drop for Transaction<'_> {
    fn drop(&mut self) {
        if !self.finished {
            if let Err(e) = self.db.rollback_frame(self.id) {
                tracing::error!(transaction_id = self.id, error = %e, "implicit rollback failed");
            }
        }
    }
}

impl TransactionCoordinator for MemoryDatabase {
    fn in_transaction(&self) -> bool {
        self.frames.lock().map(|f| !f.is_empty()).unwrap_or(false)
    }

    fn on_commit(&self, callback: CommitCallback) {
        let deferred = match self.frames.lock() {
            Ok(mut frames) => match frames.last_mut() {
                Some(frame) => {
                    frame.callbacks.push(callback);
                    None
                }
                None => Some(callback),
            },
            Err(_) => {
                tracing::error!("transaction state poisoned; dropping commit hook");
                None
            }
        };
        if let Some(callback) = deferred {
            callback();
        }
    }
}

impl VariableStore for MemoryDatabase {
    fn list_variables(&self, site_id: SiteId) -> SitevarsResult<Vec<SiteVar>> {
        let records = self.read_records()?;
        Ok(records
            .iter()
            .filter(|((site, _), _)| *site == site_id)
            .map(|((site, name), value)| SiteVar {
                site_id: *site,
                name: name.clone(),
                value: value.clone(),
            })
            .collect())
    }

    fn get_variable(&self, site_id: SiteId, name: &str) -> SitevarsResult<Option<SiteVar>> {
        let records = self.read_records()?;
        Ok(records
            .get(&(site_id, name.to_string()))
            .map(|value| SiteVar {
                site_id,
                name: name.to_string(),
                value: value.clone(),
            }))
    }

    fn create(&self, var: &SiteVar) -> SitevarsResult<()> {
        self.register_site(var.site_id)?;
        let mut records = self.write_records()?;
        let key = (var.site_id, var.name.clone());
        if records.contains_key(&key) {
            return Err(StorageError::UniqueViolation {
                site_id: var.site_id,
                name: var.name.clone(),
            }
            .into());
        }
        records.insert(key, var.value.clone());
        Ok(())
    }

    fn update(&self, var: &SiteVar) -> SitevarsResult<()> {
        let mut records = self.write_records()?;
        let value = records
            .get_mut(&(var.site_id, var.name.clone()))
            .ok_or_else(|| StorageError::NotFound {
                site_id: var.site_id,
                name: var.name.clone(),
            })?;
        *value = var.value.clone();
        Ok(())
    }

    fn delete(&self, site_id: SiteId, name: &str) -> SitevarsResult<()> {
        let mut records = self.write_records()?;
        records
            .remove(&(site_id, name.to_string()))
            .map(|_| ())
            .ok_or_else(|| {
                StorageError::NotFound {
                    site_id,
                    name: name.to_string(),
                }
                .into()
            })
    }

    fn list_sites(&self) -> SitevarsResult<Vec<SiteId>> {
        let sites = self
            .sites
            .read()
            .map_err(|_| StorageError::LockPoisoned)?;
        Ok(sites.iter().copied().collect())
    }
}
