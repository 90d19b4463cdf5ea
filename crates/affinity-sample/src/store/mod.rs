//! # Memory Store
//!
//! [`MemoryStore`] is a small embedded key/value database with the threading rules of a
//! mobile object database: a handle may only be used on the thread that opened it, it reads
//! from a snapshot that only moves forward when [`refresh`](MemoryStore::refresh) is called
//! (or when the handle commits), and writes must happen inside a write transaction.
//!
//! The committed data lives in a [`Volume`], the stand-in for the database file. Several
//! handles, on several threads, can be open on one volume at once.
//!
//! The handle is `!Send`, so the only way to use it from async code or from a pool of threads
//! is to put it behind an [`AffinityActor`](affinity_actor::AffinityActor):
//!
//! ```rust
//! use affinity_actor::AffinityActor;
//! use affinity_sample::model::Record;
//! use affinity_sample::store::{MemoryStore, StoreConfig, StoreError, Volume};
//!
//! let volume = Volume::new();
//! let actor = AffinityActor::<MemoryStore>::new("notes.db".to_string(), StoreConfig::new(volume.clone()));
//!
//! actor
//!     .invoke(|store: &mut MemoryStore| store.write(|tx| tx.put(Record::new("k", "v"))))
//!     .unwrap();
//! let found = actor
//!     .invoke(|store: &mut MemoryStore| store.find("k"))
//!     .unwrap();
//! assert_eq!(found.map(|r| r.value), Some("v".to_string()));
//! assert_eq!(volume.len(), 1);
//! ```

mod error;
mod volume;

pub use error::StoreError;
pub use volume::Volume;

use crate::model::Record;
use affinity_actor::ThreadConfined;
use std::collections::BTreeMap;
use std::marker::PhantomData;
use std::rc::Rc;
use std::thread::{self, ThreadId};
use tracing::{debug, info};
use volume::Change;

/// How a [`MemoryStore`] is opened. Part of the actor registry key.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct StoreConfig {
    pub volume: Volume,
    pub read_only: bool,
}

impl StoreConfig {
    pub fn new(volume: Volume) -> Self {
        Self {
            volume,
            read_only: false,
        }
    }

    pub fn read_only(mut self) -> Self {
        self.read_only = true;
        self
    }
}

/// A thread-confined handle on a [`Volume`].
pub struct MemoryStore {
    path: String,
    config: StoreConfig,
    owner: ThreadId,
    snapshot: BTreeMap<String, Record>,
    version: u64,
    pending: Option<Vec<Change>>,
    _confined: PhantomData<Rc<()>>,
}

impl MemoryStore {
    /// Opens a handle on the calling thread. The handle is bound to that thread for life.
    pub fn open(path: impl Into<String>, config: StoreConfig) -> Self {
        let (snapshot, version) = config.volume.snapshot();
        Self {
            path: path.into(),
            config,
            owner: thread::current().id(),
            snapshot,
            version,
            pending: None,
            _confined: PhantomData,
        }
    }

    fn check_thread(&self) -> Result<(), StoreError> {
        let actual = thread::current().id();
        if actual == self.owner {
            Ok(())
        } else {
            Err(StoreError::WrongThread {
                path: self.path.clone(),
                owner: self.owner,
                actual,
            })
        }
    }

    fn pending_mut(&mut self) -> Result<&mut Vec<Change>, StoreError> {
        self.check_thread()?;
        if self.config.read_only {
            return Err(StoreError::ReadOnly(self.path.clone()));
        }
        self.pending.as_mut().ok_or(StoreError::NotInTransaction)
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn owner(&self) -> ThreadId {
        self.owner
    }

    /// Version of the snapshot this handle currently reads from.
    pub fn version(&self) -> u64 {
        self.version
    }

    pub fn is_read_only(&self) -> bool {
        self.config.read_only
    }

    pub fn is_in_transaction(&self) -> bool {
        self.pending.is_some()
    }

    /// Moves the snapshot to the latest committed version. Returns whether anything changed.
    ///
    /// Inside a write transaction the snapshot is left alone.
    pub fn refresh(&mut self) -> Result<bool, StoreError> {
        self.check_thread()?;
        if self.pending.is_some() || self.config.volume.version() == self.version {
            return Ok(false);
        }
        let (changes, version) = self.config.volume.changes_since(self.version);
        for change in changes {
            change.apply(&mut self.snapshot);
        }
        self.version = version;
        Ok(true)
    }

    /// Looks up `key`, including uncommitted writes of the open transaction.
    pub fn find(&self, key: &str) -> Result<Option<Record>, StoreError> {
        self.check_thread()?;
        if let Some(pending) = &self.pending {
            for change in pending.iter().rev() {
                match change {
                    Change::Put(record) if record.key == key => return Ok(Some(record.clone())),
                    Change::Clear => return Ok(None),
                    Change::Put(_) => {}
                }
            }
        }
        Ok(self.snapshot.get(key).cloned())
    }

    /// Like [`find`](Self::find), but a missing key is an error.
    pub fn get(&self, key: &str) -> Result<Record, StoreError> {
        self.find(key)?
            .ok_or_else(|| StoreError::NotFound(key.to_string()))
    }

    /// All visible records, ordered by key.
    pub fn records(&self) -> Result<Vec<Record>, StoreError> {
        self.check_thread()?;
        let mut view = self.snapshot.clone();
        for change in self.pending.iter().flatten().cloned() {
            change.apply(&mut view);
        }
        Ok(view.into_values().collect())
    }

    pub fn len(&self) -> Result<usize, StoreError> {
        self.records().map(|records| records.len())
    }

    /// Inserts or replaces a record. Requires an open write transaction.
    pub fn put(&mut self, record: Record) -> Result<(), StoreError> {
        self.pending_mut()?.push(Change::Put(record));
        Ok(())
    }

    /// Deletes every record. Requires an open write transaction.
    pub fn remove_all(&mut self) -> Result<(), StoreError> {
        self.pending_mut()?.push(Change::Clear);
        Ok(())
    }

    pub fn begin_write(&mut self) -> Result<(), StoreError> {
        self.check_thread()?;
        if self.config.read_only {
            return Err(StoreError::ReadOnly(self.path.clone()));
        }
        if self.pending.is_some() {
            return Err(StoreError::AlreadyInTransaction);
        }
        // A write transaction always starts from the latest data.
        self.refresh()?;
        self.pending = Some(Vec::new());
        Ok(())
    }

    pub fn commit_write(&mut self) -> Result<(), StoreError> {
        self.check_thread()?;
        let changes = self.pending.take().ok_or(StoreError::NotInTransaction)?;
        let count = changes.len();
        let version = self.config.volume.commit(changes);
        self.refresh()?;
        debug!(path = %self.path, version, changes = count, "Write committed");
        Ok(())
    }

    pub fn cancel_write(&mut self) -> Result<(), StoreError> {
        self.check_thread()?;
        self.pending.take().ok_or(StoreError::NotInTransaction)?;
        Ok(())
    }

    /// Runs `f` in a write transaction, committing on `Ok` and cancelling on `Err`.
    pub fn write<T>(
        &mut self,
        f: impl FnOnce(&mut Self) -> Result<T, StoreError>,
    ) -> Result<T, StoreError> {
        self.begin_write()?;
        match f(self) {
            Ok(value) => {
                self.commit_write()?;
                Ok(value)
            }
            Err(e) => {
                self.cancel_write()?;
                Err(e)
            }
        }
    }
}

impl ThreadConfined for MemoryStore {
    type Identity = String;
    type Config = StoreConfig;
    type Error = StoreError;

    fn open(path: &String, config: &StoreConfig) -> Result<Self, StoreError> {
        let store = MemoryStore::open(path.clone(), config.clone());
        info!(path = %path, version = store.version, read_only = config.read_only, "Store opened");
        Ok(store)
    }

    fn refresh(&mut self) -> Result<(), StoreError> {
        MemoryStore::refresh(self).map(|_| ())
    }

    fn begin_transaction(&mut self) -> Result<(), StoreError> {
        self.begin_write()
    }

    fn commit_transaction(&mut self) -> Result<(), StoreError> {
        self.commit_write()
    }

    fn rollback_transaction(&mut self) -> Result<(), StoreError> {
        self.cancel_write()
    }

    fn close(mut self) -> Result<(), StoreError> {
        self.check_thread()?;
        if self.pending.is_some() {
            self.cancel_write()?;
        }
        info!(path = %self.path, version = self.version, "Store closed");
        Ok(())
    }
}
