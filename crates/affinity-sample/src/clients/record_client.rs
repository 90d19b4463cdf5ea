//! # Record Client
//!
//! A domain-level API over an [`ActorHandle<MemoryStore>`]. Callers never see the store or
//! the actor's closures: they call typed methods from any thread or task, and the client
//! turns each one into a work item for the store's worker thread.
//!
//! The async methods go through [`invoke_async`](affinity_actor::AffinityActor::invoke_async)
//! and never block the calling runtime. The blocking methods use
//! [`invoke`](affinity_actor::AffinityActor::invoke) and belong on plain threads or inside
//! `spawn_blocking`.

use crate::model::Record;
use crate::store::{MemoryStore, StoreError};
use affinity_actor::{ActorHandle, AffinityError, Confined};
use std::sync::mpsc::{Receiver, Sender};
use thiserror::Error;
use tracing::{debug, instrument};

#[derive(Debug, Error)]
pub enum RecordError {
    #[error("store error: {0}")]
    Store(#[from] StoreError),

    #[error("actor error: {0}")]
    Actor(AffinityError),
}

impl From<AffinityError> for RecordError {
    fn from(e: AffinityError) -> Self {
        match e.action_error::<StoreError>() {
            Some(store_error) => RecordError::Store(store_error.clone()),
            None => RecordError::Actor(e),
        }
    }
}

/// Client for one record store. Cloning shares the same actor.
#[derive(Clone)]
pub struct RecordClient {
    handle: ActorHandle<MemoryStore>,
}

impl RecordClient {
    pub fn new(handle: ActorHandle<MemoryStore>) -> Self {
        Self { handle }
    }

    pub fn path(&self) -> &str {
        self.handle.identity()
    }

    /// The underlying actor handle, for work the typed methods do not cover.
    pub fn handle(&self) -> &ActorHandle<MemoryStore> {
        &self.handle
    }

    /// Gives up this client's reference to the store actor.
    pub fn release(self) {
        self.handle.release();
    }

    #[instrument(skip(self, record), fields(path = %self.path(), key = %record.key))]
    pub async fn put(&self, record: Record) -> Result<(), RecordError> {
        debug!("Sending request");
        self.handle
            .invoke_async(move |store: Confined<MemoryStore>| async move {
                store.with(|store| store.write(|tx| tx.put(record)))
            })
            .await?;
        Ok(())
    }

    /// Writes `records` in a single write transaction opened inside the action.
    #[instrument(skip(self, records), fields(path = %self.path(), count = records.len()))]
    pub async fn put_batch(&self, records: Vec<Record>) -> Result<usize, RecordError> {
        debug!("Sending request");
        let written = self
            .handle
            .invoke_async(move |store: Confined<MemoryStore>| async move {
                // Give the worker's other tasks a turn before the long write.
                tokio::task::yield_now().await;
                store.with(|store| {
                    store.write(|tx| {
                        let count = records.len();
                        for record in records {
                            tx.put(record)?;
                        }
                        Ok(count)
                    })
                })
            })
            .await?;
        Ok(written)
    }

    #[instrument(skip(self), fields(path = %self.path()))]
    pub async fn find(&self, key: String) -> Result<Option<Record>, RecordError> {
        debug!("Sending request");
        let found = self
            .handle
            .invoke_async(move |store: Confined<MemoryStore>| async move {
                store.with(|store| store.find(&key))
            })
            .await?;
        Ok(found)
    }

    #[instrument(skip(self), fields(path = %self.path()))]
    pub async fn count(&self) -> Result<usize, RecordError> {
        let count = self
            .handle
            .invoke_async(|store: Confined<MemoryStore>| async move { store.with(|store| store.len()) })
            .await?;
        Ok(count)
    }

    /// Deletes every record and waits for the commit.
    pub fn clear(&self) -> Result<(), RecordError> {
        self.handle
            .invoke(|store: &mut MemoryStore| store.write(|tx| tx.remove_all()))?;
        Ok(())
    }

    /// Queues `records` for writing and returns at once.
    ///
    /// The records are added with [`MemoryStore::put`], so this must run inside an actor
    /// transaction ([`begin_transaction`](Self::begin_transaction)); otherwise the write is
    /// refused on the worker and only logged.
    #[instrument(skip(self, records), fields(path = %self.path(), count = records.len()))]
    pub fn enqueue_batch(&self, records: Vec<Record>) -> Result<(), RecordError> {
        self.handle.begin_invoke(move |store: &mut MemoryStore| {
            for record in records {
                store.put(record)?;
            }
            Ok::<_, StoreError>(())
        })?;
        Ok(())
    }

    pub fn begin_transaction(&self) -> Result<(), RecordError> {
        Ok(self.handle.begin_transaction()?)
    }

    pub fn commit_transaction(&self) -> Result<(), RecordError> {
        Ok(self.handle.commit_transaction()?)
    }

    pub fn rollback_transaction(&self) -> Result<(), RecordError> {
        Ok(self.handle.rollback_transaction()?)
    }

    /// Commits each record in its own write transaction, handing its key to `keys` as soon
    /// as it is durable. Blocks until every record is written.
    #[instrument(skip_all, fields(path = %self.path(), count = records.len()))]
    pub fn write_each(&self, records: Vec<Record>, keys: Sender<String>) -> Result<usize, RecordError> {
        let written = self.handle.invoke(move |store: &mut MemoryStore| {
            let mut written = 0;
            for record in records {
                let key = record.key.clone();
                store.write(|tx| tx.put(record))?;
                written += 1;
                if keys.send(key).is_err() {
                    break;
                }
            }
            Ok::<_, StoreError>(written)
        })?;
        Ok(written)
    }

    /// Reads every key arriving on `keys` until the sender hangs up, refreshing before each
    /// lookup. Fails if a key is not found. Returns the number of keys read.
    ///
    /// The whole loop is one work item, so the automatic refresh between items does not
    /// apply; the store is refreshed by hand.
    #[instrument(skip_all, fields(path = %self.path()))]
    pub fn follow(&self, keys: Receiver<String>) -> Result<usize, RecordError> {
        let read = self.handle.invoke(move |store: &mut MemoryStore| {
            let mut read = 0;
            for key in keys {
                store.refresh()?;
                store.get(&key)?;
                read += 1;
            }
            Ok::<_, StoreError>(read)
        })?;
        Ok(read)
    }
}
