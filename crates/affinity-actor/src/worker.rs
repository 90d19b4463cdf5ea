//! # Worker Thread
//!
//! The dedicated OS thread behind every [`AffinityActor`](crate::AffinityActor). It runs a
//! current-thread Tokio runtime with a [`LocalSet`], so async actions can suspend without
//! the resource ever leaving this thread, and pulls work items from the mailbox in order.
//!
//! Per item the worker:
//! 1. opens the resource if this is the first item (a failed open poisons the actor:
//!    every later item fails with the same `ResourceOpen` error);
//! 2. refreshes the resource unless an explicit transaction is open;
//!    if that transaction failed to begin, fails the item instead of running it outside the
//!    transaction, until the matching commit or rollback arrives;
//! 3. runs the job, or spawns it onto the local set if it is async and yields once so the
//!    action's synchronous prefix runs before the next item is taken.
//!
//! On shutdown it lets (or, when abandoning, stops) outstanding async work, rolls back a
//! transaction left open, closes the resource on this same thread and marks the actor
//! stopped.

use crate::actor::{Control, WorkerState};
use crate::confined::Confined;
use crate::error::AffinityError;
use crate::mailbox::{Mailbox, ShutdownMode};
use crate::resource::ThreadConfined;
use crate::work_item::{Job, TransactionStep, WorkItem};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread::{self, JoinHandle};
use tokio::task::LocalSet;
use tracing::{debug, debug_span, error, info, warn};

/// Everything the worker thread needs, moved onto it at spawn time.
pub(crate) struct Worker<R: ThreadConfined> {
    pub identity: R::Identity,
    pub config: R::Config,
    pub mailbox: Arc<Mailbox<R>>,
    pub control: Arc<Mutex<Control>>,
    /// Teardown of a previous actor for the same registry key, joined before opening.
    pub predecessor: Option<JoinHandle<()>>,
}

impl<R: ThreadConfined> Worker<R> {
    pub fn spawn(self, name: String) -> std::io::Result<JoinHandle<()>> {
        thread::Builder::new().name(name).spawn(move || self.run())
    }

    fn run(mut self) {
        if let Some(previous) = self.predecessor.take() {
            debug!(identity = %self.identity, "Waiting for previous actor to stop");
            if previous.join().is_err() {
                warn!(identity = %self.identity, "Previous actor teardown panicked");
            }
        }

        match tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
        {
            Ok(runtime) => {
                info!(identity = %self.identity, "Worker started");
                let local = LocalSet::new();
                let mut pump = Pump::<R> {
                    identity: &self.identity,
                    config: &self.config,
                    mailbox: &self.mailbox,
                    resource: None,
                    open_failure: None,
                    transaction: Transaction::Closed,
                };
                local.block_on(&runtime, pump.run());
                if self.mailbox.drains() {
                    runtime.block_on(local);
                } else {
                    drop(local);
                }
                pump.close();
            }
            Err(e) => error!(identity = %self.identity, error = %e, "Worker runtime failed"),
        }

        // Anything that slipped in after the pump stopped is released, not stranded.
        self.mailbox.signal_shutdown(ShutdownMode::Abandon);
        self.control
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .state = WorkerState::Stopped;
        info!(identity = %self.identity, "Worker stopped");
    }
}

type SharedError = Arc<dyn std::error::Error + Send + Sync>;

/// The explicit transaction as the worker sees it.
enum Transaction {
    Closed,
    Open,
    /// Begin failed; items up to the matching commit or rollback are failed with this.
    Aborted(SharedError),
}

/// Worker-thread state. Holds the resource, so it is `!Send` and never leaves the thread.
struct Pump<'a, R: ThreadConfined> {
    identity: &'a R::Identity,
    config: &'a R::Config,
    mailbox: &'a Mailbox<R>,
    resource: Option<Confined<R>>,
    open_failure: Option<SharedError>,
    transaction: Transaction,
}

impl<R: ThreadConfined> Pump<'_, R> {
    async fn run(&mut self) {
        while let Some(item) = self.mailbox.recv().await {
            let span = debug_span!("work_item", sequence = item.sequence);
            let spawned = span.in_scope(|| self.dispatch(item));
            if spawned {
                tokio::task::yield_now().await;
            }
        }
    }

    /// Returns true when an async task was spawned.
    fn dispatch(&mut self, item: WorkItem<R>) -> bool {
        match item.job {
            Job::Sync(job) => {
                debug!("Execute");
                match self.prepare() {
                    Ok(resource) => resource.with(|resource| job(Ok(resource))),
                    Err(e) => job(Err(e)),
                }
                false
            }
            Job::Async(job) => {
                debug!("Execute async");
                match job(self.prepare()) {
                    Some(task) => {
                        tokio::task::spawn_local(task);
                        true
                    }
                    None => false,
                }
            }
            Job::Transaction(step) => {
                self.transaction(step);
                false
            }
        }
    }

    fn prepare(&mut self) -> Result<Confined<R>, AffinityError> {
        if let Transaction::Aborted(cause) = &self.transaction {
            return Err(AffinityError::TransactionAborted(cause.clone()));
        }
        let resource = self.open()?;
        if matches!(self.transaction, Transaction::Closed) {
            resource
                .with(|resource| resource.refresh())
                .map_err(|e| AffinityError::Resource(Box::new(e)))?;
        }
        Ok(resource)
    }

    fn open(&mut self) -> Result<Confined<R>, AffinityError> {
        if let Some(resource) = &self.resource {
            return Ok(resource.clone());
        }
        if let Some(failure) = &self.open_failure {
            return Err(AffinityError::ResourceOpen(failure.clone()));
        }
        match R::open(self.identity, self.config) {
            Ok(resource) => {
                info!(identity = %self.identity, "Resource opened");
                let resource = Confined::new(resource);
                self.resource = Some(resource.clone());
                Ok(resource)
            }
            Err(e) => {
                error!(identity = %self.identity, error = %e, "Resource open failed");
                let failure: SharedError = Arc::new(e);
                self.open_failure = Some(failure.clone());
                Err(AffinityError::ResourceOpen(failure))
            }
        }
    }

    fn transaction(&mut self, step: TransactionStep) {
        let current = std::mem::replace(&mut self.transaction, Transaction::Closed);
        match (step, current) {
            (TransactionStep::Begin, Transaction::Closed) => {
                let outcome = self.prepare().and_then(|resource| {
                    resource
                        .with(|r| r.begin_transaction())
                        .map_err(|e| AffinityError::Resource(Box::new(e)))
                });
                self.transaction = match outcome {
                    Ok(()) => {
                        debug!(?step, "Transaction step applied");
                        Transaction::Open
                    }
                    Err(e) => {
                        warn!(?step, error = %e, "Transaction could not begin, its items will fail");
                        Transaction::Aborted(Arc::new(e))
                    }
                };
            }
            (TransactionStep::Commit | TransactionStep::Rollback, Transaction::Open) => {
                let Some(resource) = self.resource.clone() else {
                    return;
                };
                let outcome = match step {
                    TransactionStep::Commit => resource.with(|r| r.commit_transaction()),
                    _ => resource.with(|r| r.rollback_transaction()),
                };
                match outcome {
                    Ok(()) => debug!(?step, "Transaction step applied"),
                    Err(e) => warn!(?step, error = %e, "Transaction step failed"),
                }
            }
            (TransactionStep::Commit, Transaction::Aborted(cause)) => {
                warn!(error = %cause, "Commit of a transaction that never began, nothing written");
            }
            (TransactionStep::Rollback, Transaction::Aborted(_)) => {
                debug!("Rollback of a transaction that never began");
            }
            (step, current) => {
                warn!(?step, "Transaction step out of order");
                self.transaction = current;
            }
        }
    }

    fn close(&mut self) {
        let Some(resource) = self.resource.take() else {
            return;
        };
        if matches!(self.transaction, Transaction::Open) {
            warn!(identity = %self.identity, "Rolling back transaction left open at disposal");
            if let Err(e) = resource.with(|r| r.rollback_transaction()) {
                warn!(identity = %self.identity, error = %e, "Rollback at disposal failed");
            }
        }
        self.transaction = Transaction::Closed;
        match resource.into_inner() {
            Ok(resource) => match resource.close() {
                Ok(()) => info!(identity = %self.identity, "Resource closed"),
                Err(e) => warn!(identity = %self.identity, error = %e, "Resource close failed"),
            },
            Err(_) => warn!(identity = %self.identity, "Resource still borrowed at disposal, dropping"),
        }
    }
}
