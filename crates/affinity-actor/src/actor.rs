//! # Affinity Actor
//!
//! [`AffinityActor`] serializes all access to one thread-confined resource through a
//! dedicated worker thread. Callers never touch the resource; they submit closures, and the
//! worker runs them one at a time, in submission order, against the single live instance.
//!
//! ## Invocation Styles
//!
//! All four are thin adapters over the same queue:
//!
//! | Method | Caller | Result |
//! |--------|--------|--------|
//! | [`invoke`](AffinityActor::invoke) | blocks | returned, errors re-raised |
//! | [`begin_invoke`](AffinityActor::begin_invoke) | returns once queued | failures logged only |
//! | [`invoke_async`](AffinityActor::invoke_async) | gets a future | delivered to whoever awaits |
//! | [`begin_transaction`](AffinityActor::begin_transaction) / commit / rollback | returns once queued | protocol errors immediate |
//!
//! ## Ordering
//!
//! Items are *dequeued* strictly in submission order. A sync item runs to completion before
//! the next one starts. An async item starts in order, but once it suspends later items may
//! run before it finishes: completion order of `invoke_async` work is not submission order.
//!
//! ## Timeouts
//!
//! A timeout only abandons the caller's wait ([`AffinityError::TimedOut`]). The action keeps
//! running on the worker; the resource has no preemption point.

use crate::confined::Confined;
use crate::error::{AffinityError, BoxError, Violation};
use crate::mailbox::{Mailbox, ShutdownMode};
use crate::options::ActorOptions;
use crate::resource::ThreadConfined;
use crate::work_item::{async_job, sync_job, Job, Reply, TransactionStep};
use crate::worker::Worker;
use std::future::Future;
use std::sync::mpsc::{self, RecvTimeoutError};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread::{self, JoinHandle, ThreadId};
use std::time::Duration;
use tokio::sync::oneshot;
use tracing::{debug, error, info};

/// Lifecycle of an actor's worker thread.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerState {
    /// No work submitted yet; no thread exists.
    NotStarted,
    Running,
    /// Shutdown requested; no new work is accepted.
    Draining,
    Stopped,
}

/// Caller-side bookkeeping, shared with the worker so it can report `Stopped`.
pub(crate) struct Control {
    pub state: WorkerState,
    worker: Option<JoinHandle<()>>,
    worker_thread: Option<ThreadId>,
    /// Mirrors the worker's transaction depth as of the last *submitted* boundary.
    transaction_open: bool,
    predecessor: Option<JoinHandle<()>>,
}

/// A dedicated-thread executor owning one instance of a [`ThreadConfined`] resource.
///
/// The worker thread and the resource are created lazily by the first submission.
/// Dropping the actor disposes it, draining queued work first.
///
/// ```rust
/// use affinity_actor::mock::{MockResource, Probe};
/// use affinity_actor::AffinityActor;
///
/// let probe = Probe::new("doc");
/// let actor = AffinityActor::<MockResource>::new("doc.db".to_string(), probe.clone());
///
/// actor.begin_transaction().unwrap();
/// actor.begin_invoke(|db: &mut MockResource| db.push(1)).unwrap();
/// actor.begin_invoke(|db: &mut MockResource| db.push(2)).unwrap();
/// actor.commit_transaction().unwrap();
///
/// let values = actor.invoke(|db: &mut MockResource| Ok::<_, std::convert::Infallible>(db.values())).unwrap();
/// assert_eq!(values, vec![1, 2]);
/// actor.dispose();
/// assert_eq!(probe.closed(), 1);
/// ```
pub struct AffinityActor<R: ThreadConfined> {
    identity: R::Identity,
    config: R::Config,
    options: ActorOptions,
    mailbox: Arc<Mailbox<R>>,
    control: Arc<Mutex<Control>>,
}

impl<R: ThreadConfined> AffinityActor<R> {
    pub fn new(identity: R::Identity, config: R::Config) -> Self {
        Self::with_options(identity, config, ActorOptions::default())
    }

    pub fn with_options(identity: R::Identity, config: R::Config, options: ActorOptions) -> Self {
        Self {
            identity,
            config,
            options,
            mailbox: Arc::new(Mailbox::new()),
            control: Arc::new(Mutex::new(Control {
                state: WorkerState::NotStarted,
                worker: None,
                worker_thread: None,
                transaction_open: false,
                predecessor: None,
            })),
        }
    }

    /// Makes the worker wait for `teardown` before opening the resource.
    pub(crate) fn after(self, teardown: Option<JoinHandle<()>>) -> Self {
        self.control().predecessor = teardown;
        self
    }

    pub fn identity(&self) -> &R::Identity {
        &self.identity
    }

    pub fn config(&self) -> &R::Config {
        &self.config
    }

    pub fn options(&self) -> &ActorOptions {
        &self.options
    }

    pub fn state(&self) -> WorkerState {
        self.control().state
    }

    /// Whether a transaction has been begun (as submitted) and not yet committed or rolled back.
    pub fn in_transaction(&self) -> bool {
        self.control().transaction_open
    }

    /// Number of queued items not yet delivered to the worker.
    pub fn pending(&self) -> usize {
        self.mailbox.pending()
    }

    fn control(&self) -> MutexGuard<'_, Control> {
        self.control.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn on_worker_thread(&self) -> bool {
        self.control().worker_thread == Some(thread::current().id())
    }

    fn ensure_started(&self, control: &mut Control) -> Result<(), AffinityError> {
        if control.state != WorkerState::NotStarted {
            return Ok(());
        }
        let worker = Worker::<R> {
            identity: self.identity.clone(),
            config: self.config.clone(),
            mailbox: self.mailbox.clone(),
            control: self.control.clone(),
            predecessor: control.predecessor.take(),
        };
        let handle = worker.spawn(self.options.worker_name(&self.identity))?;
        control.worker_thread = Some(handle.thread().id());
        control.worker = Some(handle);
        control.state = WorkerState::Running;
        Ok(())
    }

    fn submit(&self, job: Job<R>) -> Result<u64, AffinityError> {
        let mut control = self.control();
        self.ensure_started(&mut control)?;
        self.mailbox.enqueue(job)
    }

    /// Runs `action` on the worker thread and blocks until it has finished.
    ///
    /// Errors returned by the action come back as [`AffinityError::ActionFailure`] carrying
    /// the original error. Waits at most [`ActorOptions::invoke_timeout`], if set.
    /// Calling this from the actor's own worker thread fails with
    /// [`Violation::ReentrantInvoke`] rather than deadlocking.
    pub fn invoke<T, E, F>(&self, action: F) -> Result<T, AffinityError>
    where
        F: FnOnce(&mut R) -> Result<T, E> + Send + 'static,
        T: Send + 'static,
        E: Into<BoxError>,
    {
        self.invoke_within(action, self.options.invoke_timeout)
    }

    /// Like [`invoke`](Self::invoke) with an explicit timeout for this call.
    pub fn invoke_timeout<T, E, F>(&self, action: F, timeout: Duration) -> Result<T, AffinityError>
    where
        F: FnOnce(&mut R) -> Result<T, E> + Send + 'static,
        T: Send + 'static,
        E: Into<BoxError>,
    {
        self.invoke_within(action, Some(timeout))
    }

    fn invoke_within<T, E, F>(&self, action: F, timeout: Option<Duration>) -> Result<T, AffinityError>
    where
        F: FnOnce(&mut R) -> Result<T, E> + Send + 'static,
        T: Send + 'static,
        E: Into<BoxError>,
    {
        if self.on_worker_thread() {
            return Err(Violation::ReentrantInvoke.into());
        }
        let (respond_to, response) = mpsc::sync_channel(1);
        self.submit(sync_job(action, Reply::Blocking(respond_to)))?;
        match timeout {
            Some(timeout) => response.recv_timeout(timeout).map_err(|e| match e {
                RecvTimeoutError::Timeout => AffinityError::TimedOut(timeout),
                RecvTimeoutError::Disconnected => AffinityError::Cancelled,
            })?,
            None => response.recv().map_err(|_| AffinityError::Cancelled)?,
        }
    }

    /// Queues `action` and returns immediately.
    ///
    /// Nobody waits for the outcome: a failing action is reported through `tracing` only.
    /// Use [`invoke`](Self::invoke) or [`invoke_async`](Self::invoke_async) when the error
    /// matters.
    pub fn begin_invoke<E, F>(&self, action: F) -> Result<(), AffinityError>
    where
        F: FnOnce(&mut R) -> Result<(), E> + Send + 'static,
        E: Into<BoxError>,
    {
        self.submit(sync_job(action, Reply::Detached)).map(|_| ())
    }

    /// Queues an async action and returns a future for its result.
    ///
    /// The item is queued when this method is called, not when the future is first polled.
    /// The action receives a [`Confined`] handle; borrow the resource through
    /// [`Confined::with`] between awaits. Awaiting the returned future does not block a thread.
    pub fn invoke_async<T, E, F, Fut>(
        &self,
        action: F,
    ) -> impl Future<Output = Result<T, AffinityError>> + Send + 'static
    where
        F: FnOnce(Confined<R>) -> Fut + Send + 'static,
        Fut: Future<Output = Result<T, E>> + 'static,
        T: Send + 'static,
        E: Into<BoxError> + 'static,
    {
        let (respond_to, response) = oneshot::channel();
        let submitted = self.submit(async_job(action, Reply::Future(respond_to)));
        async move {
            submitted?;
            response.await.map_err(|_| AffinityError::Cancelled)?
        }
    }

    /// Opens an explicit transaction. Work queued after this runs inside it until
    /// [`commit_transaction`](Self::commit_transaction) or
    /// [`rollback_transaction`](Self::rollback_transaction). Nesting is not supported.
    pub fn begin_transaction(&self) -> Result<(), AffinityError> {
        self.submit_boundary(TransactionStep::Begin)
    }

    pub fn commit_transaction(&self) -> Result<(), AffinityError> {
        self.submit_boundary(TransactionStep::Commit)
    }

    pub fn rollback_transaction(&self) -> Result<(), AffinityError> {
        self.submit_boundary(TransactionStep::Rollback)
    }

    fn submit_boundary(&self, step: TransactionStep) -> Result<(), AffinityError> {
        let mut control = self.control();
        match (step, control.transaction_open) {
            (TransactionStep::Begin, true) => return Err(Violation::TransactionAlreadyOpen.into()),
            (TransactionStep::Commit | TransactionStep::Rollback, false) => {
                return Err(Violation::NoOpenTransaction.into())
            }
            _ => {}
        }
        self.ensure_started(&mut control)?;
        let sequence = self.mailbox.enqueue(Job::Transaction(step))?;
        control.transaction_open = step == TransactionStep::Begin;
        debug!(identity = %self.identity, sequence, ?step, "Transaction step queued");
        Ok(())
    }

    /// Stops the actor. Idempotent; concurrent callers return once one of them has
    /// taken charge of the teardown.
    ///
    /// Blocks until the worker has closed the resource and exited, except when called from
    /// the worker thread itself, in which case the worker finishes after the current item.
    pub fn shutdown(&self, mode: ShutdownMode) {
        let worker = {
            let mut control = self.control();
            match control.state {
                WorkerState::NotStarted => {
                    control.state = WorkerState::Stopped;
                    // Never started, but a successor must still not overlap the teardown
                    // this actor was waiting on.
                    control.predecessor.take()
                }
                WorkerState::Running => {
                    control.state = WorkerState::Draining;
                    control.worker.take()
                }
                WorkerState::Draining | WorkerState::Stopped => {
                    drop(control);
                    if mode == ShutdownMode::Abandon {
                        self.mailbox.signal_shutdown(mode);
                    }
                    return;
                }
            }
        };
        info!(identity = %self.identity, ?mode, "Shutdown requested");
        self.mailbox.signal_shutdown(mode);

        let Some(worker) = worker else {
            return;
        };
        if worker.thread().id() == thread::current().id() {
            debug!(identity = %self.identity, "Shutdown from worker thread, not joining");
            return;
        }
        if worker.join().is_err() {
            error!(identity = %self.identity, "Worker or teardown thread panicked");
            self.control().state = WorkerState::Stopped;
        }
    }

    /// Drains queued work, then stops. Same as `shutdown(ShutdownMode::Drain)`.
    pub fn dispose(&self) {
        self.shutdown(ShutdownMode::Drain);
    }
}

impl<R: ThreadConfined> Drop for AffinityActor<R> {
    fn drop(&mut self) {
        self.shutdown(ShutdownMode::Drain);
    }
}

impl<R: ThreadConfined> std::fmt::Debug for AffinityActor<R> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AffinityActor")
            .field("identity", &self.identity)
            .field("state", &self.state())
            .field("pending", &self.pending())
            .finish()
    }
}
