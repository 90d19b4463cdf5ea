//! # Work Items
//!
//! A [`WorkItem`] is one queued unit of work. All invocation styles (blocking, fire-and-forget,
//! future-returning) and the transaction boundaries share this single queue entry format;
//! they differ only in the [`Job`] variant and in where the result is delivered ([`Reply`]).
//!
//! # Architecture Note
//! A job is a type-erased closure that already owns its reply channel. The worker hands it
//! either the resource or the reason it cannot run (`Err(..)`), so a cancelled or
//! un-openable item completes through exactly the same path as a successful one and no
//! waiter is ever left hanging.

use crate::confined::Confined;
use crate::error::{AffinityError, BoxError};
use std::any::Any;
use std::future::Future;
use std::panic::{self, AssertUnwindSafe};
use std::pin::Pin;
use std::sync::mpsc;
use tokio::sync::oneshot;
use tracing::{debug, warn};

/// Future driven on the worker's local task set.
pub(crate) type LocalTask = Pin<Box<dyn Future<Output = ()>>>;

pub(crate) type SyncJob<R> = Box<dyn FnOnce(Result<&mut R, AffinityError>) + Send>;

pub(crate) type AsyncJob<R> =
    Box<dyn FnOnce(Result<Confined<R>, AffinityError>) -> Option<LocalTask> + Send>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum TransactionStep {
    Begin,
    Commit,
    Rollback,
}

pub(crate) enum Job<R> {
    /// Runs to completion before the next item is dequeued.
    Sync(SyncJob<R>),
    /// Starts on the worker and may suspend; later items can run while it is parked.
    Async(AsyncJob<R>),
    Transaction(TransactionStep),
}

pub(crate) struct WorkItem<R> {
    /// Assigned by the mailbox at enqueue time. Diagnostics only; delivery is FIFO.
    pub sequence: u64,
    pub job: Job<R>,
}

impl<R> WorkItem<R> {
    /// Completes the item with `error` without running its action.
    pub fn fail(self, error: AffinityError) {
        match self.job {
            Job::Sync(job) => job(Err(error)),
            Job::Async(job) => {
                let _ = job(Err(error));
            }
            Job::Transaction(step) => {
                debug!(sequence = self.sequence, ?step, %error, "Transaction step dropped");
            }
        }
    }
}

/// Where the outcome of a work item goes.
pub(crate) enum Reply<T> {
    /// A caller blocked in `invoke`.
    Blocking(mpsc::SyncSender<Result<T, AffinityError>>),
    /// The future returned by `invoke_async`.
    Future(oneshot::Sender<Result<T, AffinityError>>),
    /// `begin_invoke`: nobody is waiting, failures go to the log.
    Detached,
}

impl<T> Reply<T> {
    pub fn send(self, result: Result<T, AffinityError>) {
        match self {
            // A closed receiver means the caller timed out or went away.
            Reply::Blocking(respond_to) => {
                let _ = respond_to.send(result);
            }
            Reply::Future(respond_to) => {
                let _ = respond_to.send(result);
            }
            Reply::Detached => {
                if let Err(e) = result {
                    warn!(error = %e, "Fire-and-forget action failed");
                }
            }
        }
    }
}

pub(crate) fn sync_job<R, T, E, F>(action: F, reply: Reply<T>) -> Job<R>
where
    F: FnOnce(&mut R) -> Result<T, E> + Send + 'static,
    T: Send + 'static,
    E: Into<BoxError>,
{
    Job::Sync(Box::new(move |resource: Result<&mut R, AffinityError>| {
        let result = resource.and_then(|resource| guarded(|| action(resource)));
        reply.send(result);
    }))
}

pub(crate) fn async_job<R, T, E, F, Fut>(action: F, reply: Reply<T>) -> Job<R>
where
    R: 'static,
    F: FnOnce(Confined<R>) -> Fut + Send + 'static,
    Fut: Future<Output = Result<T, E>> + 'static,
    T: Send + 'static,
    E: Into<BoxError> + 'static,
{
    Job::Async(Box::new(move |resource: Result<Confined<R>, AffinityError>| {
        let resource = match resource {
            Ok(resource) => resource,
            Err(e) => {
                reply.send(Err(e));
                return None;
            }
        };
        let future = match panic::catch_unwind(AssertUnwindSafe(|| action(resource))) {
            Ok(future) => future,
            Err(payload) => {
                reply.send(Err(AffinityError::Panicked(panic_message(&*payload))));
                return None;
            }
        };
        // The action runs as its own task so a panic inside it is caught by the join
        // handle and reported instead of silently dropping the reply.
        let action = tokio::task::spawn_local(future);
        let task: LocalTask = Box::pin(async move {
            let result = match action.await {
                Ok(Ok(value)) => Ok(value),
                Ok(Err(e)) => Err(AffinityError::ActionFailure(e.into())),
                Err(join) if join.is_panic() => {
                    Err(AffinityError::Panicked(panic_message(&*join.into_panic())))
                }
                Err(_) => Err(AffinityError::Cancelled),
            };
            reply.send(result);
        });
        Some(task)
    }))
}

fn guarded<T, E: Into<BoxError>>(
    action: impl FnOnce() -> Result<T, E>,
) -> Result<T, AffinityError> {
    match panic::catch_unwind(AssertUnwindSafe(action)) {
        Ok(Ok(value)) => Ok(value),
        Ok(Err(e)) => Err(AffinityError::ActionFailure(e.into())),
        Err(payload) => Err(AffinityError::Panicked(panic_message(&*payload))),
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "non-string panic payload".to_string()
    }
}
