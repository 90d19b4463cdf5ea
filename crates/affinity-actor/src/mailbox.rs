//! # Mailbox
//!
//! The ordered queue between caller threads and the worker thread. Any number of threads
//! enqueue; exactly one worker dequeues. The lock guards queue metadata only and is never
//! held while a work item runs, so hold time does not depend on how long work takes.

use crate::error::{AffinityError, Violation};
use crate::work_item::{Job, WorkItem};
use std::collections::VecDeque;
use std::sync::{Mutex, MutexGuard, PoisonError};
use tokio::sync::Notify;

/// How queued-but-undelivered work is treated when an actor shuts down.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ShutdownMode {
    /// Deliver everything already queued, then stop.
    #[default]
    Drain,
    /// Fail everything still queued with [`AffinityError::Cancelled`] and stop as soon as
    /// the running item finishes.
    Abandon,
}

struct State<R> {
    queue: VecDeque<WorkItem<R>>,
    next_sequence: u64,
    closed: Option<ShutdownMode>,
}

pub(crate) struct Mailbox<R> {
    state: Mutex<State<R>>,
    ready: Notify,
}

impl<R> Mailbox<R> {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(State {
                queue: VecDeque::new(),
                next_sequence: 1,
                closed: None,
            }),
            ready: Notify::new(),
        }
    }

    fn lock(&self) -> MutexGuard<'_, State<R>> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Appends a job to the tail and returns its sequence number.
    ///
    /// Fails with [`Violation::ActorDisposed`] once shutdown has been signalled.
    pub fn enqueue(&self, job: Job<R>) -> Result<u64, AffinityError> {
        let mut state = self.lock();
        if state.closed.is_some() {
            drop(state);
            drop(job);
            return Err(Violation::ActorDisposed.into());
        }
        let sequence = state.next_sequence;
        state.next_sequence += 1;
        state.queue.push_back(WorkItem { sequence, job });
        drop(state);
        self.ready.notify_one();
        Ok(sequence)
    }

    /// Waits for the next item in submission order. Returns `None` once shutdown has been
    /// signalled and nothing deliverable is left.
    pub async fn recv(&self) -> Option<WorkItem<R>> {
        loop {
            {
                let mut state = self.lock();
                if let Some(item) = state.queue.pop_front() {
                    return Some(item);
                }
                if state.closed.is_some() {
                    return None;
                }
            }
            // notify_one stores a permit when nobody is waiting yet, so an enqueue that
            // lands between the check above and this await is not lost.
            self.ready.notified().await;
        }
    }

    /// Closes the mailbox to new work. With [`ShutdownMode::Abandon`] every undelivered item
    /// is failed with [`AffinityError::Cancelled`] before this returns.
    ///
    /// Repeated calls are harmless; `Abandon` after `Drain` escalates, never the reverse.
    pub fn signal_shutdown(&self, mode: ShutdownMode) {
        let abandoned = {
            let mut state = self.lock();
            if state.closed != Some(ShutdownMode::Abandon) {
                state.closed = Some(mode);
            }
            match mode {
                ShutdownMode::Abandon => std::mem::take(&mut state.queue),
                ShutdownMode::Drain => VecDeque::new(),
            }
        };
        self.ready.notify_one();
        for item in abandoned {
            item.fail(AffinityError::Cancelled);
        }
    }

    /// Whether already-running async work should be allowed to finish.
    pub fn drains(&self) -> bool {
        self.lock().closed != Some(ShutdownMode::Abandon)
    }

    pub fn pending(&self) -> usize {
        self.lock().queue.len()
    }
}
