//! # Actor Errors
//!
//! Every way a queued unit of work can fail to produce its result, collected into one
//! enum so callers can match on the *kind* of failure instead of parsing messages.

use std::sync::Arc;
use std::time::Duration;

/// Boxed error raised by a queued action.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Misuse of the actor protocol. Always reported to the offending caller at submission time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum Violation {
    #[error("a transaction is already open")]
    TransactionAlreadyOpen,
    #[error("no transaction is open")]
    NoOpenTransaction,
    #[error("actor has been disposed")]
    ActorDisposed,
    #[error("blocking invoke from the actor's own worker thread")]
    ReentrantInvoke,
}

/// Errors surfaced by an [`AffinityActor`](crate::AffinityActor).
#[derive(Debug, thiserror::Error)]
pub enum AffinityError {
    #[error("Protocol violation: {0}")]
    ProtocolViolation(Violation),
    #[error("Action failed: {0}")]
    ActionFailure(BoxError),
    #[error("Action panicked: {0}")]
    Panicked(String),
    #[error("Cancelled: actor disposed before the work item ran")]
    Cancelled,
    #[error("Resource could not be opened: {0}")]
    ResourceOpen(Arc<dyn std::error::Error + Send + Sync>),
    #[error("Resource error: {0}")]
    Resource(BoxError),
    /// The explicit transaction this item was queued into never began; the item did not run.
    #[error("Transaction aborted: begin failed with {0}")]
    TransactionAborted(Arc<dyn std::error::Error + Send + Sync>),
    #[error("Timed out after {0:?} (the queued action keeps running)")]
    TimedOut(Duration),
    #[error("Worker thread could not be spawned: {0}")]
    WorkerSpawn(#[from] std::io::Error),
}

impl AffinityError {
    pub fn is_cancelled(&self) -> bool {
        matches!(self, AffinityError::Cancelled)
    }

    pub fn is_protocol_violation(&self) -> bool {
        matches!(self, AffinityError::ProtocolViolation(_))
    }

    /// Downcasts the error raised by the action, if this is an [`AffinityError::ActionFailure`].
    pub fn action_error<E: std::error::Error + 'static>(&self) -> Option<&E> {
        match self {
            AffinityError::ActionFailure(e) => e.downcast_ref::<E>(),
            _ => None,
        }
    }
}

impl From<Violation> for AffinityError {
    fn from(violation: Violation) -> Self {
        AffinityError::ProtocolViolation(violation)
    }
}
