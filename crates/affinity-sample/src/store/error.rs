use std::thread::ThreadId;
use thiserror::Error;

/// Errors raised by [`MemoryStore`](super::MemoryStore).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    #[error("store '{path}' accessed from {actual:?} but opened on {owner:?}")]
    WrongThread {
        path: String,
        owner: ThreadId,
        actual: ThreadId,
    },

    #[error("store '{0}' is read-only")]
    ReadOnly(String),

    #[error("a write transaction is already open")]
    AlreadyInTransaction,

    #[error("write attempted outside a write transaction")]
    NotInTransaction,

    #[error("record '{0}' not found")]
    NotFound(String),
}
