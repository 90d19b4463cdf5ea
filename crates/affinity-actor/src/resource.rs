//! # ThreadConfined Trait
//!
//! The contract a thread-confined resource (an embedded database handle, a device context,
//! a non-thread-safe SDK client) implements so an [`AffinityActor`](crate::AffinityActor)
//! can own it.
//!
//! # Architecture Note
//! Nothing here requires `Self: Send`. The resource is created by [`ThreadConfined::open`]
//! on the actor's worker thread and never leaves it; callers only ever see it as the
//! `&mut R` handed to a queued closure. Identity and configuration, on the other hand,
//! cross threads and must be `Send + Sync`.

use std::fmt::{Debug, Display};
use std::hash::Hash;

/// A resource that must be created, used and closed on one and the same thread.
pub trait ThreadConfined: Sized + 'static {
    /// What the resource *is* (for a database, its canonical file path).
    type Identity: Eq + Hash + Clone + Send + Sync + Display + Debug + 'static;

    /// How it is opened. The [`Registry`](crate::Registry) keys on the config alongside the
    /// identity, so equal configs share an actor and unequal ones never do.
    type Config: Clone + Eq + Hash + Send + Sync + Debug + 'static;

    type Error: std::error::Error + Send + Sync + 'static;

    /// Opens the resource. Called lazily on the worker thread, right before the first
    /// work item runs.
    fn open(identity: &Self::Identity, config: &Self::Config) -> Result<Self, Self::Error>;

    /// Brings the handle's view up to date with changes committed elsewhere
    /// (other actors, other processes). Called before every work item that runs outside
    /// an explicit transaction.
    fn refresh(&mut self) -> Result<(), Self::Error> {
        Ok(())
    }

    fn begin_transaction(&mut self) -> Result<(), Self::Error>;

    fn commit_transaction(&mut self) -> Result<(), Self::Error>;

    fn rollback_transaction(&mut self) -> Result<(), Self::Error>;

    /// Releases the resource. Runs on the worker thread during disposal.
    fn close(self) -> Result<(), Self::Error> {
        Ok(())
    }
}
