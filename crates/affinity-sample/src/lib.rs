//! # Affinity Sample
//!
//! A record store that must only ever be touched from the thread that opened it, made usable
//! from threads and async tasks through [`affinity_actor`].
//!
//! - **[store]**: [`MemoryStore`](store::MemoryStore), the thread-confined database, and its
//!   [`Volume`](store::Volume) backing.
//! - **[model]**: the [`Record`](model::Record) row type.
//! - **[clients]**: [`RecordClient`](clients::RecordClient), the typed API over a store actor.
//! - **[lifecycle]**: [`RecordSystem`](lifecycle::RecordSystem), which hands out clients from
//!   a shared registry, plus the demo workloads.

pub mod clients;
pub mod lifecycle;
pub mod model;
pub mod store;
