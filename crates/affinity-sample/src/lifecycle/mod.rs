//! # System Lifecycle
//!
//! Wires record stores, their actors and their clients together.
//!
//! [`RecordSystem`] owns one [`Registry`](affinity_actor::Registry) of store actors and one
//! [`Volume`](crate::store::Volume). Every [`RecordClient`](crate::clients::RecordClient) it
//! hands out holds a counted reference to a shared actor:
//!
//! - [`RecordSystem::client`] returns the read-write store actor. All read-write clients share
//!   it, and therefore share one worker thread and one store handle.
//! - [`RecordSystem::reader`] returns a read-only actor on the same volume. It has its own
//!   thread and its own snapshot, and sees the writer's commits after a refresh.
//!
//! ## Shutdown
//!
//! Releasing the last client of an actor tears it down in the background (queued work is
//! drained first, then the store is closed on its own thread).
//! [`RecordSystem::shutdown`] waits for every such teardown to finish:
//!
//! ```rust
//! use affinity_sample::lifecycle::RecordSystem;
//! use affinity_sample::model::Record;
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() -> Result<(), affinity_sample::clients::RecordError> {
//! let system = RecordSystem::new("demo.db");
//! let client = system.client();
//! client.put(Record::new("k", "v")).await?;
//! client.release();
//!
//! let volume = system.volume().clone();
//! system.shutdown().await;
//! assert_eq!(volume.len(), 1);
//! # Ok(())
//! # }
//! ```
//!
//! The [`workloads`] module holds the three demo workloads the binary runs.

pub mod record_system;
pub mod workloads;

pub use record_system::*;
