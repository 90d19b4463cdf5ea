//! # Affinity Actor
//!
//! Safe multi-threaded access to **thread-confined** resources: objects that must be created,
//! used and closed on the one native thread that created them (embedded database handles,
//! GUI handles, device contexts, non-thread-safe SDK clients).
//!
//! ## Why an Actor and Not a Mutex?
//!
//! A `Mutex<Handle>` serializes access but still lets *any* thread touch the handle, which is
//! exactly what a thread-confined resource forbids. Here the resource is instead owned by one
//! dedicated worker thread, and every access is a message to that thread:
//!
//! - **Confinement by construction**: the resource type need not be `Send`; it is opened on
//!   the worker and never leaves it.
//! - **Ordering**: work items are delivered strictly in submission order.
//! - **Transactions as messages**: transaction boundaries go through the same queue as work,
//!   so no item is ever half inside and half outside a transaction.
//!
//! ## Architecture Overview
//!
//! 1. **Resource Layer** ([`ThreadConfined`]) - how to open, refresh, transact on and close the
//!    resource.
//! 2. **Runtime Layer** ([`AffinityActor`]) - worker thread, mailbox, invocation styles,
//!    transaction protocol, lifecycle.
//! 3. **Sharing Layer** ([`Registry`], [`ActorHandle`]) - one actor per resource identity,
//!    reference counted, torn down when the last owner lets go.
//!
//! ## Quick Example
//!
//! ```rust
//! use affinity_actor::mock::{MockResource, Probe};
//! use affinity_actor::{AffinityError, Registry};
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() -> Result<(), AffinityError> {
//! let registry = Registry::<MockResource>::new();
//! let probe = Probe::new("app");
//! let db = registry.get_instance("app.db".to_string(), probe.clone());
//!
//! // Fire-and-forget writes, in order.
//! db.begin_invoke(|db: &mut MockResource| db.push(1))?;
//! db.begin_invoke(|db: &mut MockResource| db.push(2))?;
//!
//! // An async action: borrow the resource between awaits.
//! let total = db
//!     .invoke_async(|db| async move {
//!         tokio::task::yield_now().await;
//!         Ok::<_, std::convert::Infallible>(db.with(|db| db.values().iter().sum::<i64>()))
//!     })
//!     .await?;
//! assert_eq!(total, 3);
//!
//! db.release();
//! registry.join_retired();
//! assert_eq!(probe.closed(), 1);
//! # Ok(())
//! # }
//! ```
//!
//! ## Error Model
//!
//! See [`AffinityError`]: protocol violations are reported synchronously at submission,
//! action errors travel back to the waiting caller unchanged, cancellation and timeouts are
//! their own kinds, and a resource that fails to open poisons its actor until a fresh one is
//! obtained.
//!
//! ## Testing
//!
//! The [`mock`] module provides an instrumented resource that records opens, refreshes,
//! rollbacks and closes, and checks thread identity on every call.

pub mod actor;
pub mod confined;
pub mod error;
pub mod mailbox;
pub mod mock;
pub mod options;
pub mod registry;
pub mod resource;
pub mod tracing;
mod work_item;
mod worker;

// Re-export core types for convenience
pub use actor::{AffinityActor, WorkerState};
pub use confined::Confined;
pub use error::{AffinityError, BoxError, Violation};
pub use mailbox::ShutdownMode;
pub use options::ActorOptions;
pub use registry::{ActorHandle, Registry};
pub use resource::ThreadConfined;
