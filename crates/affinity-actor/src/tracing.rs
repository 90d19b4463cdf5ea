//! # Observability
//!
//! The actor logs through `tracing` with structured fields:
//!
//! - **Lifecycle** (`info`): worker started/stopped, resource opened/closed, shutdown requested,
//!   registry insertions and last-reference releases.
//! - **Work items** (`debug`): each item executes inside a `work_item` span carrying its
//!   `sequence` number, so everything an action logs can be tied back to its submission.
//! - **Failures** (`warn`/`error`): fire-and-forget actions that failed, transaction steps that
//!   failed or arrived out of order, rollbacks forced by disposal, resource open failures.
//!
//! ```bash
//! RUST_LOG=info cargo run            # lifecycle only
//! RUST_LOG=affinity_actor=debug cargo run
//! ```

/// Installs a compact `fmt` subscriber filtered by `RUST_LOG`.
///
/// Safe to call more than once; later calls are ignored.
pub fn setup_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_target(false)
        .compact()
        .try_init();
}
