//! The three write workloads of the demo binary, each returning how long it took.
//!
//! Workloads 1 and 2 block their calling thread and belong inside `spawn_blocking` when
//! driven from async code.

use super::RecordSystem;
use crate::clients::RecordError;
use crate::model::Record;
use std::panic;
use std::sync::mpsc;
use std::thread;
use std::time::{Duration, Instant};
use tracing::{debug, info_span, warn};

/// A writer actor commits one record per transaction and hands each key to a reader actor
/// running at the same time; the reader refreshes and finds every key.
pub fn parallel_write_read(system: &RecordSystem, records: Vec<Record>) -> Result<Duration, RecordError> {
    let _span = info_span!("parallel_write_read", count = records.len()).entered();
    let writer = system.client();
    let reader = system.reader();
    writer.clear()?;

    let started = Instant::now();
    let (keys_tx, keys_rx) = mpsc::channel();
    let (written, read) = thread::scope(|scope| {
        let written = scope.spawn(|| writer.write_each(records, keys_tx));
        let read = scope.spawn(|| reader.follow(keys_rx));
        (
            written.join().unwrap_or_else(|p| panic::resume_unwind(p)),
            read.join().unwrap_or_else(|p| panic::resume_unwind(p)),
        )
    });
    let (written, read) = (written?, read?);
    let elapsed = started.elapsed();

    debug!(written, read, "Parallel write/read finished");
    writer.release();
    reader.release();
    system.settle();
    Ok(elapsed)
}

/// Opens an actor transaction, queues every record in one fire-and-forget item, commits, and
/// waits for the actor to drain.
pub fn one_transaction_begin_invoke(
    system: &RecordSystem,
    records: Vec<Record>,
) -> Result<Duration, RecordError> {
    let _span = info_span!("one_transaction_begin_invoke", count = records.len()).entered();
    let started = Instant::now();

    let client = system.client();
    client.begin_transaction()?;
    client.enqueue_batch(records)?;
    client.commit_transaction()?;
    client.release();
    system.settle();

    Ok(started.elapsed())
}

/// Writes every record from one async action that awaits before its write transaction.
pub async fn one_transaction_invoke_async(
    system: &RecordSystem,
    records: Vec<Record>,
) -> Result<Duration, RecordError> {
    let started = Instant::now();

    let client = system.client();
    let written = client.put_batch(records).await?;
    client.release();

    let settling = system.clone();
    if tokio::task::spawn_blocking(move || settling.settle()).await.is_err() {
        warn!("Teardown wait panicked");
    }

    debug!(written, "Async transaction finished");
    Ok(started.elapsed())
}
