//! # Affinity Sample
//!
//! Runs the three write workloads against a fresh [`RecordSystem`] for a range of sizes and
//! logs how long each one took.
//!
//! ```bash
//! RUST_LOG=info cargo run -p affinity-sample
//! ```

use affinity_actor::tracing::setup_tracing;
use affinity_sample::lifecycle::{workloads, RecordSystem};
use affinity_sample::model::Record;
use tracing::{error, info};

const SIZES: [usize; 4] = [1, 100, 1_000, 10_000];

#[tokio::main]
async fn main() -> Result<(), String> {
    setup_tracing();

    info!("Starting record workloads");
    let system = RecordSystem::new("perf.db");

    for size in SIZES {
        let records = Record::batch("parallel", size);
        let blocking = system.clone();
        let result = tokio::task::spawn_blocking(move || {
            workloads::parallel_write_read(&blocking, records)
        })
        .await
        .map_err(|e| e.to_string())?;
        match result {
            Ok(elapsed) => info!(size, elapsed_ms = elapsed.as_millis() as u64, "Parallel write/read"),
            Err(e) => error!(size, error = %e, "Parallel write/read failed"),
        }

        let records = Record::batch("begin-invoke", size);
        let blocking = system.clone();
        let result = tokio::task::spawn_blocking(move || {
            workloads::one_transaction_begin_invoke(&blocking, records)
        })
        .await
        .map_err(|e| e.to_string())?;
        match result {
            Ok(elapsed) => info!(size, elapsed_ms = elapsed.as_millis() as u64, "One transaction via begin_invoke"),
            Err(e) => error!(size, error = %e, "Fire-and-forget transaction failed"),
        }

        let records = Record::batch("invoke-async", size);
        match workloads::one_transaction_invoke_async(&system, records).await {
            Ok(elapsed) => info!(size, elapsed_ms = elapsed.as_millis() as u64, "One transaction via invoke_async"),
            Err(e) => error!(size, error = %e, "Async transaction failed"),
        }
    }

    info!(records = system.volume().len(), "Workloads finished");
    system.shutdown().await;
    Ok(())
}
