//! The Processor: owns the decode/validate → dedup → batch-write worker
//! topology.
//!
//! ```text
//!   RAW → DECODED? ──fail──▶ discarded(reason=decode)
//!         │success
//!         ▼
//!        VALID? ───fail──▶ discarded(reason=validate)
//!         │success
//!         ▼
//!       UNIQUE? ──fail──▶ discarded(reason=already-exists)
//!         │success
//!         ▼
//!        READY → BATCHED → FLUSHED ─ok─▶ accepted
//!                                  └err─▶ discarded(reason=flush-error)
//! ```

mod batch_writer;

use std::sync::Arc;
use std::time::Instant;

use tokio::sync::{mpsc, Mutex};
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace};

use crate::dedup::Deduplicator;
use crate::errors::GeoError;
use crate::model::Geolocation;
use crate::reader::{RawRow, RecordSource};
use crate::report::{Reporter, RunReport};
use crate::storage::Store;

use batch_writer::BatchWriter;

/// Records accumulated per batch before a writer issues one `InsertBatch`
/// call.
pub const BATCH_CAPACITY: usize = 500;

/// Number of concurrent writer workers.
pub const WRITER_WORKERS: usize = 15;

/// Runs the bulk ingest pipeline against `source`, using `parallel`
/// decode/validate workers and [`WRITER_WORKERS`] writer workers, and
/// returns the aggregated [`RunReport`].
///
/// Only fails if the pipeline itself could not be set up or was cancelled;
/// individual row outcomes always live in the returned report.
pub async fn run(
    source: &dyn RecordSource,
    parallel: usize,
    store: Arc<dyn Store>,
    cancel: CancellationToken,
) -> Result<RunReport, GeoError> {
    let start = Instant::now();

    let source_rx = source.open().await?;

    let reporter = Arc::new(Reporter::new());
    let dedup = Arc::new(Deduplicator::new());

    // RAW: bounded channel between the reader bridge and the processor
    // workers, sized to the decode parallelism.
    let (raw_tx, raw_rx) = mpsc::channel::<RawRow>(parallel.max(1));
    let raw_rx = Arc::new(Mutex::new(raw_rx));

    // READY: bounded channel between processor workers and writer workers,
    // sized so that writers rarely block while processors are still
    // working.
    let (ready_tx, ready_rx) = mpsc::channel::<Geolocation>(BATCH_CAPACITY * WRITER_WORKERS * 2);
    let ready_rx = Arc::new(Mutex::new(ready_rx));

    let reader_handle = tokio::spawn(bridge_source(source_rx, raw_tx, cancel.clone()));

    let mut processor_handles = Vec::with_capacity(parallel.max(1));
    for _ in 0..parallel.max(1) {
        processor_handles.push(tokio::spawn(processor_worker(
            raw_rx.clone(),
            ready_tx.clone(),
            dedup.clone(),
            reporter.clone(),
            cancel.clone(),
        )));
    }
    // Drop our own sender so the channel closes once every worker's clone
    // has also been dropped.
    drop(ready_tx);

    let mut writer_handles = Vec::with_capacity(WRITER_WORKERS);
    for _ in 0..WRITER_WORKERS {
        writer_handles.push(tokio::spawn(BatchWriter::new(store.clone(), reporter.clone()).run(
            ready_rx.clone(),
            cancel.clone(),
        )));
    }

    reader_handle
        .await
        .map_err(|err| GeoError::Setup(format!("reader task panicked: {}", err)))?;

    for handle in processor_handles {
        handle
            .await
            .map_err(|err| GeoError::Setup(format!("processor worker panicked: {}", err)))?;
    }

    for handle in writer_handles {
        handle
            .await
            .map_err(|err| GeoError::Setup(format!("writer worker panicked: {}", err)))?;
    }

    if cancel.is_cancelled() {
        return Err(GeoError::Setup("ingest cancelled".to_owned()));
    }

    let report = reporter.finish(start.elapsed());
    report.log();
    Ok(report)
}

/// Forwards rows from the Record Source's own channel onto `RAW`, closing
/// `RAW` when the source is exhausted or the run is cancelled.
async fn bridge_source(
    mut source_rx: mpsc::Receiver<RawRow>,
    raw_tx: mpsc::Sender<RawRow>,
    cancel: CancellationToken,
) {
    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                debug!("reader bridge cancelled");
                return;
            }
            row = source_rx.recv() => {
                match row {
                    Some(row) => {
                        if raw_tx.send(row).await.is_err() {
                            return;
                        }
                    }
                    None => return,
                }
            }
        }
    }
}

/// Decode, validate and dedup-check rows from `RAW`, forwarding accepted
/// records onto `READY`.
async fn processor_worker(
    raw_rx: Arc<Mutex<mpsc::Receiver<RawRow>>>,
    ready_tx: mpsc::Sender<Geolocation>,
    dedup: Arc<Deduplicator>,
    reporter: Arc<Reporter>,
    cancel: CancellationToken,
) {
    loop {
        let row = {
            let mut rx = raw_rx.lock().await;
            tokio::select! {
                _ = cancel.cancelled() => return,
                row = rx.recv() => row,
            }
        };

        let row = match row {
            Some(row) => row,
            None => return,
        };

        let geo = match Geolocation::decode(&row) {
            Ok(geo) => geo,
            Err(err) => {
                debug!(reason = %err, "row discarded");
                reporter.fail(&err);
                continue;
            }
        };

        if let Err(err) = geo.validate() {
            debug!(ip = %geo.ip_address, reason = %err, "row discarded");
            reporter.fail(&err);
            continue;
        }

        if let Err(err) = dedup.check(&geo.ip_address) {
            debug!(ip = %geo.ip_address, reason = %err, "row discarded");
            reporter.fail(&err);
            continue;
        }

        trace!(ip = %geo.ip_address, "row accepted for batching");

        if ready_tx.send(geo).await.is_err() {
            return;
        }
    }
}
