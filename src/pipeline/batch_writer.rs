//! A single writer worker: accumulates records from `READY` into a local
//! buffer and flushes it to the [`Store`] once full, on channel close, or
//! on cancellation.

use std::sync::Arc;

use tokio::sync::{mpsc, Mutex};
use tokio_util::sync::CancellationToken;
use tracing::warn;

use crate::errors::GeoError;
use crate::model::Geolocation;
use crate::report::Reporter;
use crate::storage::Store;

use super::BATCH_CAPACITY;

pub struct BatchWriter {
    store: Arc<dyn Store>,
    reporter: Arc<Reporter>,
    buffer: Vec<Geolocation>,
}

impl BatchWriter {
    pub fn new(store: Arc<dyn Store>, reporter: Arc<Reporter>) -> Self {
        BatchWriter { store, reporter, buffer: Vec::with_capacity(BATCH_CAPACITY) }
    }

    pub async fn run(
        mut self,
        ready_rx: Arc<Mutex<mpsc::Receiver<Geolocation>>>,
        cancel: CancellationToken,
    ) {
        loop {
            let record = {
                let mut rx = ready_rx.lock().await;
                tokio::select! {
                    _ = cancel.cancelled() => None,
                    record = rx.recv() => record,
                }
            };

            let record = match record {
                Some(record) => record,
                None => break,
            };

            self.buffer.push(record);
            if self.buffer.len() >= BATCH_CAPACITY {
                self.flush().await;
            }

            if cancel.is_cancelled() {
                break;
            }
        }

        // Flush whatever is left on close or cancellation; a partial batch
        // is still good data and must not be silently dropped.
        self.flush().await;
    }

    async fn flush(&mut self) {
        if self.buffer.is_empty() {
            return;
        }

        match self.store.insert_batch(&self.buffer).await {
            Ok(()) => {
                self.reporter.succeed(self.buffer.len());
            }
            Err(err) => {
                // A flush failure never retries: the whole batch is
                // discarded as a single unit under the driver's own message,
                // counted once regardless of how many rows were in it.
                warn!(batch_len = self.buffer.len(), error = %err, "batch flush failed");
                self.reporter.fail_batch(&err);
            }
        }

        self.buffer.clear();
    }
}
