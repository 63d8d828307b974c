//! The Run Report: thread-safe accepted/discarded counters plus a histogram
//! of discard reasons, reported as a single log record at the end of a run.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

use metrics::counter;
use tracing::info;

use crate::errors::GeoError;
use crate::metrics::{INGEST_ACCEPTED, INGEST_DISCARDED};

/// Accepted count, protected by its own lock so a burst of validation
/// failures doesn't stall accepted-path updates.
#[derive(Default)]
struct Accepted {
    count: u64,
}

/// Discarded count and reason histogram, protected by its own lock.
#[derive(Default)]
struct Discarded {
    count: u64,
    reasons: HashMap<String, u64>,
}

/// Aggregated outcome of a single ingest run. Created at Processor start,
/// finalized once all workers have returned.
pub struct Reporter {
    accepted: Mutex<Accepted>,
    discarded: Mutex<Discarded>,
}

impl Reporter {
    pub fn new() -> Self {
        Reporter {
            accepted: Mutex::new(Accepted::default()),
            discarded: Mutex::new(Discarded::default()),
        }
    }

    /// Record `count` rows as durably written.
    pub fn succeed(&self, count: usize) {
        let mut accepted = self.accepted.lock().expect("accepted mutex poisoned");
        accepted.count += count as u64;
        counter!(INGEST_ACCEPTED, count as u64);
    }

    /// Record one row discarded for `reason`.
    pub fn fail(&self, reason: &GeoError) {
        let mut discarded = self.discarded.lock().expect("discarded mutex poisoned");
        discarded.count += 1;
        *discarded.reasons.entry(reason.discard_reason()).or_insert(0) += 1;
        counter!(INGEST_DISCARDED, 1, "reason" => reason.discard_reason());
    }

    /// Record a whole batch's flush failure as a single discard, regardless
    /// of how many rows were in it: a flush failure is one event, not one
    /// per row in the lost batch.
    pub fn fail_batch(&self, reason: &GeoError) {
        self.fail(reason);
    }

    /// Snapshot the counters into an immutable [`RunReport`].
    pub fn finish(&self, elapsed: Duration) -> RunReport {
        let accepted = self.accepted.lock().expect("accepted mutex poisoned").count;
        let discarded_guard = self.discarded.lock().expect("discarded mutex poisoned");

        RunReport {
            accepted,
            discarded: discarded_guard.count,
            reasons: discarded_guard.reasons.clone(),
            elapsed,
        }
    }
}

impl Default for Reporter {
    fn default() -> Self {
        Reporter::new()
    }
}

/// The final, immutable outcome of an ingest run.
#[derive(Debug, Clone, PartialEq)]
pub struct RunReport {
    pub accepted: u64,
    pub discarded: u64,
    pub reasons: HashMap<String, u64>,
    pub elapsed: Duration,
}

impl RunReport {
    /// Emit the single end-of-run log record.
    pub fn log(&self) {
        info!(
            accepted = self.accepted,
            discarded = self.discarded,
            discarded_reasons = ?self.reasons,
            duration_s = self.elapsed.as_secs_f64(),
            "geolocation data processed",
        );
    }
}
