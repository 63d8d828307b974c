//! A [`RecordSource`] that reads geolocation data from a CSV file on disk.

use std::fs::File;
use std::path::PathBuf;

use async_trait::async_trait;
use tokio::sync::mpsc::{self, Receiver};
use tracing::{debug, error};

use crate::errors::GeoError;

use super::{RawRow, RecordSource, SOURCE_BUFFER};

/// Reads geolocation data from a file on the local filesystem.
pub struct FilesystemSource {
    path: PathBuf,
}

impl FilesystemSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        FilesystemSource { path: path.into() }
    }
}

#[async_trait]
impl RecordSource for FilesystemSource {
    /// Open the file, skip the header row, and spawn a blocking task that
    /// forwards every subsequent row onto the returned channel.
    ///
    /// The sequence is lazy, finite, and closes on EOF or the first read
    /// error; a non-EOF error is logged once and then treated the same as
    /// EOF from the consumer's point of view.
    async fn open(&self) -> Result<Receiver<RawRow>, GeoError> {
        let path = self.path.clone();

        let file = File::open(&path)
            .map_err(|err| GeoError::Setup(format!("opening file {:?}: {}", path, err)))?;

        // `flexible(true)` so that a row with a field count other than the
        // header's doesn't abort the whole read: the Decode/Validate stage
        // is responsible for rejecting it as `not enough fields in input`,
        // per the row-level errors are always recovered policy.
        let mut reader = csv::ReaderBuilder::new().flexible(true).from_reader(file);
        reader
            .headers()
            .map_err(|err| GeoError::Setup(format!("reading header: {}", err)))?;

        let (tx, rx) = mpsc::channel(SOURCE_BUFFER);

        tokio::task::spawn_blocking(move || {
            for result in reader.into_records() {
                match result {
                    Ok(record) => {
                        let row: RawRow = record.iter().map(str::to_owned).collect();
                        if tx.blocking_send(row).is_err() {
                            // Consumer already dropped the channel (e.g. cancellation);
                            // nothing more to do.
                            return;
                        }
                    }
                    Err(err) => {
                        error!("reading record: {}", err);
                        return;
                    }
                }
            }
            debug!("source exhausted, closing channel");
        });

        Ok(rx)
    }
}
