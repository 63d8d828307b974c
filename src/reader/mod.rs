//! The Record Source: a lazy, finite, single-consumer sequence of raw rows.

pub mod filesystem;

use async_trait::async_trait;
use tokio::sync::mpsc::Receiver;

use crate::errors::GeoError;

pub use filesystem::FilesystemSource;

/// A raw, unvalidated row read from the upstream data source.
pub type RawRow = Vec<String>;

/// Default buffer capacity for the channel a [`RecordSource`] hands rows
/// off on.
pub const SOURCE_BUFFER: usize = 1000;

/// Capability required of anything the Processor reads rows from.
///
/// `open` returns a bounded, single-consumer channel of raw rows. The
/// channel is closed after EOF or after any non-EOF read error; a
/// mid-stream error is absorbed and the channel simply closes, so the
/// Processor sees a clean EOF either way. Only a failure to
/// open the stream or read its header is surfaced to the caller.
#[async_trait]
pub trait RecordSource: Send + Sync {
    async fn open(&self) -> Result<Receiver<RawRow>, GeoError>;
}
