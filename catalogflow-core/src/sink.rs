//! Destinations for flushed batches.
//!
//! - [publish::PublishSink] serializes the batch and publishes it on the message bus.
//! - [bulk::BulkSink] classifies the batch and writes it straight into the search indices.
//! - [log::LogSink] only logs, for dry runs.

use crate::error::Result;
use crate::record::Record;

pub mod bulk;
pub mod log;
pub mod publish;

pub type Batch = Vec<Record>;

/// A bulk item that was still failing when the sink gave up on it.
#[derive(Debug, Clone, PartialEq)]
pub struct FailedItem {
    pub index: String,
    pub id: String,
    /// HTTP status of the item, 0 when the whole request failed.
    pub status: u16,
    pub reason: String,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct DispatchReport {
    /// Records the destination accepted.
    pub accepted: usize,
    pub failed: Vec<FailedItem>,
}

impl DispatchReport {
    pub fn merge(&mut self, other: DispatchReport) {
        self.accepted += other.accepted;
        self.failed.extend(other.failed);
    }
}

/// Sink receives every flushed batch in accumulation order. An `Err` means the batch as a
/// whole was not handed off; per-item failures are reported in [DispatchReport::failed].
#[trait_variant::make(BatchSink: Send)]
#[allow(dead_code)]
pub trait LocalBatchSink {
    /// Short name used in logs and metric labels.
    fn name(&self) -> &'static str;

    async fn dispatch(&mut self, batch: Batch) -> Result<DispatchReport>;
}
