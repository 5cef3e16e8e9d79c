use tracing::info;

use crate::error::Result;
use crate::sink::{Batch, BatchSink, DispatchReport};

/// Logs one line per record and accepts everything.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogSink;

impl BatchSink for LogSink {
    fn name(&self) -> &'static str {
        "log"
    }

    async fn dispatch(&mut self, batch: Batch) -> Result<DispatchReport> {
        for record in &batch {
            info!(
                sku = %record.id,
                locale = %record.language_code,
                disposition = ?record.disposition(),
                price = %record.price,
                title = %record.title,
                "Record"
            );
        }
        Ok(DispatchReport {
            accepted: batch.len(),
            failed: vec![],
        })
    }
}
