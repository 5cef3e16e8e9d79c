use bytes::Bytes;
use catalogflow_nats::JetstreamPublisher;
use tracing::debug;

use crate::error::{Error, Result};
use crate::sink::{Batch, BatchSink, DispatchReport};

/// Anything that can put one payload on the bus and report whether it was accepted.
#[trait_variant::make(BatchPublisher: Send)]
#[allow(dead_code)]
pub trait LocalBatchPublisher {
    async fn publish(&self, payload: Bytes) -> Result<()>;
}

impl BatchPublisher for JetstreamPublisher {
    async fn publish(&self, payload: Bytes) -> Result<()> {
        JetstreamPublisher::publish(self, payload).await?;
        Ok(())
    }
}

/// Publishes each batch, unclassified, as one JSON array message.
#[derive(Clone)]
pub struct PublishSink<P> {
    publisher: P,
}

impl<P> PublishSink<P> {
    pub fn new(publisher: P) -> Self {
        Self { publisher }
    }
}

impl<P> BatchSink for PublishSink<P>
where
    P: BatchPublisher + Sync,
{
    fn name(&self) -> &'static str {
        "publish"
    }

    async fn dispatch(&mut self, batch: Batch) -> Result<DispatchReport> {
        let payload = serde_json::to_vec(&batch)
            .map_err(|e| Error::Codec(format!("serializing batch: {e}")))?;
        let size = payload.len();

        self.publisher
            .publish(Bytes::from(payload))
            .await
            .map_err(|e| Error::Dispatch(format!("publishing batch: {e}")))?;

        debug!(records = batch.len(), size, "Published batch");
        Ok(DispatchReport {
            accepted: batch.len(),
            failed: vec![],
        })
    }
}
