use async_nats::jetstream::Context;
use bytes::Bytes;
use tracing::debug;

use crate::{Error, Result};

/// Publishes payloads to a single subject and waits for the stream to acknowledge each one.
#[derive(Clone)]
pub struct JetstreamPublisher {
    context: Context,
    subject: String,
}

impl JetstreamPublisher {
    pub fn new(context: Context, subject: impl Into<String>) -> Self {
        Self {
            context,
            subject: subject.into(),
        }
    }

    pub fn subject(&self) -> &str {
        &self.subject
    }

    /// Returns the stream sequence assigned to the message.
    pub async fn publish(&self, payload: Bytes) -> Result<u64> {
        let size = payload.len();
        let ack = self
            .context
            .publish(self.subject.clone(), payload)
            .await
            .map_err(|e| self.publish_error(e))?
            .await
            .map_err(|e| self.publish_error(e))?;

        debug!(subject = %self.subject, size, sequence = ack.sequence, "Published message");
        Ok(ack.sequence)
    }

    fn publish_error(&self, err: impl std::fmt::Display) -> Error {
        Error::Publish {
            subject: self.subject.clone(),
            error: err.to_string(),
        }
    }
}
