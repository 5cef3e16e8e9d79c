use catalogflow_search::{BulkOperation, BulkRequest, BulkResult, SearchClient};
use chrono::Utc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::backoff::Exponential;
use crate::classifier::{Routing, classify};
use crate::config::RetryConfig;
use crate::error::{Error, Result};
use crate::metrics::{index_labels, pipeline_metrics};
use crate::record::Record;
use crate::sink::{Batch, BatchSink, DispatchReport, FailedItem};

/// Writes bulk requests into an index.
#[trait_variant::make(IndexWriter: Send)]
#[allow(dead_code)]
pub trait LocalIndexWriter {
    async fn bulk(&self, index: &str, request: &BulkRequest) -> Result<BulkResult>;
}

impl IndexWriter for SearchClient {
    async fn bulk(&self, index: &str, request: &BulkRequest) -> Result<BulkResult> {
        Ok(SearchClient::bulk(self, index, request)
            .await?
            .into_result()?)
    }
}

/// Status 0 stands for a request that never produced a response.
fn is_retryable(status: u16) -> bool {
    status == 0 || status == 429 || status >= 500
}

/// Classifies each batch and issues one bulk request per sub-batch. Items that fail with a
/// retryable status are resent on their own with exponential backoff.
#[derive(Clone)]
pub struct BulkSink<W> {
    writer: W,
    routing: Routing,
    retry_config: RetryConfig,
    cancel: CancellationToken,
}

impl<W> BulkSink<W>
where
    W: IndexWriter + Sync,
{
    pub fn new(
        writer: W,
        routing: Routing,
        retry_config: RetryConfig,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            writer,
            routing,
            retry_config,
            cancel,
        }
    }

    /// Decodes a published batch and writes it.
    pub async fn apply(&mut self, payload: &[u8]) -> Result<DispatchReport> {
        let batch: Vec<Record> = serde_json::from_slice(payload)
            .map_err(|e| Error::Codec(format!("decoding published batch: {e}")))?;
        self.dispatch(batch).await
    }

    /// Sends `operations` until every one succeeds, fails for good or the retries run out.
    /// Returns the items that never made it.
    async fn write_with_retry(
        &self,
        index: &str,
        mut operations: Vec<BulkOperation>,
    ) -> Vec<FailedItem> {
        let mut backoff = Exponential::from(&self.retry_config);
        let mut permanent = Vec::new();
        let mut retry_attempt = 0;

        loop {
            let request: BulkRequest = operations.iter().cloned().collect();
            let outcome = self.writer.bulk(index, &request).await;
            let mut retryable = Vec::new();

            match outcome {
                Ok(result) => {
                    let mut items = result.items.into_iter();
                    for operation in operations {
                        let item = items.next().and_then(|item| item.into_values().next());
                        match item {
                            Some(item) if item.is_success() => {}
                            Some(item) => {
                                let failed = FailedItem {
                                    index: index.to_string(),
                                    id: operation.id().to_string(),
                                    status: item.status,
                                    reason: item
                                        .error
                                        .map(|e| format!("{}: {}", e.error_type, e.reason))
                                        .unwrap_or_default(),
                                };
                                if is_retryable(item.status) {
                                    retryable.push((operation, failed));
                                } else {
                                    permanent.push(failed);
                                }
                            }
                            None => {
                                let failed = FailedItem {
                                    index: index.to_string(),
                                    id: operation.id().to_string(),
                                    status: 0,
                                    reason: "missing from bulk response".to_string(),
                                };
                                retryable.push((operation, failed));
                            }
                        }
                    }
                }
                Err(e) => {
                    let reason = e.to_string();
                    retryable = operations
                        .into_iter()
                        .map(|operation| {
                            let failed = FailedItem {
                                index: index.to_string(),
                                id: operation.id().to_string(),
                                status: 0,
                                reason: reason.clone(),
                            };
                            (operation, failed)
                        })
                        .collect();
                }
            }

            if retryable.is_empty() {
                return permanent;
            }

            if self.cancel.is_cancelled() {
                warn!(index, pending = retryable.len(), "Cancellation received, stopping retries");
                permanent.extend(retryable.into_iter().map(|(_, failed)| failed));
                return permanent;
            }

            match backoff.next() {
                Some(delay) => {
                    retry_attempt += 1;
                    warn!(
                        index,
                        retry_attempt,
                        pending = retryable.len(),
                        first_error = %retryable.first().map(|(_, f)| f.reason.as_str()).unwrap_or_default(),
                        "Retrying failed bulk items"
                    );
                    tokio::time::sleep(delay).await;
                    operations = retryable.into_iter().map(|(op, _)| op).collect();
                }
                None => {
                    warn!(index, retry_attempt, pending = retryable.len(), "Retries exhausted");
                    permanent.extend(retryable.into_iter().map(|(_, failed)| failed));
                    return permanent;
                }
            }
        }
    }
}

impl<W> BatchSink for BulkSink<W>
where
    W: IndexWriter + Sync,
{
    fn name(&self) -> &'static str {
        "bulk"
    }

    async fn dispatch(&mut self, batch: Batch) -> Result<DispatchReport> {
        let now = Utc::now();
        let mut report = DispatchReport::default();

        for sub_batch in classify(batch, &self.routing) {
            let request = sub_batch.to_bulk_request(now)?;
            let total = request.len();
            debug!(
                index = %sub_batch.index,
                disposition = ?sub_batch.disposition,
                total,
                "Writing sub-batch"
            );

            let failed = self
                .write_with_retry(&sub_batch.index, request.operations().to_vec())
                .await;
            if !failed.is_empty() {
                pipeline_metrics()
                    .bulk_item_failures
                    .get_or_create(&index_labels(&sub_batch.index))
                    .inc_by(failed.len() as u64);
            }
            report.merge(DispatchReport {
                accepted: total - failed.len(),
                failed,
            });
        }
        Ok(report)
    }
}
