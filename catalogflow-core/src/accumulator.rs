use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::metrics::{pipeline_metrics, sink_labels};
use crate::queue::QueueReceiver;
use crate::record::Record;
use crate::sink::{Batch, BatchSink};

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AccumulatorStats {
    pub records: u64,
    pub batches: u64,
    pub failed_batches: u64,
    /// Items the sink reported as failed inside otherwise accepted batches.
    pub failed_items: u64,
}

/// Groups queued records into batches of at most `batch_size` and hands each to the sink,
/// waiting for the hand-off before reading further.
pub struct BatchAccumulator<S> {
    sink: S,
    batch_size: usize,
    buffer: Batch,
    stats: AccumulatorStats,
}

impl<S: BatchSink> BatchAccumulator<S> {
    pub fn new(sink: S, batch_size: usize) -> Self {
        let batch_size = batch_size.max(1);
        Self {
            sink,
            batch_size,
            buffer: Vec::with_capacity(batch_size),
            stats: AccumulatorStats::default(),
        }
    }

    /// Runs until the queue is closed and drained. After `cancel` fires it stops waiting for
    /// new records, flushes what is already queued and returns.
    pub async fn run(
        mut self,
        mut queue: QueueReceiver<Record>,
        cancel: CancellationToken,
    ) -> AccumulatorStats {
        loop {
            let record = if cancel.is_cancelled() {
                queue.try_pull()
            } else {
                tokio::select! {
                    biased;
                    _ = cancel.cancelled() => {
                        warn!(queued = queue.len(), "Cancellation received, draining queue");
                        continue;
                    }
                    record = queue.pull() => record,
                }
            };

            let Some(record) = record else {
                break;
            };
            self.buffer.push(record);
            if self.buffer.len() >= self.batch_size {
                self.flush().await;
            }
        }

        if !self.buffer.is_empty() {
            self.flush().await;
        }
        info!(
            records = self.stats.records,
            batches = self.stats.batches,
            failed_batches = self.stats.failed_batches,
            failed_items = self.stats.failed_items,
            "Accumulator finished"
        );
        self.stats
    }

    async fn flush(&mut self) {
        let batch = std::mem::replace(&mut self.buffer, Vec::with_capacity(self.batch_size));
        let size = batch.len() as u64;
        let labels = sink_labels(self.sink.name());

        self.stats.records += size;
        self.stats.batches += 1;
        pipeline_metrics()
            .batches_dispatched
            .get_or_create(&labels)
            .inc();

        match self.sink.dispatch(batch).await {
            Ok(report) => {
                debug!(size, accepted = report.accepted, "Batch dispatched");
                if !report.failed.is_empty() {
                    warn!(
                        failed = report.failed.len(),
                        first = ?report.failed.first(),
                        "Batch dispatched with failed items"
                    );
                    self.stats.failed_items += report.failed.len() as u64;
                }
            }
            Err(e) => {
                error!(?e, size, sink = self.sink.name(), "Failed to dispatch batch");
                self.stats.failed_batches += 1;
                pipeline_metrics().dispatch_errors.get_or_create(&labels).inc();
            }
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use std::sync::Arc;

    use parking_lot::Mutex;

    use super::*;
    use crate::error::{Error, Result};
    use crate::queue::bounded;
    use crate::sink::{DispatchReport, FailedItem};

    /// Records every batch it receives; fails the batches whose sequence number is listed.
    #[derive(Clone, Default)]
    pub(crate) struct CollectingSink {
        pub(crate) batches: Arc<Mutex<Vec<Vec<String>>>>,
        pub(crate) fail_batches: Vec<usize>,
        pub(crate) failed_item_ids: Vec<String>,
    }

    impl BatchSink for CollectingSink {
        fn name(&self) -> &'static str {
            "collect"
        }

        async fn dispatch(&mut self, batch: Batch) -> Result<DispatchReport> {
            let ids: Vec<String> = batch.iter().map(|r| r.id.clone()).collect();
            let seq = {
                let mut batches = self.batches.lock();
                batches.push(ids.clone());
                batches.len()
            };
            if self.fail_batches.contains(&seq) {
                return Err(Error::Dispatch(format!("batch {seq} rejected")));
            }
            let failed: Vec<FailedItem> = ids
                .iter()
                .filter(|id| self.failed_item_ids.contains(id))
                .map(|id| FailedItem {
                    index: "test".to_string(),
                    id: id.clone(),
                    status: 400,
                    reason: "rejected".to_string(),
                })
                .collect();
            Ok(DispatchReport {
                accepted: ids.len() - failed.len(),
                failed,
            })
        }
    }

    fn record(id: usize) -> Record {
        Record {
            id: id.to_string(),
            ..Default::default()
        }
    }

    async fn run_with(sink: CollectingSink, batch_size: usize, n: usize) -> AccumulatorStats {
        let (tx, rx) = bounded(8).unwrap();
        let producer = tokio::spawn(async move {
            for i in 0..n {
                tx.push(record(i)).await.unwrap();
            }
        });
        let stats = BatchAccumulator::new(sink, batch_size)
            .run(rx, CancellationToken::new())
            .await;
        producer.await.unwrap();
        stats
    }

    #[tokio::test]
    async fn test_batch_sizes() {
        let sink = CollectingSink::default();
        let stats = run_with(sink.clone(), 4, 10).await;

        let batches = sink.batches.lock();
        let sizes: Vec<usize> = batches.iter().map(Vec::len).collect();
        assert_eq!(sizes, vec![4, 4, 2]);
        let flattened: Vec<String> = batches.iter().flatten().cloned().collect();
        assert_eq!(flattened, (0..10).map(|i| i.to_string()).collect::<Vec<_>>());
        assert_eq!(
            stats,
            AccumulatorStats {
                records: 10,
                batches: 3,
                failed_batches: 0,
                failed_items: 0,
            }
        );
    }

    #[tokio::test]
    async fn test_exact_multiple_has_no_trailing_empty_batch() {
        let sink = CollectingSink::default();
        let stats = run_with(sink.clone(), 5, 10).await;
        assert_eq!(stats.batches, 2);
        assert!(sink.batches.lock().iter().all(|b| b.len() == 5));
    }

    #[tokio::test]
    async fn test_empty_stream_dispatches_nothing() {
        let sink = CollectingSink::default();
        let stats = run_with(sink.clone(), 5, 0).await;
        assert_eq!(stats, AccumulatorStats::default());
        assert!(sink.batches.lock().is_empty());
    }

    #[tokio::test]
    async fn test_dispatch_failure_does_not_stop_accumulation() {
        let sink = CollectingSink {
            fail_batches: vec![1],
            failed_item_ids: vec!["5".to_string()],
            ..Default::default()
        };
        let stats = run_with(sink.clone(), 3, 7).await;

        assert_eq!(sink.batches.lock().len(), 3);
        assert_eq!(stats.records, 7);
        assert_eq!(stats.failed_batches, 1);
        assert_eq!(stats.failed_items, 1);
    }

    #[tokio::test]
    async fn test_cancel_drains_queue_and_flushes() {
        let (tx, rx) = bounded(16).unwrap();
        for i in 0..7 {
            tx.push(record(i)).await.unwrap();
        }
        let cancel = CancellationToken::new();
        cancel.cancel();

        let sink = CollectingSink::default();
        // tx is still open: without cancellation the run would wait forever
        let stats = BatchAccumulator::new(sink.clone(), 3).run(rx, cancel).await;

        assert_eq!(stats.records, 7);
        let sizes: Vec<usize> = sink.batches.lock().iter().map(Vec::len).collect();
        assert_eq!(sizes, vec![3, 3, 1]);
        drop(tx);
    }
}
