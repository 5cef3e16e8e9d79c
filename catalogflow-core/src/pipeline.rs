//! Wires the producer, the bounded queue and the accumulator into one ingestion run.
//!
//! ```text
//! feed rows --decode--> [bounded queue] --accumulate--> batch --sink--> bus | index | log
//! (blocking thread)                      (async task)
//! ```

use std::io;
use std::path::PathBuf;

use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::accumulator::{AccumulatorStats, BatchAccumulator};
use crate::config::PipelineConfig;
use crate::decoder::FeedReader;
use crate::error::Result;
use crate::producer::{ProducerStats, spawn_producer};
use crate::queue;
use crate::sink::BatchSink;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PipelineReport {
    pub producer: ProducerStats,
    pub accumulator: AccumulatorStats,
}

/// Streams `feed` through `sink`. Config problems fail before any row is read. A producer
/// error (abort policy) is returned after the accumulator has flushed what it already had.
pub async fn run_pipeline<R, S>(
    feed: FeedReader<R>,
    sink: S,
    config: &PipelineConfig,
    cancel: CancellationToken,
) -> Result<PipelineReport>
where
    R: io::Read + Send + 'static,
    S: BatchSink,
{
    config.validate()?;
    let (tx, rx) = queue::bounded(config.queue_capacity)?;

    let producer = spawn_producer(feed, tx, config.decode_error_policy, cancel.clone());
    let accumulator = BatchAccumulator::new(sink, config.batch_size)
        .run(rx, cancel)
        .await;
    let producer = producer.await??;

    info!(
        rows = producer.rows,
        decoded = producer.decoded,
        batches = accumulator.batches,
        failed_batches = accumulator.failed_batches,
        "Ingestion finished"
    );
    Ok(PipelineReport {
        producer,
        accumulator,
    })
}

/// Opens the feed at `path` and runs the pipeline over it.
pub async fn ingest_file<S: BatchSink>(
    path: impl Into<PathBuf>,
    sink: S,
    config: &PipelineConfig,
    cancel: CancellationToken,
) -> Result<PipelineReport> {
    config.validate()?;
    let path = path.into();
    info!(path = %path.display(), sink = sink.name(), "Starting ingestion");

    let feed = tokio::task::spawn_blocking(move || FeedReader::open(path)).await??;
    run_pipeline(feed, sink, config, cancel).await
}
