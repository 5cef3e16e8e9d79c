use std::io;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::config::DecodeErrorPolicy;
use crate::decoder::FeedReader;
use crate::error::Result;
use crate::metrics::pipeline_metrics;
use crate::queue::QueueSender;
use crate::record::Record;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProducerStats {
    pub rows: u64,
    pub decoded: u64,
    pub decode_errors: u64,
}

/// Decodes the feed on a blocking thread and pushes every record into `queue`. The queue is
/// closed when the task returns, which is how the consumer learns the stream has ended.
pub fn spawn_producer<R>(
    feed: FeedReader<R>,
    queue: QueueSender<Record>,
    policy: DecodeErrorPolicy,
    cancel: CancellationToken,
) -> JoinHandle<Result<ProducerStats>>
where
    R: io::Read + Send + 'static,
{
    tokio::task::spawn_blocking(move || produce(feed, queue, policy, cancel))
}

fn produce<R: io::Read>(
    mut feed: FeedReader<R>,
    queue: QueueSender<Record>,
    policy: DecodeErrorPolicy,
    cancel: CancellationToken,
) -> Result<ProducerStats> {
    let metrics = pipeline_metrics();
    let mut stats = ProducerStats::default();

    loop {
        if cancel.is_cancelled() {
            warn!(rows = stats.rows, "Cancellation received, stopping producer");
            break;
        }
        let Some(result) = feed.next() else {
            break;
        };
        stats.rows += 1;

        match result {
            Ok(record) => {
                if let Err(e) = queue.blocking_push(record) {
                    // the consumer stops reading once it has drained after cancellation
                    if cancel.is_cancelled() {
                        warn!(rows = stats.rows, "Queue closed after cancellation");
                        break;
                    }
                    return Err(e);
                }
                stats.decoded += 1;
                metrics.records_decoded.inc();
            }
            Err(e) => {
                stats.decode_errors += 1;
                metrics.decode_errors.inc();
                match policy {
                    DecodeErrorPolicy::Skip => warn!(%e, "Skipping malformed row"),
                    DecodeErrorPolicy::Abort => {
                        error!(%e, "Aborting on malformed row");
                        return Err(e);
                    }
                }
            }
        }
    }

    info!(
        rows = stats.rows,
        decoded = stats.decoded,
        decode_errors = stats.decode_errors,
        "Producer finished"
    );
    Ok(stats)
}
