//! Long-running bus consumers.
//!
//! The upsert consumer applies published batches to the indices. The feed consumer reacts to
//! "new feed file" notifications by running the publish-mode pipeline over the file. Both
//! acknowledge every message, whether or not handling succeeded.

use std::path::{Component, Path, PathBuf};

use catalogflow_nats::{ConsumerConfig, Context, JetstreamConsumer, JetstreamPublisher};
use catalogflow_search::SearchClient;
use serde::Deserialize;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::classifier::Routing;
use crate::config::{PipelineConfig, Settings};
use crate::error::{Error, Result};
use crate::pipeline::{PipelineReport, ingest_file};
use crate::sink::DispatchReport;
use crate::sink::bulk::{BulkSink, IndexWriter};
use crate::sink::publish::{BatchPublisher, PublishSink};

/// Notification that a feed file landed in `bucket` under `name`.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct FeedNotification {
    pub bucket: String,
    pub name: String,
}

impl FeedNotification {
    /// `feed_dir/bucket/name`. Absolute or parent-relative parts are rejected.
    pub fn resolve(&self, feed_dir: &Path) -> Result<PathBuf> {
        let relative = Path::new(&self.bucket).join(&self.name);
        let is_plain = relative
            .components()
            .all(|c| matches!(c, Component::Normal(_) | Component::CurDir));
        if self.bucket.is_empty() || self.name.is_empty() || !is_plain {
            return Err(Error::Feed(format!(
                "refusing feed location bucket={:?} name={:?}",
                self.bucket, self.name
            )));
        }
        Ok(feed_dir.join(relative))
    }
}

/// Decodes a published batch and writes it with multi-locale routing.
pub async fn handle_upsert<W>(sink: &mut BulkSink<W>, payload: &[u8]) -> Result<DispatchReport>
where
    W: IndexWriter + Sync,
{
    let report = sink.apply(payload).await?;
    if !report.failed.is_empty() {
        warn!(
            accepted = report.accepted,
            failed = report.failed.len(),
            first = ?report.failed.first(),
            "Upsert batch applied with failed items"
        );
    }
    Ok(report)
}

/// Runs publish-mode ingestion over the file named by a notification payload.
pub async fn handle_feed_notification<P>(
    payload: &[u8],
    feed_dir: &Path,
    config: &PipelineConfig,
    publisher: P,
    cancel: CancellationToken,
) -> Result<PipelineReport>
where
    P: BatchPublisher + Sync,
{
    let notification: FeedNotification = serde_json::from_slice(payload)
        .map_err(|e| Error::Codec(format!("decoding feed notification: {e}")))?;
    let path = notification.resolve(feed_dir)?;
    info!(bucket = %notification.bucket, name = %notification.name, "Feed notification");

    ingest_file(path, PublishSink::new(publisher), config, cancel).await
}

/// Consumes published batches from the items subject until `cancel` fires.
pub async fn run_upsert_consumer(
    context: &Context,
    settings: &Settings,
    client: SearchClient,
    cancel: CancellationToken,
) -> Result<()> {
    let consumer = JetstreamConsumer::connect(
        context,
        &ConsumerConfig {
            stream: settings.nats.stream.clone(),
            consumer: settings.nats.consumer.clone(),
            filter_subject: settings.nats.items_subject.clone(),
        },
    )
    .await?;

    let sink = BulkSink::new(
        client,
        Routing::multi_locale(settings),
        settings.retry.clone(),
        cancel.clone(),
    );
    consumer
        .run(cancel, move |message| {
            let mut sink = sink.clone();
            async move { handle_upsert(&mut sink, &message.payload).await.map(|_| ()) }
        })
        .await?;
    Ok(())
}

/// Consumes feed notifications until `cancel` fires. Each notification is fully ingested
/// before the next one is read.
pub async fn run_feed_consumer(
    context: &Context,
    settings: &Settings,
    cancel: CancellationToken,
) -> Result<()> {
    let consumer = JetstreamConsumer::connect(
        context,
        &ConsumerConfig {
            stream: settings.nats.stream.clone(),
            consumer: format!("{}-feeds", settings.nats.consumer),
            filter_subject: settings.nats.feed_subject.clone(),
        },
    )
    .await?;

    let publisher = JetstreamPublisher::new(context.clone(), settings.nats.items_subject.clone());
    let feed_dir = settings.feed_dir.clone();
    let pipeline = settings.pipeline.clone();
    let run_cancel = cancel.clone();

    consumer
        .run(run_cancel, move |message| {
            let publisher = publisher.clone();
            let feed_dir = feed_dir.clone();
            let pipeline = pipeline.clone();
            let cancel = cancel.clone();
            async move {
                handle_feed_notification(&message.payload, &feed_dir, &pipeline, publisher, cancel)
                    .await
                    .map(|_| ())
            }
        })
        .await?;
    Ok(())
}
