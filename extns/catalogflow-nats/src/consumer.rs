use std::fmt::Display;
use std::future::Future;
use std::time::Duration;

use async_nats::jetstream::consumer::PullConsumer;
use async_nats::jetstream::consumer::pull::{Config, Stream};
use async_nats::jetstream::{AckKind, Context, Message as JetstreamMessage};
use bytes::Bytes;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio::time::{self, Instant};
use tokio_stream::StreamExt;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::{Error, Result};

const MIN_PROGRESS_TICK: Duration = Duration::from_secs(1);

#[derive(Debug, Clone, PartialEq)]
pub struct ConsumerConfig {
    pub stream: String,
    /// Durable consumer name, created on first use.
    pub consumer: String,
    pub filter_subject: String,
}

#[derive(Debug, Clone)]
pub struct Message {
    pub subject: String,
    pub payload: Bytes,
    pub stream_sequence: u64,
}

impl TryFrom<&JetstreamMessage> for Message {
    type Error = Error;

    fn try_from(msg: &JetstreamMessage) -> Result<Self> {
        let stream_sequence = msg
            .info()
            .map_err(|e| Error::Jetstream(format!("fetching message metadata: {e:?}")))?
            .stream_sequence;

        Ok(Message {
            subject: msg.message.subject.to_string(),
            payload: msg.message.payload.clone(),
            stream_sequence,
        })
    }
}

/// Durable pull consumer. Every message handed to the handler is acknowledged afterwards,
/// whatever the handler returned; redelivery only happens if the process dies mid-message.
pub struct JetstreamConsumer {
    name: String,
    messages: Stream,
    progress_tick: Duration,
}

impl JetstreamConsumer {
    pub async fn connect(context: &Context, config: &ConsumerConfig) -> Result<Self> {
        let stream = context.get_stream(&config.stream).await.map_err(|err| {
            Error::Jetstream(format!("Getting stream {}: {err:?}", config.stream))
        })?;

        let mut consumer: PullConsumer = stream
            .get_or_create_consumer(
                &config.consumer,
                Config {
                    durable_name: Some(config.consumer.clone()),
                    filter_subject: config.filter_subject.clone(),
                    ..Default::default()
                },
            )
            .await
            .map_err(|err| {
                Error::Jetstream(format!(
                    "Getting consumer {} from stream {}: {err:?}",
                    config.consumer, config.stream
                ))
            })?;

        let ack_wait = consumer
            .info()
            .await
            .map_err(|err| Error::Jetstream(format!("Fetching consumer info: {err:?}")))?
            .config
            .ack_wait;

        let messages = consumer.messages().await.map_err(|err| {
            Error::Jetstream(format!(
                "Creating message stream for consumer {}: {err:?}",
                config.consumer
            ))
        })?;

        Ok(Self {
            name: config.consumer.clone(),
            messages,
            progress_tick: (ack_wait / 2).max(MIN_PROGRESS_TICK),
        })
    }

    /// Feeds messages to `handler` one at a time until `cancel` fires or the stream ends.
    pub async fn run<F, Fut, E>(mut self, cancel: CancellationToken, mut handler: F) -> Result<()>
    where
        F: FnMut(Message) -> Fut,
        Fut: Future<Output = core::result::Result<(), E>>,
        E: Display,
    {
        info!(consumer = %self.name, "Starting consumer");
        loop {
            let js_message = tokio::select! {
                biased;

                _ = cancel.cancelled() => {
                    info!(consumer = %self.name, "Cancellation received, stopping consumer");
                    return Ok(());
                }

                message = self.messages.next() => {
                    let Some(message) = message else {
                        warn!(consumer = %self.name, "Message stream ended");
                        return Ok(());
                    };
                    message.map_err(|e| {
                        Error::Jetstream(format!("Getting next message from the stream: {e:?}"))
                    })?
                }
            };

            let message = match Message::try_from(&js_message) {
                Ok(message) => message,
                Err(e) => {
                    error!(?e, "Dropping message without metadata");
                    ack_now(&js_message).await;
                    continue;
                }
            };

            let sequence = message.stream_sequence;
            let tracker = InProgressTracker::start(js_message, self.progress_tick);
            if let Err(e) = handler(message).await {
                error!(consumer = %self.name, sequence, %e, "Handler failed, acknowledging anyway");
            }
            tracker.ack().await;
        }
    }
}

async fn ack_now(msg: &JetstreamMessage) {
    if let Err(err) = msg.ack().await {
        error!(?err, "Failed to ack message");
    }
}

/// Sends in-progress acks at a fixed interval so the server does not redeliver a message whose
/// handler is still running, and sends the final ack when told to.
struct InProgressTracker {
    task: JoinHandle<()>,
    ack_tx: oneshot::Sender<()>,
}

impl InProgressTracker {
    fn start(msg: JetstreamMessage, tick: Duration) -> Self {
        let (ack_tx, ack_rx) = oneshot::channel();
        let task = tokio::spawn(Self::keep_alive(msg, tick, ack_rx));
        Self { task, ack_tx }
    }

    async fn keep_alive(msg: JetstreamMessage, tick: Duration, ack_rx: oneshot::Receiver<()>) {
        let mut interval = time::interval_at(Instant::now() + tick, tick);
        tokio::pin!(ack_rx);

        loop {
            tokio::select! {
                biased;

                _ = &mut ack_rx => {
                    ack_now(&msg).await;
                    return;
                }
                _ = interval.tick() => {
                    if let Err(e) = msg.ack_with(AckKind::Progress).await {
                        error!(?e, "Failed to send in-progress ack");
                    }
                }
            }
        }
    }

    async fn ack(self) {
        let Self { task, ack_tx } = self;
        if ack_tx.send(()).is_err() {
            error!("In-progress task already terminated before ack");
            return;
        }
        let _ = task.await;
    }
}
