//! JetStream plumbing for the catalog pipeline: a publisher for flushed batches and a durable
//! pull consumer that keeps a message in progress while its handler runs.

use async_nats::ConnectOptions;
use async_nats::jetstream;

pub mod consumer;
pub mod publisher;

pub use async_nats::jetstream::Context;
pub use consumer::{ConsumerConfig, JetstreamConsumer, Message};
pub use publisher::JetstreamPublisher;

pub type Result<T> = core::result::Result<T, Error>;

#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("Connecting to NATS {server} - {error}")]
    Connection { server: String, error: String },

    #[error("Jetstream - {0}")]
    Jetstream(String),

    #[error("Publishing to {subject} - {error}")]
    Publish { subject: String, error: String },

    #[error("{0}")]
    Other(String),
}

#[derive(Debug, Clone, PartialEq)]
pub struct NatsAuth {
    pub username: String,
    pub password: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct NatsConfig {
    pub addr: String,
    pub auth: Option<NatsAuth>,
}

/// Connects to the server and returns a JetStream context.
pub async fn connect(config: &NatsConfig) -> Result<Context> {
    let mut conn_opts = ConnectOptions::new();
    if let Some(auth) = &config.auth {
        conn_opts = conn_opts.user_and_password(auth.username.clone(), auth.password.clone());
    }
    let client = async_nats::connect_with_options(&config.addr, conn_opts)
        .await
        .map_err(|err| Error::Connection {
            server: config.addr.clone(),
            error: err.to_string(),
        })?;
    Ok(jetstream::new(client))
}

/// Creates `stream` capturing `subjects` unless it already exists.
pub async fn ensure_stream(context: &Context, stream: &str, subjects: &[String]) -> Result<()> {
    context
        .get_or_create_stream(jetstream::stream::Config {
            name: stream.to_string(),
            subjects: subjects.to_vec(),
            ..Default::default()
        })
        .await
        .map_err(|err| Error::Jetstream(format!("Creating stream {stream}: {err:?}")))?;
    Ok(())
}
