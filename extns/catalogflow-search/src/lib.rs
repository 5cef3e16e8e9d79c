//! Minimal client for the document-search engine used as the ingestion target. It covers the
//! handful of endpoints the pipeline needs: `_bulk` for writes, `_count` for verification and the
//! index-level calls used when provisioning indices.

pub mod bulk;
pub mod client;
pub mod query;

pub use bulk::{BulkOperation, BulkRequest, BulkResponseItem, BulkResult};
pub use client::{BasicAuth, CountResponse, Response, SearchClient, SearchClientConfig};
pub use query::{BoolQuery, Query};

pub type Result<T> = core::result::Result<T, Error>;

#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("Building HTTP client - {0}")]
    Client(String),

    #[error("Request to {url} failed - {error}")]
    Request { url: String, error: String },

    #[error("Unexpected status {status} from {url} - {body}")]
    UnexpectedStatus {
        url: String,
        status: u16,
        body: String,
    },

    #[error("Encoding request - {0}")]
    Encode(String),

    #[error("Decoding response - {0}")]
    Decode(String),

    #[error("Invalid request - {0}")]
    InvalidRequest(String),
}

impl From<serde_json::Error> for Error {
    fn from(value: serde_json::Error) -> Self {
        Error::Encode(value.to_string())
    }
}
