use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum Error {
    #[error("Config Error - {0}")]
    Config(String),

    #[error("Malformed row {row}, field `{field}` - {reason}")]
    MalformedRow {
        row: u64,
        field: String,
        reason: String,
    },

    #[error("Feed Error - {0}")]
    Feed(String),

    #[error("Queue Error - {0}")]
    Queue(String),

    #[error("Dispatch Error - {0}")]
    Dispatch(String),

    #[error("Search Error - {0}")]
    Search(String),

    #[error("Bus Error - {0}")]
    Bus(String),

    #[error("Codec Error - {0}")]
    Codec(String),

    #[error("Verify Error - {0}")]
    Verify(String),

    #[error("Metrics Error - {0}")]
    Metrics(String),

    #[error("Task Error - {0}")]
    Task(String),
}

impl From<catalogflow_search::Error> for Error {
    fn from(value: catalogflow_search::Error) -> Self {
        Error::Search(value.to_string())
    }
}

impl From<catalogflow_nats::Error> for Error {
    fn from(value: catalogflow_nats::Error) -> Self {
        Error::Bus(value.to_string())
    }
}

impl From<serde_json::Error> for Error {
    fn from(value: serde_json::Error) -> Self {
        Error::Codec(value.to_string())
    }
}

impl From<tokio::task::JoinError> for Error {
    fn from(value: tokio::task::JoinError) -> Self {
        Error::Task(value.to_string())
    }
}
