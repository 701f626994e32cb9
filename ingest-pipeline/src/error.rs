use ingest_common::store::StoreError;
use ingest_common::time::TimestampError;
use thiserror::Error;

/// Enumeration of per-record errors raised by a stage transform.
///
/// Either variant drops the record; the distinction only changes how the
/// stage runner logs it. `Unavailable` is the recognized "no content
/// available" kind and is logged without a source chain at WARN, anything
/// else is unexpected and logged at ERROR.
#[derive(Error, Debug)]
pub enum StageError {
    #[error("content unavailable: {0}")]
    Unavailable(String),
    #[error("{message}")]
    Failed {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },
}

impl StageError {
    pub fn failed<E>(error: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        Self::Failed {
            message: error.to_string(),
            source: Some(Box::new(error)),
        }
    }

    pub fn message(message: impl Into<String>) -> Self {
        Self::Failed {
            message: message.into(),
            source: None,
        }
    }
}

/// Enumeration of errors raised while wiring or spawning a pipeline graph.
/// These are configuration bugs and abort startup, never runtime conditions.
#[derive(Error, Debug)]
pub enum GraphError {
    #[error("channel '{0}' is consumed by more than one stage")]
    InputAlreadyClaimed(String),
    #[error("channel '{0}' has no consuming stage")]
    UnconsumedChannel(String),
    #[error("stage '{0}' has no input channel")]
    MissingInput(String),
    #[error("graph has no stages")]
    Empty,
}

/// Enumeration of errors for a single write through the idempotent sink.
/// All of them are fatal for the record being written; a duplicate key is
/// an outcome, not an error.
#[derive(Error, Debug)]
pub enum SinkError {
    #[error("timestamp normalization failed: {0}")]
    Timestamp(#[from] TimestampError),
    #[error("failed to serialize record: {0}")]
    Serialize(#[from] serde_json::Error),
    #[error("store write failed: {0}")]
    Store(#[from] StoreError),
}
