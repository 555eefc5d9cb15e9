//! Error taxonomy shared by the core and the binary crate.
//!
//! Every fatal condition of an ingest run maps onto one of these types. Nothing
//! is retried here: the only retry decision lives in [`crate::fetch`] and is
//! expressed through [`FetchError::RetryExhausted`].

use thiserror::Error;

/// Configuration could not be loaded or failed validation.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {message}")]
    Read { path: String, message: String },

    #[error("Failed to parse config YAML: {0}")]
    Parse(String),

    #[error("Secret environment variable {0} is not set or empty")]
    MissingSecret(String),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// A paginated walk could not be completed.
#[derive(Error, Debug)]
pub enum FetchError {
    #[error("page_size has to be between 10 and 100, inclusive; it is set to {page_size}")]
    Validation { page_size: u32 },

    #[error("API kept returning status {last_status} after {retries} retries")]
    RetryExhausted { retries: u32, last_status: u16 },

    #[error("API returned error status {status}: {body}")]
    Api { status: u16, body: String },

    #[error("Request to the API failed: {0}")]
    Transport(String),

    #[error("Failed to decode API page: {0}")]
    Decode(String),

    #[error("Record at position {index} of a full page has no usable id for the next cursor")]
    MissingCursor { index: usize },
}

/// Writing a batch to the bucket or the local mirror failed.
#[derive(Error, Debug)]
pub enum SinkError {
    #[error("Local mirror I/O failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to encode records: {0}")]
    Encode(#[from] serde_json::Error),

    #[error("Object storage rejected the batch: {0}")]
    Storage(String),
}

/// Failure of a single event type's fetch-and-store step.
#[derive(Error, Debug)]
pub enum EventTypeError {
    #[error(transparent)]
    Fetch(#[from] FetchError),

    #[error(transparent)]
    Sink(#[from] SinkError),
}

/// Top-level failure of an ingest run.
#[derive(Error, Debug)]
pub enum IngestError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("Ingest of event type '{event_type}' failed: {source}")]
    EventType {
        event_type: String,
        #[source]
        source: EventTypeError,
    },
}
