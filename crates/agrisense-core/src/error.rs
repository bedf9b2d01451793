//! Error taxonomy for the inference pipeline.
//!
//! Each stage of the request lifecycle has its own error enum so callers can
//! tell a rejected input apart from a broken backend. [`Error`] is the
//! umbrella the orchestrator surfaces.

use thiserror::Error;

/// Request rejected before any backend was contacted.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    /// One or more required numeric fields were absent.
    #[error("Missing fields: {}", .0.join(", "))]
    MissingFields(Vec<String>),

    /// A field was present but could not be read as a number.
    #[error("Invalid number in input: {field}")]
    InvalidNumber { field: String },

    /// Image request carried no usable binary payload.
    #[error("Image file missing")]
    ImageMissing,
}

/// The local worker process failed or produced unusable output.
#[derive(Debug, Error)]
pub enum ProcessError {
    #[error("failed to spawn inference worker: {0}")]
    Spawn(#[source] std::io::Error),

    #[error("worker stdio error: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to encode worker request: {0}")]
    Encode(#[from] serde_json::Error),

    /// The worker exited but stdout held no parseable reply.
    #[error("invalid output from inference worker")]
    InvalidOutput { stdout: String, stderr: String },

    /// The worker died (non-zero exit or signal) without replying.
    #[error("inference worker exited abnormally ({status})")]
    Failed {
        status: std::process::ExitStatus,
        stderr: String,
    },
}

/// The remote inference service failed.
#[derive(Debug, Error)]
pub enum HttpError {
    #[error("failed to encode request for inference service: {0}")]
    Encode(#[from] serde_json::Error),

    #[error("inference service unreachable: {0}")]
    Unreachable(#[source] reqwest::Error),

    /// Non-success HTTP status. The response body is kept for logging only.
    #[error("inference service rejected the request ({status})")]
    BackendRejected {
        status: reqwest::StatusCode,
        body: String,
    },

    #[error("invalid response from inference service: {0}")]
    InvalidOutput(String),
}

/// The record store could not write or read a prediction.
#[derive(Debug, Error)]
pub enum PersistError {
    #[error("storage error: {0}")]
    Storage(#[from] sled::Error),

    #[error("record codec error: {0}")]
    Codec(#[from] serde_json::Error),

    /// Write-once violation: the key is already occupied.
    #[error("record key already exists: {0}")]
    KeyExists(String),
}

/// Umbrella error surfaced by the orchestrator.
#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error(transparent)]
    Process(#[from] ProcessError),

    #[error(transparent)]
    Http(#[from] HttpError),

    #[error(transparent)]
    Persist(#[from] PersistError),

    /// The backend completed the exchange but reported a failure of its own
    /// (for example a model error message in an otherwise well-formed reply).
    #[error("{0}")]
    Backend(String),

    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
