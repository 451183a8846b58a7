//! Error types and handling
//!
//! Common error types used across the recorder.

use std::path::PathBuf;
use thiserror::Error;

/// Recorder-wide error type
#[derive(Error, Debug)]
pub enum RecorderError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Malformed status file {path:?}: {source}")]
    MalformedStatus {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("Recorder is already running")]
    AlreadyRunning,

    #[error("Configuration error: {0}")]
    Config(String),
}

/// Result type alias using RecorderError
pub type RecorderResult<T> = Result<T, RecorderError>;
