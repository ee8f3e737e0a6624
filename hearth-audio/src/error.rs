//! Error types for hearth-audio
//!
//! Defines module-specific error types using thiserror for clear error propagation.

use std::time::Duration;
use thiserror::Error;

/// Main error type for hearth-audio
#[derive(Error, Debug)]
pub enum Error {
    /// A pipe write, process probe, spawn or player round trip exceeded its bound
    #[error("Timed out after {after:?}: {operation}")]
    Timeout {
        operation: String,
        after: Duration,
    },

    /// An operation assumed a running process that the process table shows absent
    ///
    /// The supervisor converts this into a typed "not running" outcome; it only
    /// reaches callers from lower layers used directly.
    #[error("Process not found: {0}")]
    ProcessNotFound(String),

    /// Both look-ahead slots are occupied
    #[error("Queue is full")]
    QueueFull,

    /// Unknown queue slot name
    #[error("Invalid queue slot: {0}")]
    InvalidSlot(String),

    /// A previously resolved stream URL is no longer valid; re-resolve, don't retry
    #[error("Stream URL expired for {0}")]
    StaleResourceExpired(String),

    /// Player rejected a request or its IPC channel failed
    #[error("Player error: {0}")]
    Player(String),

    /// Stream resolver failed (network, unknown id, tool missing)
    #[error("Resolver error: {0}")]
    Resolver(String),

    /// Configuration file loading errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// File I/O errors
    #[error("File I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Resource not found
    #[error("Not found: {0}")]
    NotFound(String),

    /// Invalid request
    #[error("Bad request: {0}")]
    BadRequest(String),

    /// HTTP server errors
    #[error("HTTP server error: {0}")]
    Http(String),

    /// Other errors
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Build a Timeout error for a named operation
    pub fn timeout(operation: impl Into<String>, after: Duration) -> Self {
        Error::Timeout {
            operation: operation.into(),
            after,
        }
    }
}

impl From<hearth_common::Error> for Error {
    fn from(err: hearth_common::Error) -> Self {
        match err {
            hearth_common::Error::Io(e) => Error::Io(e),
            hearth_common::Error::Config(msg) => Error::Config(msg),
            hearth_common::Error::NotFound(msg) => Error::NotFound(msg),
            hearth_common::Error::InvalidInput(msg) => Error::BadRequest(msg),
        }
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::Internal(format!("JSON error: {}", err))
    }
}

/// Convenience Result type using hearth-audio Error
pub type Result<T> = std::result::Result<T, Error>;
