//! Error types for the hotpin daemon.
//!
//! Everything here is a startup failure: once the reconciler is running it
//! handles its own errors and never returns one.

use thiserror::Error;

/// Result type for daemon operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that stop the daemon from starting.
#[derive(Debug, Error)]
pub enum Error {
    /// Storage error
    #[error("Storage error: {0}")]
    Storage(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Invalid configuration
    #[error("Configuration error: {0}")]
    Config(String),

    /// Reconciler setup error
    #[error("Reconciler error: {0}")]
    Core(#[from] hotpin_core::Error),

    /// HTTP client error
    #[error("HTTP client error: {0}")]
    Http(#[from] reqwest::Error),

    /// Background task failure
    #[error("Task error: {0}")]
    Task(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<rocksdb::Error> for Error {
    fn from(e: rocksdb::Error) -> Self {
        Error::Storage(e.to_string())
    }
}
