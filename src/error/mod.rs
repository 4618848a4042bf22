//! Error types for registry access, image migration and the worker pool

pub mod handlers;

use thiserror::Error;

pub type Result<T> = std::result::Result<T, MigrateError>;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum MigrateError {
    /// Transport-level failure talking to a registry
    #[error("Network error: {0}")]
    Network(String),

    /// Registry answered with an unexpected status
    #[error("Registry error during {operation} (status {status}): {message}")]
    Registry {
        operation: String,
        status: u16,
        message: String,
    },

    /// Manifest payload could not be parsed or is not a single-image manifest
    #[error("Manifest error: {0}")]
    Manifest(String),

    #[error("Digest error: {0}")]
    Digest(String),

    #[error("IO error: {0}")]
    Io(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Migration cancelled")]
    Cancelled,

    /// The migration panicked; the worker that ran it keeps serving the queue
    #[error("Migration panicked: {0}")]
    Panicked(String),
}

impl MigrateError {
    pub fn registry(operation: &str, status: u16, message: impl Into<String>) -> Self {
        MigrateError::Registry {
            operation: operation.to_string(),
            status,
            message: message.into(),
        }
    }
}

impl From<std::io::Error> for MigrateError {
    fn from(err: std::io::Error) -> Self {
        MigrateError::Io(err.to_string())
    }
}

impl From<reqwest::Error> for MigrateError {
    fn from(err: reqwest::Error) -> Self {
        MigrateError::Network(err.to_string())
    }
}

impl From<serde_json::Error> for MigrateError {
    fn from(err: serde_json::Error) -> Self {
        MigrateError::Manifest(err.to_string())
    }
}

impl From<url::ParseError> for MigrateError {
    fn from(err: url::ParseError) -> Self {
        MigrateError::Config(err.to_string())
    }
}

/// Worker pool usage and lifecycle errors
#[derive(Error, Debug, Clone, PartialEq)]
pub enum PoolError {
    #[error("Worker pool is not open for submissions")]
    NotOpen,

    #[error("Worker pool was already started")]
    AlreadyStarted,

    #[error("Worker pool needs at least one worker")]
    NoWorkers,

    #[error("Submission queue is full (capacity {capacity})")]
    QueueFull { capacity: usize },

    #[error("Worker panicked while migrating: {0}")]
    WorkerPanicked(String),

    #[error("Migration result was dropped before completion")]
    Dropped,

    #[error(transparent)]
    Migration(#[from] MigrateError),
}
