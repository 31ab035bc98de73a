//! Error types for checkpoint operations

use thiserror::Error;

/// Result type for checkpoint operations
pub type Result<T> = std::result::Result<T, CheckpointError>;

/// Errors that can occur during checkpoint operations
#[derive(Error, Debug)]
pub enum CheckpointError {
    /// Checkpoint not found
    #[error("Checkpoint not found: {0}")]
    NotFound(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Backing store failure. Transient from the caller's point of view; the
    /// saver never retries on its own.
    #[error("Storage error: {0}")]
    Storage(String),

    /// Checkpoint violates the append-only chain rules
    #[error("Invalid checkpoint: {0}")]
    Invalid(String),

    /// A checkpoint id was re-used with different content
    #[error("Checkpoint {checkpoint_id} already exists in thread {thread_id} with different content")]
    Conflict {
        thread_id: String,
        checkpoint_id: String,
    },

    /// Persisted layout written by an unknown schema version
    #[error("Unsupported checkpoint schema version: {0}")]
    UnsupportedVersion(u64),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl CheckpointError {
    /// Whether retrying the same operation later may succeed.
    pub fn is_transient(&self) -> bool {
        matches!(self, CheckpointError::Storage(_) | CheckpointError::Io(_))
    }
}

#[cfg(feature = "sqlite")]
impl From<sqlx::Error> for CheckpointError {
    fn from(err: sqlx::Error) -> Self {
        CheckpointError::Storage(err.to_string())
    }
}

#[cfg(feature = "sqlite")]
impl From<sqlx::migrate::MigrateError> for CheckpointError {
    fn from(err: sqlx::migrate::MigrateError) -> Self {
        CheckpointError::Storage(format!("Migration failed: {}", err))
    }
}
