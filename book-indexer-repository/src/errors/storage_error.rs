//! Object storage error types.

use thiserror::Error;

/// Errors that can occur while reading or writing bucket objects.
#[derive(Debug, Error)]
pub enum StorageError {
    /// The object does not exist.
    #[error("Object not found: {0}")]
    NotFound(String),

    /// The object name is not usable as a key (absolute or escaping the bucket).
    #[error("Invalid object name: {0}")]
    InvalidName(String),

    /// Failed to serialize an object body.
    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    /// Underlying IO failure.
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

impl StorageError {
    /// Create an invalid name error.
    pub fn invalid_name(name: impl Into<String>) -> Self {
        Self::InvalidName(name.into())
    }
}
