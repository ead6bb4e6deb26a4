//! Search index error types.
//!
//! This module defines the error types that can occur during search index operations.

use thiserror::Error;

/// Errors that can occur during search index operations.
#[derive(Debug, Clone, Error)]
pub enum SearchIndexError {
    /// The search engine could not be reached or did not answer in time.
    #[error("Transport error: {0}")]
    TransportError(String),

    /// The search engine rejected a whole request.
    #[error("Request failed with status {status}: {reason}")]
    RequestError { status: u16, reason: String },

    /// Failed to create or drop an index.
    #[error("Index creation error: {0}")]
    IndexCreationError(String),

    /// Failed to parse a response from the search engine.
    #[error("Parse error: {0}")]
    ParseError(String),

    /// Validation error (e.g., malformed mapping definition).
    #[error("Validation error: {0}")]
    ValidationError(String),

    /// Batch size exceeds configured maximum.
    #[error("Batch size {provided} exceeds maximum {max}")]
    BatchSizeExceeded { provided: usize, max: usize },
}

impl SearchIndexError {
    /// Create a transport error.
    pub fn transport(msg: impl Into<String>) -> Self {
        Self::TransportError(msg.into())
    }

    /// Create a request error.
    pub fn request(status: u16, reason: impl Into<String>) -> Self {
        Self::RequestError {
            status,
            reason: reason.into(),
        }
    }

    /// Create an index creation error.
    pub fn index_creation(msg: impl Into<String>) -> Self {
        Self::IndexCreationError(msg.into())
    }

    /// Create a parse error.
    pub fn parse(msg: impl Into<String>) -> Self {
        Self::ParseError(msg.into())
    }

    /// Create a validation error.
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::ValidationError(msg.into())
    }

    /// Create a batch size exceeded error.
    pub fn batch_size_exceeded(provided: usize, max: usize) -> Self {
        Self::BatchSizeExceeded { provided, max }
    }

    /// Whether retrying the same request may succeed.
    ///
    /// Transport failures and throttling/unavailability statuses are transient.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::TransportError(_) => true,
            Self::RequestError { status, .. } => matches!(status, 429 | 502 | 503 | 504),
            Self::IndexCreationError(_)
            | Self::ParseError(_)
            | Self::ValidationError(_)
            | Self::BatchSizeExceeded { .. } => false,
        }
    }
}
