//! Error types for the book indexer pipeline.
//!
//! Each stage has its own error type; `PipelineError` is what a run returns.
//! Which errors abort a run:
//!
//! - `ExtractionError`: never; the book is skipped and recorded
//! - `ChunkingError`: always, before any book is processed
//! - `EmbeddingError`: depending on the configured failure policy
//! - `EmbeddingSchemaError`: always
//! - `LoaderTransportError`: always
//! - per-document rejections: never; they are counted in the run summary

use thiserror::Error;

use crate::orchestrator::RunState;
use book_indexer_repository::{SearchIndexError, StorageError};

/// A source file could not be turned into a book record.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ExtractionError {
    /// The container is not a readable EPUB.
    #[error("Unreadable container: {0}")]
    ContainerError(String),

    /// The container has no textual body sections.
    #[error("Missing content: {0}")]
    MissingContent(String),

    /// A body section could not be decoded.
    #[error("Encoding error: {0}")]
    EncodingError(String),
}

impl ExtractionError {
    pub fn container(msg: impl Into<String>) -> Self {
        Self::ContainerError(msg.into())
    }

    pub fn missing_content(msg: impl Into<String>) -> Self {
        Self::MissingContent(msg.into())
    }

    pub fn encoding(msg: impl Into<String>) -> Self {
        Self::EncodingError(msg.into())
    }
}

/// The chunker was configured with impossible bounds.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ChunkingError {
    #[error("Invalid chunking configuration: {0}")]
    InvalidConfig(String),
}

/// Vector dimensionality does not match what the index expects.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("Embedding dimension mismatch ({context}): expected {expected}, got {actual}")]
pub struct EmbeddingSchemaError {
    pub expected: usize,
    pub actual: usize,
    pub context: String,
}

impl EmbeddingSchemaError {
    pub fn new(expected: usize, actual: usize, context: impl Into<String>) -> Self {
        Self {
            expected,
            actual,
            context: context.into(),
        }
    }
}

/// Failures of the embedding model service.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum EmbeddingError {
    /// Timeout, connection failure, throttling or server error.
    #[error("Transient embedding failure: {0}")]
    TransientError(String),

    /// The service refused the request; retrying will not help.
    #[error("Embedding request rejected: {0}")]
    RejectedError(String),

    /// The service answered with something that is not one vector per input.
    #[error("Invalid embedding response: {0}")]
    InvalidResponse(String),

    /// Retries were used up.
    #[error("Embedding failed after {attempts} attempts: {last_error}")]
    Exhausted { attempts: u32, last_error: String },

    #[error(transparent)]
    Schema(#[from] EmbeddingSchemaError),

    /// The HTTP client could not be built.
    #[error("Embedding client error: {0}")]
    ClientError(String),

    /// The run was cancelled before this batch started.
    #[error("Embedding cancelled")]
    Cancelled,
}

impl EmbeddingError {
    pub fn transient(msg: impl Into<String>) -> Self {
        Self::TransientError(msg.into())
    }

    pub fn rejected(msg: impl Into<String>) -> Self {
        Self::RejectedError(msg.into())
    }

    pub fn invalid_response(msg: impl Into<String>) -> Self {
        Self::InvalidResponse(msg.into())
    }

    /// Only transient failures are retried.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::TransientError(_))
    }
}

/// Errors that can occur in the book indexer pipeline.
#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("Extraction error: {0}")]
    ExtractionError(#[from] ExtractionError),

    #[error("Chunking error: {0}")]
    ChunkingError(#[from] ChunkingError),

    #[error("Embedding error: {0}")]
    EmbeddingError(EmbeddingError),

    #[error("Embedding schema error: {0}")]
    EmbeddingSchemaError(#[from] EmbeddingSchemaError),

    /// The search engine is unreachable or timed out.
    #[error("Loader transport error: {0}")]
    LoaderTransportError(String),

    /// The search engine refused an operation that cannot be skipped.
    #[error("Search error: {0}")]
    SearchError(SearchIndexError),

    #[error("Storage error: {0}")]
    StorageError(#[from] StorageError),

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    #[error("NDJSON error at line {line}: {reason}")]
    NdjsonError { line: usize, reason: String },

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Invalid run state transition from {from:?} to {to:?}")]
    InvalidTransition { from: RunState, to: RunState },

    /// A stage task panicked or was aborted.
    #[error("Task error: {0}")]
    TaskError(String),

    /// The run was cancelled.
    #[error("Run cancelled")]
    Cancelled,
}

impl PipelineError {
    /// Create a loader transport error.
    pub fn loader_transport(msg: impl Into<String>) -> Self {
        Self::LoaderTransportError(msg.into())
    }

    /// Create an NDJSON error.
    pub fn ndjson(line: usize, reason: impl Into<String>) -> Self {
        Self::NdjsonError {
            line,
            reason: reason.into(),
        }
    }
}

impl From<EmbeddingError> for PipelineError {
    fn from(err: EmbeddingError) -> Self {
        match err {
            EmbeddingError::Schema(schema) => Self::EmbeddingSchemaError(schema),
            EmbeddingError::Cancelled => Self::Cancelled,
            other => Self::EmbeddingError(other),
        }
    }
}

impl From<SearchIndexError> for PipelineError {
    fn from(err: SearchIndexError) -> Self {
        match err {
            SearchIndexError::TransportError(msg) => Self::LoaderTransportError(msg),
            other => Self::SearchError(other),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_schema_error_surfaces_as_schema() {
        let err: PipelineError = EmbeddingError::from(EmbeddingSchemaError::new(384, 768, "batch")).into();
        assert!(matches!(
            err,
            PipelineError::EmbeddingSchemaError(EmbeddingSchemaError {
                expected: 384,
                actual: 768,
                ..
            })
        ));
    }

    #[test]
    fn test_search_transport_becomes_loader_transport() {
        let err: PipelineError = SearchIndexError::transport("connection refused").into();
        assert!(matches!(err, PipelineError::LoaderTransportError(_)));

        let err: PipelineError = SearchIndexError::batch_size_exceeded(2, 1).into();
        assert!(matches!(err, PipelineError::SearchError(_)));
    }

    #[test]
    fn test_only_transient_embedding_errors_retry() {
        assert!(EmbeddingError::transient("timeout").is_retryable());
        assert!(!EmbeddingError::rejected("400").is_retryable());
        assert!(!EmbeddingError::from(EmbeddingSchemaError::new(1, 2, "x")).is_retryable());
    }
}
