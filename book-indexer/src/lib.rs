//! # Book Indexer
//!
//! Main library for the book catalog indexer.
//!
//! This crate provides the configuration, dependency wiring and command
//! implementations behind the `book-indexer` binary.

pub mod commands;
pub mod config;

pub use config::{Dependencies, IndexerConfig};

use thiserror::Error;

/// Errors that can occur during indexer initialization or execution.
#[derive(Error, Debug)]
pub enum IndexingError {
    /// Configuration error.
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// Pipeline error.
    #[error("Pipeline error: {0}")]
    PipelineError(#[from] book_indexer_pipeline::PipelineError),

    /// Search error.
    #[error("Search error: {0}")]
    SearchError(#[from] book_indexer_repository::SearchIndexError),

    /// Storage error.
    #[error("Storage error: {0}")]
    StorageError(#[from] book_indexer_repository::StorageError),

    /// IO error.
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

impl IndexingError {
    /// Create a configuration error.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::ConfigError(msg.into())
    }
}
