//! # Book Indexer Repository
//!
//! This crate provides traits and implementations for the external
//! collaborators of the book indexer: the search engine that hosts the
//! `books` and `book_content` indices, and the object storage buckets that
//! hold raw and parsed books. It includes error definitions, index mapping
//! definitions, an OpenSearch implementation and a local-filesystem bucket
//! implementation.

pub mod client;
pub mod config;
pub mod errors;
pub mod interfaces;
pub mod opensearch;
pub mod storage;
pub mod types;

pub use client::SearchIndexClient;
pub use config::SearchIndexConfig;
pub use errors::{SearchIndexError, StorageError};
pub use interfaces::{ObjectStore, SearchIndexProvider};
pub use opensearch::{
    IndexDefinition, OpenSearchClient, BOOKS_INDEX, BOOK_CONTENT_INDEX, BOOK_SEARCH_FIELDS,
    TEXT_VECTOR_FIELD,
};
pub use storage::LocalObjectStore;
pub use types::{BatchOperationResult, BatchOperationSummary};
