//! OpenSearch implementation of the search index provider.
//!
//! This module provides a concrete implementation of `SearchIndexProvider`
//! using OpenSearch as the backend, together with the mapping definitions of
//! the `books` and `book_content` indices.

mod client;
mod index_config;

pub use client::OpenSearchClient;
pub(crate) use index_config::mapped_vector_dimension;
pub use index_config::{
    book_content_index_settings, books_index_settings, IndexDefinition, BOOKS_INDEX,
    BOOK_CONTENT_INDEX, BOOK_SEARCH_FIELDS, TEXT_VECTOR_FIELD,
};
