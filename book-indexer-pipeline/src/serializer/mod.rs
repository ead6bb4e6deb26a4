//! Serializer module for the book indexer pipeline.
//!
//! Maps book and chunk records to bulk `index` operations against the two
//! indices and to NDJSON. Document ids are always the stable record ids, so
//! re-loading the same input overwrites rather than duplicates.

mod ndjson;

use book_indexer_repository::{BOOKS_INDEX, BOOK_CONTENT_INDEX};
use book_indexer_shared::{BookDocument, BookRecord, BulkOperation, ChunkRecord, ContentDocument};

use crate::errors::PipelineError;

pub use ndjson::{encode_operation, read_ndjson, NdjsonReader, NdjsonWriter};

/// Names of the book metadata and chunk content indices.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexNames {
    pub books: String,
    pub content: String,
}

impl IndexNames {
    pub fn new(books: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            books: books.into(),
            content: content.into(),
        }
    }
}

impl Default for IndexNames {
    fn default() -> Self {
        Self::new(BOOKS_INDEX, BOOK_CONTENT_INDEX)
    }
}

/// Bulk operation for the `books` index, keyed by `book_id`.
pub fn book_operation(book: &BookRecord, index: &str) -> Result<BulkOperation, PipelineError> {
    let source = serde_json::to_value(BookDocument::from(book))?;
    Ok(BulkOperation::new(index, &book.book_id, source))
}

/// Bulk operation for the `book_content` index, keyed by `chunk_id`.
pub fn chunk_operation(chunk: &ChunkRecord, index: &str) -> Result<BulkOperation, PipelineError> {
    let source = serde_json::to_value(ContentDocument::from(chunk))?;
    Ok(BulkOperation::new(index, chunk.chunk_id(), source))
}

/// Serializer bound to a pair of index names.
#[derive(Debug, Clone, Default)]
pub struct Serializer {
    indices: IndexNames,
}

impl Serializer {
    pub fn new(indices: IndexNames) -> Self {
        Self { indices }
    }

    pub fn indices(&self) -> &IndexNames {
        &self.indices
    }

    pub fn book_operation(&self, book: &BookRecord) -> Result<BulkOperation, PipelineError> {
        book_operation(book, &self.indices.books)
    }

    pub fn chunk_operation(&self, chunk: &ChunkRecord) -> Result<BulkOperation, PipelineError> {
        chunk_operation(chunk, &self.indices.content)
    }

    /// The book's operation followed by one per chunk, in chunk order.
    pub fn book_operations(
        &self,
        book: &BookRecord,
        chunks: &[ChunkRecord],
    ) -> Result<Vec<BulkOperation>, PipelineError> {
        let mut operations = Vec::with_capacity(chunks.len() + 1);
        operations.push(self.book_operation(book)?);
        for chunk in chunks {
            operations.push(self.chunk_operation(chunk)?);
        }
        Ok(operations)
    }
}
