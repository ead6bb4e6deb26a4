//! Chunk records produced by the chunker.

use serde::{Deserialize, Serialize};

/// Deterministic identifier of a chunk inside the `book_content` index.
pub fn chunk_id(book_id: &str, chunk_index: usize) -> String {
    format!("{}-{:06}", book_id, chunk_index)
}

/// A bounded slice of a book's text.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChunkRecord {
    /// Owning book.
    pub book_id: String,
    /// Zero-based reading-order position within the book.
    pub chunk_index: usize,
    pub text: String,
    /// Section in which the chunk starts.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chapter: Option<String>,
    /// Embedding, present only once the embedder has run for this chunk.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text_vector: Option<Vec<f32>>,
}

impl ChunkRecord {
    pub fn new(book_id: impl Into<String>, chunk_index: usize, text: impl Into<String>) -> Self {
        Self {
            book_id: book_id.into(),
            chunk_index,
            text: text.into(),
            chapter: None,
            text_vector: None,
        }
    }

    pub fn with_chapter(mut self, chapter: Option<String>) -> Self {
        self.chapter = chapter;
        self
    }

    pub fn chunk_id(&self) -> String {
        chunk_id(&self.book_id, self.chunk_index)
    }

    pub fn is_embedded(&self) -> bool {
        self.text_vector.is_some()
    }
}
