//! Documents written to the search indices.
//!
//! These are the wire shapes of the two collections: `BookDocument` for the
//! `books` index and `ContentDocument` for the `book_content` index.

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::book::{BookRecord, SuggestInput};
use crate::chunk::ChunkRecord;

/// Metadata document for the `books` index.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BookDocument {
    pub book_id: String,
    pub source_uid: String,
    pub title: String,
    pub authors: Vec<String>,
    /// Sorted, so identical records serialize identically.
    pub genres: Vec<String>,
    pub description: String,
    pub publisher: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub language: Option<String>,
    pub link_to_book: String,
    pub suggest: Vec<SuggestInput>,
}

impl From<&BookRecord> for BookDocument {
    fn from(book: &BookRecord) -> Self {
        Self {
            book_id: book.book_id.clone(),
            source_uid: book.source_uid.clone(),
            title: book.title.clone(),
            authors: book.authors.clone(),
            genres: book.genres.iter().cloned().collect(),
            description: book.description.clone(),
            publisher: book.publisher.clone(),
            language: book.language.clone(),
            link_to_book: book.link_to_book.clone(),
            suggest: book.suggest.clone(),
        }
    }
}

/// Chunk document for the `book_content` index.
///
/// `text_vector` is omitted from the serialized form when the chunk was never
/// embedded, which keeps "not embedded" distinct from a zero vector.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContentDocument {
    pub book_id: String,
    pub chunk_id: String,
    pub chunk_index: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chapter: Option<String>,
    pub text: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text_vector: Option<Vec<f32>>,
}

impl From<&ChunkRecord> for ContentDocument {
    fn from(chunk: &ChunkRecord) -> Self {
        Self {
            book_id: chunk.book_id.clone(),
            chunk_id: chunk.chunk_id(),
            chunk_index: chunk.chunk_index,
            chapter: chunk.chapter.clone(),
            text: chunk.text.clone(),
            text_vector: chunk.text_vector.clone(),
        }
    }
}

/// One `index` action of a bulk request: target index, document id and source.
#[derive(Debug, Clone, PartialEq)]
pub struct BulkOperation {
    pub index: String,
    pub id: String,
    pub source: Value,
}

impl BulkOperation {
    pub fn new(index: impl Into<String>, id: impl Into<String>, source: Value) -> Self {
        Self {
            index: index.into(),
            id: id.into(),
            source,
        }
    }

    /// The action line preceding the document in NDJSON form.
    pub fn action_line(&self) -> Value {
        json!({ "index": { "_index": self.index, "_id": self.id } })
    }

    /// Size in bytes of the action/document pair as NDJSON, newlines included.
    pub fn ndjson_len(&self) -> usize {
        let action = serde_json::to_string(&self.action_line()).map_or(0, |s| s.len());
        let source = serde_json::to_string(&self.source).map_or(0, |s| s.len());
        action + source + 2
    }
}
