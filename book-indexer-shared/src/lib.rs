//! # Book Indexer Shared
//!
//! Data structures shared by every stage of the book indexer: the records
//! produced by extraction and chunking, and the documents written to the
//! `books` and `book_content` indices.

mod book;
mod chunk;
mod document;

pub use book::{build_suggest, BookRecord, ChapterSpan, SuggestInput};
pub use book::{AUTHOR_SUGGEST_WEIGHT, TITLE_SUGGEST_WEIGHT};
pub use chunk::{chunk_id, ChunkRecord};
pub use document::{BookDocument, BulkOperation, ContentDocument};
