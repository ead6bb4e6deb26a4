//! # Book Indexer Pipeline
//!
//! This crate provides the pipeline components that turn EPUB files into
//! documents of the `books` and `book_content` indices.
//!
//! ## Architecture
//!
//! The pipeline runs five stages, each feeding the next:
//!
//! 1. **Extractor**: Reads a raw book into a `BookRecord`
//! 2. **Chunker**: Splits the book text into bounded, overlapping chunks
//! 3. **Embedder**: Attaches a vector to every chunk
//! 4. **Serializer**: Maps records to bulk operations and NDJSON
//! 5. **Loader**: Streams bulk operations into the search index
//!
//! The **Orchestrator** drives a run through these stages and reports a
//! `RunSummary`.

pub mod chunker;
pub mod embedder;
pub mod errors;
pub mod extractor;
pub mod loader;
pub mod orchestrator;
pub mod serializer;
pub mod summary;

pub use errors::{
    ChunkingError, EmbeddingError, EmbeddingSchemaError, ExtractionError, PipelineError,
};
