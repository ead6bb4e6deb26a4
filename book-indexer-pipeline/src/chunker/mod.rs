//! Chunker module for the book indexer pipeline.
//!
//! Splits a book's full text into bounded, overlapping chunks. Sizes are
//! measured in `char`s. A cut prefers a paragraph break, then a sentence end,
//! within `boundary_tolerance` characters before the window end, and falls
//! back to a hard split at exactly `max_chunk_size`.

use std::ops::Range;

use tracing::{debug, instrument};

use crate::errors::ChunkingError;
use book_indexer_shared::{BookRecord, ChunkRecord};

/// Configuration for the chunker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkerConfig {
    /// Maximum number of characters in a chunk.
    pub max_chunk_size: usize,
    /// Characters shared by consecutive chunks.
    pub overlap: usize,
    /// How far before the window end a boundary may be searched for.
    pub boundary_tolerance: usize,
}

impl ChunkerConfig {
    /// Create a config with the default tolerance of 10% of `max_chunk_size`.
    pub fn new(max_chunk_size: usize, overlap: usize) -> Self {
        Self {
            max_chunk_size,
            overlap,
            boundary_tolerance: max_chunk_size / 10,
        }
    }

    pub fn with_boundary_tolerance(mut self, boundary_tolerance: usize) -> Self {
        self.boundary_tolerance = boundary_tolerance;
        self
    }
}

impl Default for ChunkerConfig {
    fn default() -> Self {
        Self::new(1000, 100)
    }
}

/// Splits text into overlapping chunks.
#[derive(Debug, Clone)]
pub struct Chunker {
    config: ChunkerConfig,
}

impl Chunker {
    /// Create a chunker, rejecting configurations that cannot make progress.
    pub fn new(config: ChunkerConfig) -> Result<Self, ChunkingError> {
        if config.max_chunk_size == 0 {
            return Err(ChunkingError::InvalidConfig(
                "max_chunk_size must be greater than zero".to_string(),
            ));
        }
        if config.overlap >= config.max_chunk_size {
            return Err(ChunkingError::InvalidConfig(format!(
                "overlap ({}) must be smaller than max_chunk_size ({})",
                config.overlap, config.max_chunk_size
            )));
        }

        Ok(Self { config })
    }

    pub fn config(&self) -> &ChunkerConfig {
        &self.config
    }

    /// Character ranges of the chunks of `text`, in order.
    pub fn spans(&self, text: &str) -> Vec<Range<usize>> {
        let chars: Vec<char> = text.chars().collect();
        self.spans_of(&chars)
    }

    fn spans_of(&self, chars: &[char]) -> Vec<Range<usize>> {
        let total = chars.len();
        let mut spans = Vec::new();
        let mut start = 0;

        while start < total {
            let limit = start + self.config.max_chunk_size;
            if limit >= total {
                spans.push(start..total);
                break;
            }

            let cut = self.find_cut(chars, start, limit).unwrap_or(limit);
            spans.push(start..cut);
            start = cut - self.config.overlap;
        }

        spans
    }

    /// Latest paragraph break, else latest sentence end, in the tolerance
    /// window. Cuts land strictly after `start + overlap`.
    fn find_cut(&self, chars: &[char], start: usize, limit: usize) -> Option<usize> {
        let lowest = limit
            .saturating_sub(self.config.boundary_tolerance)
            .max(start + self.config.overlap + 1);
        if lowest > limit {
            return None;
        }

        let paragraph = (lowest..=limit)
            .rev()
            .find(|&cut| cut >= 2 && chars[cut - 1] == '\n' && chars[cut - 2] == '\n');
        if paragraph.is_some() {
            return paragraph;
        }

        (lowest..=limit).rev().find(|&cut| {
            cut >= 2 && chars[cut - 1].is_whitespace() && matches!(chars[cut - 2], '.' | '!' | '?')
        })
    }

    /// Chunk raw text for `book_id`, without chapter attribution.
    pub fn chunk_text(&self, book_id: &str, text: &str) -> Vec<ChunkRecord> {
        let chars: Vec<char> = text.chars().collect();
        self.spans_of(&chars)
            .into_iter()
            .enumerate()
            .map(|(idx, span)| ChunkRecord::new(book_id, idx, collect(&chars, span)))
            .collect()
    }

    /// Chunk a book's full text, tagging each chunk with the chapter it starts in.
    #[instrument(skip(self, book), fields(book_id = %book.book_id))]
    pub fn chunk_book(&self, book: &BookRecord) -> Vec<ChunkRecord> {
        let chars: Vec<char> = book.full_text.chars().collect();
        let chunks: Vec<ChunkRecord> = self
            .spans_of(&chars)
            .into_iter()
            .enumerate()
            .map(|(idx, span)| {
                let chapter = book.chapter_at(span.start).map(str::to_string);
                ChunkRecord::new(&book.book_id, idx, collect(&chars, span)).with_chapter(chapter)
            })
            .collect();

        debug!(
            chunk_count = chunks.len(),
            text_chars = chars.len(),
            "Chunked book"
        );
        chunks
    }
}

fn collect(chars: &[char], span: Range<usize>) -> String {
    chars[span].iter().collect()
}
