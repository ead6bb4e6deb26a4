//! Extractor module for the book indexer pipeline.
//!
//! Turns a raw book file into a `BookRecord`: metadata, full text in
//! reading order, chapter offsets and completion candidates.

mod container;
mod html;
mod metadata;

use std::path::Path;

use tracing::{debug, instrument};

use crate::errors::ExtractionError;
use book_indexer_shared::{BookRecord, ChapterSpan};

use container::{read_container, RawBook};
pub use html::{normalize_whitespace, parse_section, strip_markup, Section};
pub use metadata::derive_book_id;

/// Anything that can turn a named raw object into a book record.
///
/// Implementations are synchronous and CPU-bound; the orchestrator runs them
/// on blocking tasks.
pub trait BookExtractor: Send + Sync {
    /// Suffix of the source objects this extractor reads.
    fn source_suffix(&self) -> &str;

    fn extract(&self, name: &str, bytes: &[u8]) -> Result<BookRecord, ExtractionError>;
}

/// Extracts EPUB containers.
#[derive(Debug, Clone, Default)]
pub struct EpubExtractor;

impl EpubExtractor {
    pub fn new() -> Self {
        Self
    }

    /// Extract an EPUB held in memory; `name` supplies the title and author
    /// fallbacks.
    #[instrument(skip(self, bytes), fields(size = bytes.len()))]
    pub fn extract_bytes(&self, name: &str, bytes: &[u8]) -> Result<BookRecord, ExtractionError> {
        let raw = read_container(bytes)?;
        build_record(name, &raw, bytes)
    }
}

impl BookExtractor for EpubExtractor {
    fn source_suffix(&self) -> &str {
        ".epub"
    }

    fn extract(&self, name: &str, bytes: &[u8]) -> Result<BookRecord, ExtractionError> {
        self.extract_bytes(name, bytes)
    }
}

/// Reads book records previously persisted as JSON by an extraction run.
#[derive(Debug, Clone, Default)]
pub struct StoredRecordExtractor;

impl BookExtractor for StoredRecordExtractor {
    fn source_suffix(&self) -> &str {
        ".json"
    }

    fn extract(&self, name: &str, bytes: &[u8]) -> Result<BookRecord, ExtractionError> {
        let record: BookRecord = serde_json::from_slice(bytes)
            .map_err(|e| ExtractionError::container(format!("{}: {}", name, e)))?;
        if record.book_id.is_empty() {
            return Err(ExtractionError::missing_content(format!(
                "{}: record has no book_id",
                name
            )));
        }
        if record.full_text.is_empty() {
            return Err(ExtractionError::missing_content(format!(
                "{}: record has no text",
                name
            )));
        }
        Ok(record)
    }
}

fn file_stem(name: &str) -> String {
    Path::new(name)
        .file_stem()
        .map(|stem| stem.to_string_lossy().into_owned())
        .unwrap_or_else(|| name.to_string())
}

fn build_record(name: &str, raw: &RawBook, bytes: &[u8]) -> Result<BookRecord, ExtractionError> {
    let stem = file_stem(name);

    let sections: Vec<Section> = raw
        .sections
        .iter()
        .map(|section| parse_section(&section.id, &section.markup))
        .filter(|section| !section.is_empty())
        .collect();
    if sections.is_empty() {
        return Err(ExtractionError::missing_content(format!(
            "{}: no textual body sections",
            name
        )));
    }

    // Offsets are in chars, matching the chunker's measure.
    let mut full_text = String::new();
    let mut offset = 0;
    let mut chapters = Vec::with_capacity(sections.len());
    for section in &sections {
        if !full_text.is_empty() {
            full_text.push_str("\n\n");
            offset += 2;
        }
        chapters.push(ChapterSpan {
            title: section.heading.clone(),
            offset,
        });
        let text = section.text();
        offset += text.chars().count();
        full_text.push_str(&text);
    }

    let source_uid = metadata::source_uid(raw.unique_identifier.as_deref(), &raw.metadata, bytes);
    let title = metadata::first(&raw.metadata, "title").unwrap_or_else(|| stem.clone());

    let mut authors = metadata::values(&raw.metadata, "creator");
    if authors.is_empty() {
        authors.extend(
            metadata::author_from_text(&sections).or_else(|| metadata::author_from_stem(&stem)),
        );
    }

    let mut description = metadata::description(&raw.metadata);
    if description.is_empty() {
        description = metadata::description_from_text(&sections);
    }

    let publisher = metadata::first(&raw.metadata, "publisher")
        .or_else(|| metadata::publisher_from_text(&sections))
        .unwrap_or_default();

    let mut record = BookRecord::new(metadata::derive_book_id(&source_uid), title)
        .with_authors(authors)
        .with_content(full_text, chapters);
    record.source_uid = source_uid;
    record.genres = metadata::values(&raw.metadata, "subject").into_iter().collect();
    record.description = description;
    record.publisher = publisher;
    record.language = metadata::first(&raw.metadata, "language");

    debug!(
        book_id = %record.book_id,
        sections = sections.len(),
        chars = offset,
        "Extracted book"
    );
    Ok(record)
}
