//! Book records produced by the extractor.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

/// Completion weight given to a book title.
pub const TITLE_SUGGEST_WEIGHT: u32 = 10;

/// Completion weight given to each author name.
pub const AUTHOR_SUGGEST_WEIGHT: u32 = 5;

/// A single prefix-completion candidate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SuggestInput {
    pub input: String,
    pub weight: u32,
}

/// Start of a body section inside `full_text`.
///
/// `offset` counts characters, not bytes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChapterSpan {
    pub title: String,
    pub offset: usize,
}

/// Structured content of one book.
///
/// A record is created once per source file and never patched afterwards;
/// re-ingesting the same file produces a new record with the same `book_id`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BookRecord {
    /// Stable identifier, derived from `source_uid`.
    pub book_id: String,
    /// Identifier the `book_id` was derived from (package identifier or file digest).
    #[serde(default)]
    pub source_uid: String,
    pub title: String,
    /// Authors in the order the package lists them.
    #[serde(default)]
    pub authors: Vec<String>,
    #[serde(default)]
    pub genres: BTreeSet<String>,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub publisher: String,
    #[serde(default)]
    pub language: Option<String>,
    /// URI of the raw source object.
    #[serde(default)]
    pub link_to_book: String,
    /// Concatenated body text, paragraphs separated by blank lines.
    #[serde(default)]
    pub full_text: String,
    /// Section starts, ordered by offset.
    #[serde(default)]
    pub chapters: Vec<ChapterSpan>,
    #[serde(default)]
    pub suggest: Vec<SuggestInput>,
}

impl BookRecord {
    /// Create a record with a title and no content.
    pub fn new(book_id: impl Into<String>, title: impl Into<String>) -> Self {
        let title = title.into();
        Self {
            book_id: book_id.into(),
            source_uid: String::new(),
            suggest: build_suggest(&title, &[]),
            title,
            authors: Vec::new(),
            genres: BTreeSet::new(),
            description: String::new(),
            publisher: String::new(),
            language: None,
            link_to_book: String::new(),
            full_text: String::new(),
            chapters: Vec::new(),
        }
    }

    /// Set the authors and rebuild the completion candidates.
    pub fn with_authors(mut self, authors: Vec<String>) -> Self {
        self.authors = authors;
        self.suggest = build_suggest(&self.title, &self.authors);
        self
    }

    /// Set the body text and its section starts.
    pub fn with_content(mut self, full_text: impl Into<String>, chapters: Vec<ChapterSpan>) -> Self {
        self.full_text = full_text.into();
        self.chapters = chapters;
        self
    }

    /// Title of the section containing the given character offset.
    pub fn chapter_at(&self, offset: usize) -> Option<&str> {
        let idx = self.chapters.partition_point(|c| c.offset <= offset);
        if idx == 0 {
            return None;
        }
        Some(self.chapters[idx - 1].title.as_str())
    }
}

/// Build completion candidates from a title and its authors.
///
/// Each non-empty string becomes its own candidate; repeats are dropped.
pub fn build_suggest(title: &str, authors: &[String]) -> Vec<SuggestInput> {
    let mut suggest: Vec<SuggestInput> = Vec::with_capacity(authors.len() + 1);
    let candidates = std::iter::once((title, TITLE_SUGGEST_WEIGHT))
        .chain(authors.iter().map(|a| (a.as_str(), AUTHOR_SUGGEST_WEIGHT)));

    for (input, weight) in candidates {
        let input = input.trim();
        if input.is_empty() || suggest.iter().any(|s| s.input == input) {
            continue;
        }
        suggest.push(SuggestInput {
            input: input.to_string(),
            weight,
        });
    }

    suggest
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_suggest_from_title_and_authors() {
        let book = BookRecord::new("b1", "Moby Dick")
            .with_authors(vec!["Herman Melville".to_string(), "".to_string()]);

        assert_eq!(
            book.suggest,
            vec![
                SuggestInput {
                    input: "Moby Dick".to_string(),
                    weight: TITLE_SUGGEST_WEIGHT
                },
                SuggestInput {
                    input: "Herman Melville".to_string(),
                    weight: AUTHOR_SUGGEST_WEIGHT
                },
            ]
        );
    }

    #[test]
    fn test_suggest_skips_duplicates() {
        let suggest = build_suggest("Anonymous", &["Anonymous".to_string()]);
        assert_eq!(suggest.len(), 1);
        assert_eq!(suggest[0].weight, TITLE_SUGGEST_WEIGHT);
    }

    #[test]
    fn test_chapter_at() {
        let book = BookRecord::new("b1", "T").with_content(
            "x".repeat(50),
            vec![
                ChapterSpan {
                    title: "One".to_string(),
                    offset: 0,
                },
                ChapterSpan {
                    title: "Two".to_string(),
                    offset: 20,
                },
            ],
        );

        assert_eq!(book.chapter_at(0), Some("One"));
        assert_eq!(book.chapter_at(19), Some("One"));
        assert_eq!(book.chapter_at(20), Some("Two"));
        assert_eq!(book.chapter_at(49), Some("Two"));
    }

    #[test]
    fn test_chapter_at_without_chapters() {
        let book = BookRecord::new("b1", "T");
        assert!(book.chapter_at(3).is_none());
    }
}
