//! Metadata normalization, fallbacks and identifier derivation.

use std::collections::HashMap;
use std::sync::LazyLock;

use regex::Regex;
use sha2::{Digest, Sha256};

use super::html::{normalize_whitespace, strip_markup, Section};

const DESCRIPTION_SECTIONS: usize = 3;
const DESCRIPTION_PARAGRAPHS: usize = 3;
const DESCRIPTION_MAX_CHARS: usize = 2000;
const BYLINE_PARAGRAPHS: usize = 10;
const PUBLISHER_PARAGRAPHS: usize = 20;
const IMPRINT_SECTIONS: usize = 5;
const IMPRINT_PARAGRAPHS: usize = 50;
const IMPRINT: &str = "Standard Ebooks";
const MAX_SLUG_WORDS: usize = 4;

static BYLINE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b[Bb]y\s+([^\n,]+)").expect("byline pattern is valid"));
static PUBLISHER_LINE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[Pp]ublisher:?\s*([^\n]+)").expect("publisher pattern is valid"));

/// Package metadata keyed by Dublin Core element name.
pub(crate) type Metadata = HashMap<String, Vec<String>>;

/// Normalized, non-empty, de-duplicated values of `key` in document order.
pub(crate) fn values(metadata: &Metadata, key: &str) -> Vec<String> {
    let mut seen = Vec::new();
    for value in metadata.get(key).into_iter().flatten() {
        let value = normalize_whitespace(value);
        if !value.is_empty() && !seen.contains(&value) {
            seen.push(value);
        }
    }
    seen
}

pub(crate) fn first(metadata: &Metadata, key: &str) -> Option<String> {
    values(metadata, key).into_iter().next()
}

/// Descriptions often carry XHTML; keep the text only.
pub(crate) fn description(metadata: &Metadata) -> String {
    metadata
        .get("description")
        .into_iter()
        .flatten()
        .map(|value| strip_markup(value))
        .find(|value| !value.is_empty())
        .unwrap_or_default()
}

/// The package's unique identifier, else its first identifier, else a hash
/// of the raw bytes.
pub(crate) fn source_uid(
    unique_identifier: Option<&str>,
    metadata: &Metadata,
    bytes: &[u8],
) -> String {
    unique_identifier
        .map(normalize_whitespace)
        .filter(|uid| !uid.is_empty())
        .or_else(|| first(metadata, "identifier"))
        .unwrap_or_else(|| hex::encode(Sha256::digest(bytes)))
}

/// First 16 hex characters of SHA-256 over the source identifier.
pub fn derive_book_id(source_uid: &str) -> String {
    let digest = hex::encode(Sha256::digest(source_uid.as_bytes()));
    digest[..16].to_string()
}

/// Opening paragraphs of the first sections, cut to a bounded length.
pub(crate) fn description_from_text(sections: &[Section]) -> String {
    let paragraphs: Vec<&str> = sections
        .iter()
        .take(DESCRIPTION_SECTIONS)
        .flat_map(|section| section.paragraphs.iter().take(DESCRIPTION_PARAGRAPHS))
        .map(String::as_str)
        .collect();

    paragraphs
        .join("\n\n")
        .trim()
        .chars()
        .take(DESCRIPTION_MAX_CHARS)
        .collect()
}

/// A "By <name>" line near the start of the first section.
pub(crate) fn author_from_text(sections: &[Section]) -> Option<String> {
    let head = leading_text(sections.first()?, BYLINE_PARAGRAPHS);
    BYLINE
        .captures(&head)
        .map(|caps| caps[1].trim().to_string())
        .filter(|name| !name.is_empty())
}

/// Title-cased author slug from a file stem such as `jane-austen_emma`.
pub(crate) fn author_from_stem(stem: &str) -> Option<String> {
    let slug = stem.split('_').next().unwrap_or_default().replace('-', " ");
    let words: Vec<&str> = slug.split_whitespace().collect();
    if words.is_empty() || words.len() > MAX_SLUG_WORDS {
        return None;
    }
    Some(words.iter().map(|word| title_case(word)).collect::<Vec<_>>().join(" "))
}

/// A "Publisher: <name>" line near the start, else the imprint when the
/// early text mentions it.
pub(crate) fn publisher_from_text(sections: &[Section]) -> Option<String> {
    let first = sections.first()?;
    let head = leading_text(first, PUBLISHER_PARAGRAPHS);
    if let Some(caps) = PUBLISHER_LINE.captures(&head) {
        let name = caps[1].trim();
        if !name.is_empty() {
            return Some(name.to_string());
        }
    }

    let mentions_imprint = sections
        .iter()
        .take(IMPRINT_SECTIONS)
        .flat_map(|section| section.paragraphs.iter().take(IMPRINT_PARAGRAPHS))
        .any(|paragraph| paragraph.contains(IMPRINT));
    mentions_imprint.then(|| IMPRINT.to_string())
}

fn leading_text(section: &Section, paragraphs: usize) -> String {
    section
        .paragraphs
        .iter()
        .take(paragraphs)
        .map(String::as_str)
        .collect::<Vec<_>>()
        .join("\n")
}

fn title_case(word: &str) -> String {
    let mut chars = word.chars();
    match chars.next() {
        Some(head) => head
            .to_uppercase()
            .chain(chars.flat_map(char::to_lowercase))
            .collect(),
        None => String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn section(paragraphs: &[&str]) -> Section {
        Section {
            heading: "h".to_string(),
            paragraphs: paragraphs.iter().map(|p| p.to_string()).collect(),
        }
    }

    #[test]
    fn test_values_are_normalized_and_deduplicated() {
        let mut metadata = Metadata::new();
        metadata.insert(
            "creator".to_string(),
            vec![
                " Jane  Austen ".to_string(),
                "".to_string(),
                "Jane Austen".to_string(),
                "Anonymous".to_string(),
            ],
        );

        assert_eq!(values(&metadata, "creator"), vec!["Jane Austen", "Anonymous"]);
        assert_eq!(first(&metadata, "creator").as_deref(), Some("Jane Austen"));
        assert!(values(&metadata, "subject").is_empty());
    }

    #[test]
    fn test_source_uid_precedence() {
        let mut metadata = Metadata::new();
        metadata.insert("identifier".to_string(), vec!["urn:isbn:123".to_string()]);

        assert_eq!(source_uid(Some("urn:uuid:abc"), &metadata, b"x"), "urn:uuid:abc");
        assert_eq!(source_uid(Some("  "), &metadata, b"x"), "urn:isbn:123");

        let hashed = source_uid(None, &Metadata::new(), b"raw bytes");
        assert_eq!(hashed.len(), 64);
        assert_eq!(hashed, source_uid(None, &Metadata::new(), b"raw bytes"));
    }

    #[test]
    fn test_book_id_is_stable() {
        let id = derive_book_id("urn:uuid:abc");
        assert_eq!(id.len(), 16);
        assert_eq!(id, derive_book_id("urn:uuid:abc"));
        assert_ne!(id, derive_book_id("urn:uuid:abd"));
    }

    #[test]
    fn test_description_from_text() {
        let sections = vec![
            section(&["a1", "a2", "a3", "a4"]),
            section(&["b1"]),
            section(&["c1", "c2"]),
            section(&["d1"]),
        ];
        assert_eq!(
            description_from_text(&sections),
            "a1\n\na2\n\na3\n\nb1\n\nc1\n\nc2"
        );

        let long = vec![section(&[&"x".repeat(3000)])];
        assert_eq!(description_from_text(&long).chars().count(), 2000);
    }

    #[test]
    fn test_author_from_text() {
        let sections = vec![section(&["The Title", "By Mary Shelley, with notes"])];
        assert_eq!(author_from_text(&sections).as_deref(), Some("Mary Shelley"));
        assert_eq!(author_from_text(&[section(&["No credit"])]), None);
    }

    #[test]
    fn test_author_from_stem() {
        assert_eq!(
            author_from_stem("jane-austen_pride-and-prejudice").as_deref(),
            Some("Jane Austen")
        );
        assert_eq!(author_from_stem("a-b-c-d-e_title"), None);
        assert_eq!(author_from_stem(""), None);
    }

    #[test]
    fn test_publisher_from_text() {
        let explicit = vec![section(&["Publisher: Penguin Classics"])];
        assert_eq!(
            publisher_from_text(&explicit).as_deref(),
            Some("Penguin Classics")
        );

        let imprint = vec![
            section(&["Cover"]),
            section(&["This ebook is the product of Standard Ebooks volunteers."]),
        ];
        assert_eq!(publisher_from_text(&imprint).as_deref(), Some(IMPRINT));

        assert_eq!(publisher_from_text(&[section(&["Nothing here"])]), None);
    }
}
