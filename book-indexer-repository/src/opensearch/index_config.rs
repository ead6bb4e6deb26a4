//! OpenSearch index configuration and mappings.
//!
//! This module defines the index settings and mappings for the `books` and
//! `book_content` indices.

use std::path::Path;

use serde_json::{json, Value};

use crate::errors::SearchIndexError;

/// Default name of the book metadata index.
pub const BOOKS_INDEX: &str = "books";

/// Default name of the chunk index.
pub const BOOK_CONTENT_INDEX: &str = "book_content";

/// Vector field of the chunk index.
pub const TEXT_VECTOR_FIELD: &str = "text_vector";

/// Query-time field boosts for book search, recorded in the mapping `_meta`.
pub const BOOK_SEARCH_FIELDS: [&str; 3] = ["title^3", "authors^2", "description"];

/// A named index together with the body used to create it.
#[derive(Debug, Clone, PartialEq)]
pub struct IndexDefinition {
    pub name: String,
    pub body: Value,
}

impl IndexDefinition {
    pub fn new(name: impl Into<String>, body: Value) -> Self {
        Self {
            name: name.into(),
            body,
        }
    }

    /// The built-in `books` definition under the given name.
    pub fn books(name: impl Into<String>) -> Self {
        Self::new(name, books_index_settings())
    }

    /// The built-in `book_content` definition with a vector field of `dimension`.
    pub fn book_content(name: impl Into<String>, dimension: usize) -> Self {
        Self::new(name, book_content_index_settings(dimension))
    }

    /// Load a definition body from a JSON file.
    ///
    /// # Returns
    ///
    /// * `Ok(IndexDefinition)` - If the file holds a JSON object with a `mappings` key
    /// * `Err(SearchIndexError::ValidationError)` - If the file is unreadable or malformed
    pub fn from_file(name: impl Into<String>, path: &Path) -> Result<Self, SearchIndexError> {
        let raw = std::fs::read_to_string(path).map_err(|e| {
            SearchIndexError::validation(format!("Cannot read {}: {}", path.display(), e))
        })?;
        let body: Value = serde_json::from_str(&raw).map_err(|e| {
            SearchIndexError::validation(format!("Invalid JSON in {}: {}", path.display(), e))
        })?;

        if !body.get("mappings").is_some_and(Value::is_object) {
            return Err(SearchIndexError::validation(format!(
                "{} has no mappings object",
                path.display()
            )));
        }

        Ok(Self::new(name, body))
    }

    /// Dimension declared for a vector field, if any.
    pub fn vector_dimension(&self, field: &str) -> Option<usize> {
        mapped_vector_dimension(&self.body["mappings"], field)
    }
}

/// Read `properties.<field>.dimension` from a `mappings` object.
pub(crate) fn mapped_vector_dimension(mappings: &Value, field: &str) -> Option<usize> {
    mappings["properties"][field]["dimension"]
        .as_u64()
        .and_then(|d| usize::try_from(d).ok())
}

/// Get the index settings and mappings for the `books` index.
///
/// The configuration includes:
/// - **text with keyword sub-fields**: full-text on title and authors, exact values for sorting
/// - **completion**: prefix autocomplete over title and author candidates
/// - **keyword fields**: for genre filters and exact ID lookups
pub fn books_index_settings() -> Value {
    json!({
        "settings": {
            "number_of_shards": 1,
            "number_of_replicas": 0
        },
        "mappings": {
            "_meta": {
                "search_fields": BOOK_SEARCH_FIELDS
            },
            "properties": {
                "book_id": {
                    "type": "keyword"
                },
                "source_uid": {
                    "type": "keyword"
                },
                "title": {
                    "type": "text",
                    "fields": {
                        "raw": {
                            "type": "keyword"
                        }
                    }
                },
                "authors": {
                    "type": "text",
                    "fields": {
                        "raw": {
                            "type": "keyword"
                        }
                    }
                },
                "genres": {
                    "type": "keyword"
                },
                "description": {
                    "type": "text"
                },
                "publisher": {
                    "type": "keyword"
                },
                "language": {
                    "type": "keyword"
                },
                "link_to_book": {
                    "type": "keyword",
                    "index": false
                },
                "suggest": {
                    "type": "completion"
                }
            }
        }
    })
}

/// Get the index settings and mappings for the `book_content` index.
///
/// `text` stores offsets so highlighting does not need to re-analyze; the
/// vector field uses an HNSW graph with cosine similarity.
pub fn book_content_index_settings(dimension: usize) -> Value {
    json!({
        "settings": {
            "number_of_shards": 1,
            "number_of_replicas": 0,
            "index": {
                "knn": true
            }
        },
        "mappings": {
            "properties": {
                "book_id": {
                    "type": "keyword"
                },
                "chunk_id": {
                    "type": "keyword"
                },
                "chunk_index": {
                    "type": "integer"
                },
                "chapter": {
                    "type": "text"
                },
                "text": {
                    "type": "text",
                    "index_options": "offsets"
                },
                TEXT_VECTOR_FIELD: {
                    "type": "knn_vector",
                    "dimension": dimension,
                    "method": {
                        "name": "hnsw",
                        "space_type": "cosinesimil",
                        "engine": "lucene"
                    }
                }
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_books_settings_structure() {
        let settings = books_index_settings();
        let properties = &settings["mappings"]["properties"];

        assert!(settings["settings"]["number_of_shards"].is_number());
        assert_eq!(properties["title"]["type"], "text");
        assert_eq!(properties["authors"]["type"], "text");
        assert_eq!(properties["genres"]["type"], "keyword");
        assert_eq!(properties["description"]["type"], "text");
        assert_eq!(properties["suggest"]["type"], "completion");
        assert_eq!(settings["mappings"]["_meta"]["search_fields"][0], "title^3");
    }

    #[test]
    fn test_book_content_settings_structure() {
        let settings = book_content_index_settings(384);
        let properties = &settings["mappings"]["properties"];

        assert_eq!(settings["settings"]["index"]["knn"], true);
        assert_eq!(properties["book_id"]["type"], "keyword");
        assert_eq!(properties["chunk_index"]["type"], "integer");
        assert_eq!(properties["text"]["index_options"], "offsets");
        assert_eq!(properties["text_vector"]["type"], "knn_vector");
        assert_eq!(properties["text_vector"]["dimension"], 384);
    }

    #[test]
    fn test_vector_dimension() {
        let def = IndexDefinition::book_content(BOOK_CONTENT_INDEX, 768);
        assert_eq!(def.vector_dimension(TEXT_VECTOR_FIELD), Some(768));
        assert_eq!(IndexDefinition::books(BOOKS_INDEX).vector_dimension(TEXT_VECTOR_FIELD), None);
    }

    #[test]
    fn test_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{"mappings": {{"properties": {{"title": {{"type": "text"}}}}}}}}"#).unwrap();

        let def = IndexDefinition::from_file("books", file.path()).unwrap();
        assert_eq!(def.name, "books");
        assert_eq!(def.body["mappings"]["properties"]["title"]["type"], "text");
    }

    #[test]
    fn test_from_file_without_mappings() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{"settings": {{}}}}"#).unwrap();

        let result = IndexDefinition::from_file("books", file.path());
        assert!(matches!(result, Err(SearchIndexError::ValidationError(_))));
    }
}
