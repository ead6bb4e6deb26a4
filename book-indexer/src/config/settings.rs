//! Environment configuration for the book indexer.

use std::env;
use std::fmt::Display;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use book_indexer_pipeline::chunker::ChunkerConfig;
use book_indexer_pipeline::embedder::{EmbedderConfig, FailurePolicy};
use book_indexer_pipeline::loader::LoaderConfig;
use book_indexer_pipeline::orchestrator::OrchestratorConfig;
use book_indexer_pipeline::serializer::IndexNames;
use book_indexer_repository::{BOOKS_INDEX, BOOK_CONTENT_INDEX};

use crate::IndexingError;

/// Default OpenSearch URL.
const DEFAULT_OPENSEARCH_URL: &str = "http://localhost:9200";

/// Default embedding model name sent with every request.
const DEFAULT_EMBEDDING_MODEL: &str = "all-MiniLM-L6-v2";

/// Object storage layout.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StorageSettings {
    pub root: PathBuf,
    pub raw_bucket: String,
    pub parsed_bucket: String,
    pub index_bucket: String,
}

/// Embedding service connection and stage settings.
#[derive(Debug, Clone)]
pub struct EmbeddingSettings {
    /// Endpoint URL; embedding is disabled when unset.
    pub url: Option<String>,
    pub model: String,
    pub timeout: Duration,
    pub embedder: EmbedderConfig,
}

/// Everything the indexer reads from its environment.
#[derive(Debug, Clone)]
pub struct IndexerConfig {
    pub opensearch_url: String,
    pub request_timeout: Duration,
    pub indices: IndexNames,
    pub storage: StorageSettings,
    pub embedding: EmbeddingSettings,
    pub chunker: ChunkerConfig,
    pub loader: LoaderConfig,
    pub orchestrator: OrchestratorConfig,
}

impl IndexerConfig {
    /// Load configuration from environment variables.
    ///
    /// # Environment Variables
    ///
    /// - `OPENSEARCH_URL`: OpenSearch server URL (default: http://localhost:9200)
    /// - `BOOKS_INDEX` / `CONTENT_INDEX`: index names (default: books / book_content)
    /// - `STORAGE_ROOT`: directory holding the buckets (default: ./data)
    /// - `RAW_BUCKET` / `PARSED_BUCKET` / `INDEX_BUCKET`: bucket names
    /// - `EMBEDDING_URL`: embedding endpoint; embedding is off when unset
    /// - `EMBEDDING_MODEL`, `EMBEDDING_DIMENSION`, `EMBEDDING_BATCH_SIZE`,
    ///   `EMBEDDING_CONCURRENCY`, `EMBEDDING_TIMEOUT_SECS`,
    ///   `EMBEDDING_FAILURE_POLICY` (fail|skip)
    /// - `CHUNK_SIZE`, `CHUNK_OVERLAP`: chunk bounds in characters
    /// - `BULK_BATCH_SIZE`, `BULK_MAX_BYTES`, `BULK_MAX_IN_FLIGHT`: loader bounds
    /// - `REQUEST_TIMEOUT_SECS`: search engine request timeout
    /// - `EXTRACT_CONCURRENCY`, `QUEUE_CAPACITY`: orchestrator bounds
    pub fn from_env() -> Result<Self, IndexingError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Load configuration through an arbitrary variable lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, IndexingError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |key: &str, default: &str| {
            lookup(key)
                .filter(|value| !value.trim().is_empty())
                .unwrap_or_else(|| default.to_string())
        };

        let embedder = EmbedderConfig {
            batch_size: parse(&lookup, "EMBEDDING_BATCH_SIZE", 32)?,
            dimension: parse(&lookup, "EMBEDDING_DIMENSION", 384)?,
            max_concurrency: parse(&lookup, "EMBEDDING_CONCURRENCY", 4)?,
            failure_policy: parse(&lookup, "EMBEDDING_FAILURE_POLICY", FailurePolicy::FailRun)?,
            ..EmbedderConfig::default()
        };

        let chunk_size: usize = parse(&lookup, "CHUNK_SIZE", 1000)?;
        let chunk_overlap: usize = parse(&lookup, "CHUNK_OVERLAP", 100)?;

        let loader = LoaderConfig {
            batch_size: parse(&lookup, "BULK_BATCH_SIZE", 500)?,
            max_batch_bytes: parse(&lookup, "BULK_MAX_BYTES", 5 * 1024 * 1024)?,
            max_in_flight: parse(&lookup, "BULK_MAX_IN_FLIGHT", 2)?,
            ..LoaderConfig::default()
        };
        if loader.batch_size == 0 {
            return Err(IndexingError::config("BULK_BATCH_SIZE must be greater than zero"));
        }

        Ok(Self {
            opensearch_url: var("OPENSEARCH_URL", DEFAULT_OPENSEARCH_URL),
            request_timeout: Duration::from_secs(parse(&lookup, "REQUEST_TIMEOUT_SECS", 60)?),
            indices: IndexNames::new(
                var("BOOKS_INDEX", BOOKS_INDEX),
                var("CONTENT_INDEX", BOOK_CONTENT_INDEX),
            ),
            storage: StorageSettings {
                root: PathBuf::from(var("STORAGE_ROOT", "./data")),
                raw_bucket: var("RAW_BUCKET", "raw"),
                parsed_bucket: var("PARSED_BUCKET", "parsed"),
                index_bucket: var("INDEX_BUCKET", "index"),
            },
            embedding: EmbeddingSettings {
                url: lookup("EMBEDDING_URL").filter(|url| !url.trim().is_empty()),
                model: var("EMBEDDING_MODEL", DEFAULT_EMBEDDING_MODEL),
                timeout: Duration::from_secs(parse(&lookup, "EMBEDDING_TIMEOUT_SECS", 30)?),
                embedder,
            },
            chunker: ChunkerConfig::new(chunk_size, chunk_overlap),
            loader,
            orchestrator: OrchestratorConfig {
                channel_buffer_size: parse(&lookup, "QUEUE_CAPACITY", 1000)?,
                extract_concurrency: parse(&lookup, "EXTRACT_CONCURRENCY", 4)?,
            },
        })
    }
}

fn parse<F, T>(lookup: &F, key: &str, default: T) -> Result<T, IndexingError>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
    T::Err: Display,
{
    match lookup(key).filter(|value| !value.trim().is_empty()) {
        Some(value) => value
            .trim()
            .parse()
            .map_err(|e| IndexingError::config(format!("Invalid value for {}: {}", key, e))),
        None => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config(vars: &[(&str, &str)]) -> Result<IndexerConfig, IndexingError> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        IndexerConfig::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn test_defaults() {
        let config = config(&[]).unwrap();

        assert_eq!(config.opensearch_url, "http://localhost:9200");
        assert_eq!(config.indices, IndexNames::default());
        assert_eq!(config.storage.raw_bucket, "raw");
        assert!(config.embedding.url.is_none());
        assert_eq!(config.embedding.embedder.dimension, 384);
        assert_eq!(config.chunker.max_chunk_size, 1000);
        assert_eq!(config.chunker.overlap, 100);
        assert_eq!(config.chunker.boundary_tolerance, 100);
        assert_eq!(config.loader.max_batch_bytes, 5 * 1024 * 1024);
        assert_eq!(config.request_timeout, Duration::from_secs(60));
    }

    #[test]
    fn test_overrides() {
        let config = config(&[
            ("OPENSEARCH_URL", "http://search:9200"),
            ("CONTENT_INDEX", "chunks"),
            ("EMBEDDING_URL", "http://embed:8080/v1/embeddings"),
            ("EMBEDDING_DIMENSION", "768"),
            ("EMBEDDING_FAILURE_POLICY", "skip"),
            ("CHUNK_SIZE", "500"),
            ("BULK_MAX_IN_FLIGHT", "4"),
        ])
        .unwrap();

        assert_eq!(config.opensearch_url, "http://search:9200");
        assert_eq!(config.indices.content, "chunks");
        assert_eq!(
            config.embedding.url.as_deref(),
            Some("http://embed:8080/v1/embeddings")
        );
        assert_eq!(config.embedding.embedder.dimension, 768);
        assert_eq!(
            config.embedding.embedder.failure_policy,
            FailurePolicy::SkipChunks
        );
        assert_eq!(config.chunker.max_chunk_size, 500);
        assert_eq!(config.loader.max_in_flight, 4);
    }

    #[test]
    fn test_invalid_values() {
        let err = config(&[("CHUNK_SIZE", "large")]).unwrap_err();
        assert!(err.to_string().contains("CHUNK_SIZE"));

        assert!(config(&[("EMBEDDING_FAILURE_POLICY", "retry")]).is_err());
        assert!(config(&[("BULK_BATCH_SIZE", "0")]).is_err());
    }
}
