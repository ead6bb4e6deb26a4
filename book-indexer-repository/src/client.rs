//! Search index client implementation.
//!
//! This module provides the main client for interacting with the search index.
//! Application code uses this to manage index lifecycle and submit bulk writes.

use tracing::{info, warn};

use crate::config::SearchIndexConfig;
use crate::errors::SearchIndexError;
use crate::interfaces::SearchIndexProvider;
use crate::opensearch::{mapped_vector_dimension, IndexDefinition};
use crate::types::BatchOperationSummary;
use book_indexer_shared::BulkOperation;

/// The main client for interacting with the search index.
/// Application code uses this to create, drop and bulk-load indices.
pub struct SearchIndexClient {
    provider: Box<dyn SearchIndexProvider>,
    config: SearchIndexConfig,
}

impl SearchIndexClient {
    /// Create a new SearchIndexClient with default configuration.
    pub fn new(provider: Box<dyn SearchIndexProvider>) -> Self {
        Self {
            provider,
            config: SearchIndexConfig::default(),
        }
    }

    /// Create a new SearchIndexClient with custom configuration.
    pub fn with_config(provider: Box<dyn SearchIndexProvider>, config: SearchIndexConfig) -> Self {
        Self { provider, config }
    }

    /// Check if batch size exceeds the configured limit.
    fn validate_batch_size(&self, size: usize) -> Result<(), SearchIndexError> {
        if let Some(max) = self.config.max_batch_size {
            if size > max {
                return Err(SearchIndexError::batch_size_exceeded(size, max));
            }
        }
        Ok(())
    }

    /// Create an index from its definition.
    /// Input: IndexDefinition, drop_existing flag
    /// Output: Result<(), SearchIndexError>
    ///
    /// When the index already exists it is dropped first if `drop_existing`
    /// is set (destroying its documents), and left untouched otherwise.
    pub async fn recreate_index(
        &self,
        definition: &IndexDefinition,
        drop_existing: bool,
    ) -> Result<(), SearchIndexError> {
        if self.provider.index_exists(&definition.name).await? {
            if !drop_existing {
                info!(index = %definition.name, "Index already exists, keeping it");
                return Ok(());
            }
            warn!(index = %definition.name, "Dropping existing index and all its documents");
            self.provider.delete_index(&definition.name).await?;
        }

        self.provider
            .create_index(&definition.name, &definition.body)
            .await?;
        info!(index = %definition.name, "Created index");
        Ok(())
    }

    /// Create the index only if it does not exist yet.
    pub async fn ensure_index(&self, definition: &IndexDefinition) -> Result<(), SearchIndexError> {
        self.recreate_index(definition, false).await
    }

    /// Dimension of a vector field in a live index.
    /// Output: `None` when the index or the field's dimension is absent.
    pub async fn vector_dimension(
        &self,
        index: &str,
        field: &str,
    ) -> Result<Option<usize>, SearchIndexError> {
        let mappings = self.provider.get_mapping(index).await?;
        Ok(mappings.and_then(|m| mapped_vector_dimension(&m, field)))
    }

    /// Submit one bulk request.
    /// Input: slice of BulkOperation (index, id, source)
    /// Output: Result<BatchOperationSummary, SearchIndexError>
    ///
    /// Individual rejections are reported in the summary. The batch size is
    /// limited by the configured max_batch_size (default: 1000).
    pub async fn bulk(
        &self,
        operations: &[BulkOperation],
    ) -> Result<BatchOperationSummary, SearchIndexError> {
        if operations.is_empty() {
            return Ok(BatchOperationSummary::empty());
        }

        self.validate_batch_size(operations.len())?;

        for op in operations {
            if op.id.is_empty() {
                return Err(SearchIndexError::validation(
                    "All operations must have a document id",
                ));
            }
        }

        self.provider.bulk_index(operations).await
    }

    /// Check if the search engine is healthy.
    pub async fn health_check(&self) -> Result<bool, SearchIndexError> {
        self.provider.health_check().await
    }
}
