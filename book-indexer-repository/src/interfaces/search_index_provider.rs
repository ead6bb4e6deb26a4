//! The search engine seam used by index administration and the bulk loader.

use async_trait::async_trait;
use serde_json::Value;

use crate::errors::SearchIndexError;
use crate::types::BatchOperationSummary;
use book_indexer_shared::BulkOperation;

/// Index lifecycle and bulk writes against one search cluster.
///
/// `SearchIndexClient` owns a boxed provider; tests substitute an in-memory
/// engine. Transport failures are reported as `TransportError` so callers
/// can tell them apart from refusals.
#[async_trait]
pub trait SearchIndexProvider: Send + Sync {
    /// Check whether an index exists.
    ///
    /// # Arguments
    ///
    /// * `index` - The index name
    ///
    /// # Returns
    ///
    /// * `Ok(true)` - If the index exists
    /// * `Ok(false)` - If it does not
    /// * `Err(SearchIndexError)` - If the check fails
    async fn index_exists(&self, index: &str) -> Result<bool, SearchIndexError>;

    /// Create an index from a settings-and-mappings body.
    ///
    /// # Arguments
    ///
    /// * `index` - The index name
    /// * `body` - The mapping definition sent as the create request body
    ///
    /// # Returns
    ///
    /// * `Ok(())` - If the index was created
    /// * `Err(SearchIndexError)` - If creation fails (including when the index already exists)
    async fn create_index(&self, index: &str, body: &Value) -> Result<(), SearchIndexError>;

    /// Delete an index and every document in it.
    ///
    /// A missing index is not an error.
    async fn delete_index(&self, index: &str) -> Result<(), SearchIndexError>;

    /// Fetch the `mappings` object of an index.
    ///
    /// # Returns
    ///
    /// * `Ok(Some(mappings))` - The index mappings
    /// * `Ok(None)` - If the index does not exist
    /// * `Err(SearchIndexError)` - If the request fails
    async fn get_mapping(&self, index: &str) -> Result<Option<Value>, SearchIndexError>;

    /// Index multiple documents in one bulk request and return a per-document summary.
    ///
    /// Documents with an existing id are replaced. Individual rejections are
    /// reported in the summary and do not make the call fail.
    ///
    /// # Arguments
    ///
    /// * `operations` - The index actions to submit, each carrying its target index and id
    ///
    /// # Returns
    ///
    /// * `Ok(BatchOperationSummary)` - Contains aggregate statistics and individual results
    /// * `Err(SearchIndexError)` - If the bulk request fails entirely
    async fn bulk_index(
        &self,
        operations: &[BulkOperation],
    ) -> Result<BatchOperationSummary, SearchIndexError>;

    /// Check if the search engine is healthy and reachable.
    ///
    /// # Returns
    ///
    /// * `Ok(true)` - If the cluster status is green or yellow
    /// * `Ok(false)` - If the cluster is red
    /// * `Err(SearchIndexError)` - If the health check fails to execute
    async fn health_check(&self) -> Result<bool, SearchIndexError>;
}
