//! OpenSearch client implementation.
//!
//! This module provides the concrete implementation of `SearchIndexProvider`
//! using the OpenSearch Rust client.

use async_trait::async_trait;
use opensearch::{
    cluster::ClusterHealthParts,
    http::request::JsonBody,
    http::response::Response,
    http::transport::{SingleNodeConnectionPool, TransportBuilder},
    indices::{IndicesCreateParts, IndicesDeleteParts, IndicesExistsParts, IndicesGetMappingParts},
    BulkParts, OpenSearch,
};
use serde_json::Value;
use tracing::{debug, error, info, instrument};
use url::Url;

use crate::config::SearchIndexConfig;
use crate::errors::SearchIndexError;
use crate::interfaces::SearchIndexProvider;
use crate::types::{BatchOperationResult, BatchOperationSummary};
use book_indexer_shared::BulkOperation;

/// OpenSearch client implementation.
///
/// Holds a single pooled transport; every request reuses its connections and
/// is bounded by the configured request timeout.
///
/// # Example
///
/// ```ignore
/// let client = OpenSearchClient::new("http://localhost:9200", &SearchIndexConfig::default())?;
/// let summary = client.bulk_index(&operations).await?;
/// println!("{} of {} documents failed", summary.failed, summary.total);
/// ```
pub struct OpenSearchClient {
    client: OpenSearch,
}

impl OpenSearchClient {
    /// Create a new OpenSearch client connected to the specified URL.
    ///
    /// # Arguments
    ///
    /// * `url` - The OpenSearch server URL (e.g., "http://localhost:9200")
    /// * `config` - Supplies the per-request timeout
    ///
    /// # Returns
    ///
    /// * `Ok(OpenSearchClient)` - A new client instance
    /// * `Err(SearchIndexError)` - If connection setup fails
    pub fn new(url: &str, config: &SearchIndexConfig) -> Result<Self, SearchIndexError> {
        let parsed_url = Url::parse(url).map_err(|e| SearchIndexError::transport(e.to_string()))?;

        let conn_pool = SingleNodeConnectionPool::new(parsed_url);
        let transport = TransportBuilder::new(conn_pool)
            .disable_proxy()
            .timeout(config.request_timeout)
            .build()
            .map_err(|e| SearchIndexError::transport(e.to_string()))?;

        let client = OpenSearch::new(transport);

        info!(
            url = %url,
            timeout_secs = config.request_timeout.as_secs(),
            "Created OpenSearch client"
        );

        Ok(Self { client })
    }

    /// Turn a non-success response into a `RequestError` carrying its body.
    async fn check_status(response: Response, action: &str) -> Result<Response, SearchIndexError> {
        let status = response.status_code();
        if status.is_success() {
            return Ok(response);
        }

        let body = response.text().await.unwrap_or_default();
        error!(status = %status, body = %body, action = action, "Request failed");
        Err(SearchIndexError::request(status.as_u16(), body))
    }
}

/// Match the `items` of a bulk response with the submitted operations.
///
/// Items come back in submission order; each one is keyed by its action name
/// (`index` here) and carries a `status` and, on rejection, an `error` object.
pub(crate) fn parse_bulk_response(
    operations: &[BulkOperation],
    body: &Value,
) -> Result<BatchOperationSummary, SearchIndexError> {
    let items = body
        .get("items")
        .and_then(Value::as_array)
        .ok_or_else(|| SearchIndexError::parse("Bulk response has no items array"))?;

    if items.len() != operations.len() {
        return Err(SearchIndexError::parse(format!(
            "Bulk response has {} items for {} operations",
            items.len(),
            operations.len()
        )));
    }

    let results = operations
        .iter()
        .zip(items)
        .map(|(op, item)| {
            let outcome = item
                .as_object()
                .and_then(|o| o.values().next())
                .cloned()
                .unwrap_or(Value::Null);
            let status = outcome["status"]
                .as_u64()
                .and_then(|s| u16::try_from(s).ok())
                .unwrap_or(0);

            match outcome.get("error") {
                Some(error) if !error.is_null() => {
                    let reason = match (error["type"].as_str(), error["reason"].as_str()) {
                        (Some(kind), Some(reason)) => format!("{}: {}", kind, reason),
                        (Some(kind), None) => kind.to_string(),
                        _ => error.to_string(),
                    };
                    BatchOperationResult::failed(&op.index, &op.id, status, reason)
                }
                _ => BatchOperationResult::succeeded(&op.index, &op.id, status),
            }
        })
        .collect();

    Ok(BatchOperationSummary::from_results(results))
}

#[async_trait]
impl SearchIndexProvider for OpenSearchClient {
    async fn index_exists(&self, index: &str) -> Result<bool, SearchIndexError> {
        let response = self
            .client
            .indices()
            .exists(IndicesExistsParts::Index(&[index]))
            .send()
            .await
            .map_err(|e| SearchIndexError::transport(e.to_string()))?;

        match response.status_code().as_u16() {
            200 => Ok(true),
            404 => Ok(false),
            status => Err(SearchIndexError::request(
                status,
                format!("Unexpected status checking index {}", index),
            )),
        }
    }

    #[instrument(skip(self, body))]
    async fn create_index(&self, index: &str, body: &Value) -> Result<(), SearchIndexError> {
        let response = self
            .client
            .indices()
            .create(IndicesCreateParts::Index(index))
            .body(body.clone())
            .send()
            .await
            .map_err(|e| SearchIndexError::transport(e.to_string()))?;

        let status = response.status_code();
        if !status.is_success() {
            let error_body = response.text().await.unwrap_or_default();
            error!(status = %status, body = %error_body, "Index creation failed");
            return Err(SearchIndexError::index_creation(format!(
                "Creating {} failed with status {}: {}",
                index, status, error_body
            )));
        }

        info!(index = %index, "Index created");
        Ok(())
    }

    #[instrument(skip(self))]
    async fn delete_index(&self, index: &str) -> Result<(), SearchIndexError> {
        let response = self
            .client
            .indices()
            .delete(IndicesDeleteParts::Index(&[index]))
            .send()
            .await
            .map_err(|e| SearchIndexError::transport(e.to_string()))?;

        // 404 is acceptable - index may not exist
        if response.status_code().as_u16() == 404 {
            debug!(index = %index, "Index did not exist");
            return Ok(());
        }

        Self::check_status(response, "delete_index").await?;
        debug!(index = %index, "Index deleted");
        Ok(())
    }

    async fn get_mapping(&self, index: &str) -> Result<Option<Value>, SearchIndexError> {
        let response = self
            .client
            .indices()
            .get_mapping(IndicesGetMappingParts::Index(&[index]))
            .send()
            .await
            .map_err(|e| SearchIndexError::transport(e.to_string()))?;

        if response.status_code().as_u16() == 404 {
            return Ok(None);
        }

        let response = Self::check_status(response, "get_mapping").await?;
        let body: Value = response
            .json()
            .await
            .map_err(|e| SearchIndexError::parse(e.to_string()))?;

        // The response is keyed by the concrete index name, which differs
        // from `index` when it is an alias.
        let mappings = body
            .as_object()
            .and_then(|indices| indices.values().next())
            .map(|entry| entry["mappings"].clone());

        Ok(mappings)
    }

    #[instrument(skip(self, operations), fields(count = operations.len()))]
    async fn bulk_index(
        &self,
        operations: &[BulkOperation],
    ) -> Result<BatchOperationSummary, SearchIndexError> {
        if operations.is_empty() {
            return Ok(BatchOperationSummary::empty());
        }

        let mut body: Vec<JsonBody<Value>> = Vec::with_capacity(operations.len() * 2);
        for op in operations {
            body.push(op.action_line().into());
            body.push(op.source.clone().into());
        }

        let response = self
            .client
            .bulk(BulkParts::None)
            .body(body)
            .send()
            .await
            .map_err(|e| SearchIndexError::transport(e.to_string()))?;

        let response = Self::check_status(response, "bulk").await?;
        let response_body: Value = response
            .json()
            .await
            .map_err(|e| SearchIndexError::parse(e.to_string()))?;

        let summary = parse_bulk_response(operations, &response_body)?;
        debug!(
            succeeded = summary.succeeded,
            failed = summary.failed,
            "Bulk request completed"
        );
        Ok(summary)
    }

    async fn health_check(&self) -> Result<bool, SearchIndexError> {
        let response = self
            .client
            .cluster()
            .health(ClusterHealthParts::None)
            .send()
            .await
            .map_err(|e| SearchIndexError::transport(e.to_string()))?;

        let response = Self::check_status(response, "health_check").await?;
        let body: Value = response
            .json()
            .await
            .map_err(|e| SearchIndexError::parse(e.to_string()))?;

        let status = body["status"].as_str().unwrap_or("red");
        debug!(status = %status, "Cluster health");
        Ok(matches!(status, "green" | "yellow"))
    }
}
