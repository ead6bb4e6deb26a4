//! Object storage trait definition.

use async_trait::async_trait;
use serde_json::Value;

use crate::errors::StorageError;

/// A single bucket of named objects.
///
/// The pipeline only reads raw objects by name and writes JSON objects by
/// name; bucket lifecycle and credentials belong to deployment configuration.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// List object names starting with `prefix` and ending with `suffix`
    /// (case-insensitive), sorted.
    async fn list(&self, prefix: &str, suffix: &str) -> Result<Vec<String>, StorageError>;

    /// Read one object.
    async fn get(&self, name: &str) -> Result<Vec<u8>, StorageError>;

    /// Write one object, replacing any previous content.
    async fn put(&self, name: &str, body: &[u8]) -> Result<(), StorageError>;

    /// Write one value as pretty-printed JSON.
    async fn put_json(&self, name: &str, value: &Value) -> Result<(), StorageError> {
        let body = serde_json::to_vec_pretty(value)?;
        self.put(name, &body).await
    }

    /// Stable URI identifying an object, recorded as `link_to_book`.
    fn uri(&self, name: &str) -> String;
}
