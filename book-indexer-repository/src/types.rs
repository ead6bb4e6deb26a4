//! Request and response types for search index operations.

/// Result of a batch operation for a single item.
///
/// This struct represents the outcome of one document within a bulk request.
/// It indicates whether the operation succeeded and includes the engine's
/// status code and reason if it failed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchOperationResult {
    /// Target index.
    pub index: String,
    /// Document id.
    pub id: String,
    /// HTTP-style status reported for the item.
    pub status: u16,
    /// Whether the operation succeeded.
    pub success: bool,
    /// Rejection reason if the operation failed.
    pub error: Option<String>,
}

impl BatchOperationResult {
    pub fn succeeded(index: impl Into<String>, id: impl Into<String>, status: u16) -> Self {
        Self {
            index: index.into(),
            id: id.into(),
            status,
            success: true,
            error: None,
        }
    }

    pub fn failed(
        index: impl Into<String>,
        id: impl Into<String>,
        status: u16,
        reason: impl Into<String>,
    ) -> Self {
        Self {
            index: index.into(),
            id: id.into(),
            status,
            success: false,
            error: Some(reason.into()),
        }
    }
}

/// Summary of a batch operation containing aggregate statistics and individual results.
///
/// This struct provides a complete overview of a bulk operation, including the total
/// number of items processed, how many succeeded and failed, and detailed results for
/// each individual item. This allows callers to handle partial failures gracefully.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BatchOperationSummary {
    /// Total number of items in the batch.
    pub total: usize,
    /// Number of successful operations.
    pub succeeded: usize,
    /// Number of failed operations.
    pub failed: usize,
    /// Individual results for each item.
    pub results: Vec<BatchOperationResult>,
}

impl BatchOperationSummary {
    /// Summary of an empty batch.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Build a summary by counting the given results.
    pub fn from_results(results: Vec<BatchOperationResult>) -> Self {
        let succeeded = results.iter().filter(|r| r.success).count();
        Self {
            total: results.len(),
            succeeded,
            failed: results.len() - succeeded,
            results,
        }
    }

    /// Iterate over the failed items.
    pub fn failures(&self) -> impl Iterator<Item = &BatchOperationResult> {
        self.results.iter().filter(|r| !r.success)
    }
}
