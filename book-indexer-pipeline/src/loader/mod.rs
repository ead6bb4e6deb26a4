//! Loader module for the book indexer pipeline.
//!
//! Streams bulk operations into the search index. Operations arrive on a
//! bounded channel (or any stream), are grouped into batches bounded by
//! document count and request size, and sent with a bounded number of
//! requests in flight.

use std::sync::Arc;
use std::time::Duration;

use futures::stream::{self, Stream, StreamExt};
use serde::Serialize;
use tokio::sync::{mpsc, Semaphore};
use tokio::task::{JoinError, JoinSet};
use tokio_stream::wrappers::ReceiverStream;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use crate::errors::PipelineError;
use book_indexer_repository::{
    BatchOperationResult, BatchOperationSummary, SearchIndexClient, SearchIndexError,
};
use book_indexer_shared::BulkOperation;

/// Configuration for the search loader.
#[derive(Debug, Clone)]
pub struct LoaderConfig {
    /// Maximum documents per bulk request.
    pub batch_size: usize,
    /// Maximum NDJSON bytes per bulk request.
    pub max_batch_bytes: usize,
    /// Bulk requests in flight at once.
    pub max_in_flight: usize,
    /// Maximum number of retry attempts for failed bulk requests.
    pub max_retries: u32,
    /// Initial retry delay in milliseconds.
    pub initial_retry_delay_ms: u64,
    /// Maximum retry delay in milliseconds.
    pub max_retry_delay_ms: u64,
    /// Rejected documents kept as samples in the summary.
    pub failure_sample_limit: usize,
}

impl Default for LoaderConfig {
    fn default() -> Self {
        Self {
            batch_size: 500,
            max_batch_bytes: 5 * 1024 * 1024,
            max_in_flight: 2,
            max_retries: 3,
            initial_retry_delay_ms: 200,
            max_retry_delay_ms: 5000,
            failure_sample_limit: 10,
        }
    }
}

/// A document the search engine did not accept.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DocumentFailure {
    pub index: String,
    pub id: String,
    pub status: u16,
    pub reason: String,
}

impl From<&BatchOperationResult> for DocumentFailure {
    fn from(result: &BatchOperationResult) -> Self {
        Self {
            index: result.index.clone(),
            id: result.id.clone(),
            status: result.status,
            reason: result.error.clone().unwrap_or_default(),
        }
    }
}

/// Aggregate outcome of a load.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct LoadSummary {
    pub submitted: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub batches: usize,
    pub failure_samples: Vec<DocumentFailure>,
    /// Set when cancellation stopped the load before the input was drained.
    pub cancelled: bool,
}

impl LoadSummary {
    fn record(&mut self, batch: &BatchOperationSummary, sample_limit: usize) {
        self.succeeded += batch.succeeded;
        self.failed += batch.failed;

        let room = sample_limit.saturating_sub(self.failure_samples.len());
        self.failure_samples.extend(
            batch
                .results
                .iter()
                .filter(|result| !result.success)
                .take(room)
                .map(DocumentFailure::from),
        );
    }
}

/// Loader that bulk-indexes documents into the search engine.
#[derive(Clone)]
pub struct SearchLoader {
    client: Arc<SearchIndexClient>,
    config: LoaderConfig,
}

impl SearchLoader {
    /// Create a new search loader with the given client.
    pub fn new(client: Arc<SearchIndexClient>) -> Self {
        Self::with_config(client, LoaderConfig::default())
    }

    /// Create a new search loader with custom configuration.
    pub fn with_config(client: Arc<SearchIndexClient>, mut config: LoaderConfig) -> Self {
        config.batch_size = config.batch_size.max(1);
        config.max_in_flight = config.max_in_flight.max(1);
        Self { client, config }
    }

    pub fn client(&self) -> &Arc<SearchIndexClient> {
        &self.client
    }

    pub fn config(&self) -> &LoaderConfig {
        &self.config
    }

    /// Drain a bounded channel until every sender is dropped.
    pub async fn load(
        &self,
        rx: mpsc::Receiver<BulkOperation>,
        cancel: CancellationToken,
    ) -> Result<LoadSummary, PipelineError> {
        self.load_stream(ReceiverStream::new(rx), cancel).await
    }

    /// Load operations already in memory.
    pub async fn load_all(
        &self,
        operations: Vec<BulkOperation>,
        cancel: CancellationToken,
    ) -> Result<LoadSummary, PipelineError> {
        self.load_stream(stream::iter(operations), cancel).await
    }

    /// Load every operation of `operations`.
    ///
    /// Per-document rejections are counted, never fatal. A transport failure
    /// that survives all retries aborts the load. Cancellation is checked
    /// before each batch is formed; batches already sent are awaited.
    #[instrument(skip_all, fields(batch_size = self.config.batch_size, max_in_flight = self.config.max_in_flight))]
    pub async fn load_stream<S>(
        &self,
        mut operations: S,
        cancel: CancellationToken,
    ) -> Result<LoadSummary, PipelineError>
    where
        S: Stream<Item = BulkOperation> + Unpin,
    {
        let permits = Arc::new(Semaphore::new(self.config.max_in_flight));
        let mut in_flight: JoinSet<Result<BatchOperationSummary, PipelineError>> = JoinSet::new();
        let mut carry = None;
        let mut summary = LoadSummary::default();

        loop {
            if cancel.is_cancelled() {
                info!("Load cancelled, no further batches will be sent");
                summary.cancelled = true;
                break;
            }

            let Some(batch) = next_batch(&mut operations, &mut carry, &self.config).await else {
                break;
            };

            let permit = permits
                .clone()
                .acquire_owned()
                .await
                .map_err(|e| PipelineError::TaskError(e.to_string()))?;
            if cancel.is_cancelled() {
                info!(held = batch.len(), "Load cancelled while waiting for a send slot");
                summary.cancelled = true;
                break;
            }
            while let Some(joined) = in_flight.try_join_next() {
                self.absorb(&mut summary, joined)?;
            }

            summary.batches += 1;
            summary.submitted += batch.len();
            debug!(batch = summary.batches, documents = batch.len(), "Sending bulk request");

            let client = self.client.clone();
            let config = self.config.clone();
            in_flight.spawn(async move {
                let _permit = permit;
                send_with_retry(&client, &config, batch).await
            });
        }

        while let Some(joined) = in_flight.join_next().await {
            self.absorb(&mut summary, joined)?;
        }

        info!(
            submitted = summary.submitted,
            succeeded = summary.succeeded,
            failed = summary.failed,
            batches = summary.batches,
            "Load finished"
        );
        Ok(summary)
    }

    fn absorb(
        &self,
        summary: &mut LoadSummary,
        joined: Result<Result<BatchOperationSummary, PipelineError>, JoinError>,
    ) -> Result<(), PipelineError> {
        let batch = joined.map_err(|e| PipelineError::TaskError(e.to_string()))??;
        summary.record(&batch, self.config.failure_sample_limit);
        Ok(())
    }
}

/// Next batch bounded by count and bytes. An operation that does not fit is
/// held in `carry` for the following batch; a single oversized operation
/// still forms a batch of its own.
async fn next_batch<S>(
    operations: &mut S,
    carry: &mut Option<BulkOperation>,
    config: &LoaderConfig,
) -> Option<Vec<BulkOperation>>
where
    S: Stream<Item = BulkOperation> + Unpin,
{
    let mut batch = Vec::new();
    let mut bytes = 0;

    loop {
        let op = match carry.take() {
            Some(op) => op,
            None => match operations.next().await {
                Some(op) => op,
                None => break,
            },
        };

        let len = op.ndjson_len();
        if !batch.is_empty() && bytes + len > config.max_batch_bytes {
            *carry = Some(op);
            break;
        }
        bytes += len;
        batch.push(op);
        if batch.len() >= config.batch_size {
            break;
        }
    }

    (!batch.is_empty()).then_some(batch)
}

/// Send one bulk request with exponential backoff on transient failures.
async fn send_with_retry(
    client: &SearchIndexClient,
    config: &LoaderConfig,
    batch: Vec<BulkOperation>,
) -> Result<BatchOperationSummary, PipelineError> {
    let mut delay_ms = config.initial_retry_delay_ms;
    let mut last_error = String::new();
    let mut last_status = None;

    for attempt in 0..=config.max_retries {
        match client.bulk(&batch).await {
            Ok(result) => {
                if attempt > 0 {
                    info!(
                        attempt = attempt,
                        count = batch.len(),
                        "Bulk request succeeded after retry"
                    );
                }
                if result.failed > 0 {
                    warn!(
                        failed = result.failed,
                        total = result.total,
                        "Bulk request had rejected documents"
                    );
                }
                return Ok(result);
            }
            Err(e) if e.is_retryable() => {
                last_status = match &e {
                    SearchIndexError::RequestError { status, .. } => Some(*status),
                    _ => None,
                };
                last_error = e.to_string();
                if attempt < config.max_retries {
                    warn!(
                        attempt = attempt + 1,
                        max_retries = config.max_retries,
                        delay_ms = delay_ms,
                        error = %last_error,
                        "Bulk request failed, retrying"
                    );
                    tokio::time::sleep(Duration::from_millis(delay_ms)).await;
                    delay_ms = std::cmp::min(delay_ms * 2, config.max_retry_delay_ms);
                }
            }
            Err(SearchIndexError::RequestError { status, reason }) => {
                warn!(
                    status = status,
                    count = batch.len(),
                    reason = %reason,
                    "Bulk request rejected, counting its documents as failed"
                );
                return Ok(reject_all(&batch, status, &reason));
            }
            Err(e) => return Err(e.into()),
        }
    }

    let attempts = config.max_retries + 1;
    Err(PipelineError::loader_transport(match last_status {
        Some(status) => format!(
            "search target answered {} on all {} attempts, it is throttling or unavailable: {}",
            status, attempts, last_error
        ),
        None => format!("bulk request failed after {} attempts: {}", attempts, last_error),
    }))
}

fn reject_all(batch: &[BulkOperation], status: u16, reason: &str) -> BatchOperationSummary {
    BatchOperationSummary::from_results(
        batch
            .iter()
            .map(|op| BatchOperationResult::failed(&op.index, &op.id, status, reason))
            .collect(),
    )
}
