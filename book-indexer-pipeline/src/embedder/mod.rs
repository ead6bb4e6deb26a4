//! Embedder module for the book indexer pipeline.
//!
//! Attaches a dense vector to every chunk. Texts are sent to the embedding
//! model in batches, with a bounded number of batches in flight and global
//! input order preserved.

mod model;
mod ndjson;

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use futures::stream::{self, StreamExt};
use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use crate::errors::{EmbeddingError, EmbeddingSchemaError, PipelineError};
use book_indexer_shared::ChunkRecord;

pub use model::{EmbeddingModel, HttpEmbeddingModel};
pub use ndjson::{embed_ndjson_file, NdjsonEmbedOptions, NdjsonEmbedReport};

/// What to do when a batch cannot be embedded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FailurePolicy {
    /// Abort the run.
    #[default]
    FailRun,
    /// Leave the batch without vectors and record its chunk ids.
    SkipChunks,
}

impl FromStr for FailurePolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "fail" | "fail_run" => Ok(Self::FailRun),
            "skip" | "skip_chunks" => Ok(Self::SkipChunks),
            other => Err(format!(
                "unknown embedding failure policy '{}', expected 'fail' or 'skip'",
                other
            )),
        }
    }
}

impl fmt::Display for FailurePolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::FailRun => write!(f, "fail"),
            Self::SkipChunks => write!(f, "skip"),
        }
    }
}

/// Configuration for the embedder.
#[derive(Debug, Clone)]
pub struct EmbedderConfig {
    /// Texts per model call.
    pub batch_size: usize,
    /// Expected vector length.
    pub dimension: usize,
    /// Model calls in flight at once.
    pub max_concurrency: usize,
    /// Maximum number of retry attempts for transient failures.
    pub max_retries: u32,
    /// Initial retry delay in milliseconds.
    pub initial_retry_delay_ms: u64,
    /// Maximum retry delay in milliseconds.
    pub max_retry_delay_ms: u64,
    pub failure_policy: FailurePolicy,
}

impl Default for EmbedderConfig {
    fn default() -> Self {
        Self {
            batch_size: 32,
            dimension: 384,
            max_concurrency: 4,
            max_retries: 3,
            initial_retry_delay_ms: 200,
            max_retry_delay_ms: 5000,
            failure_policy: FailurePolicy::FailRun,
        }
    }
}

/// Outcome of embedding a set of chunks.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct EmbeddingReport {
    pub embedded: usize,
    pub skipped_chunk_ids: Vec<String>,
    /// Batches left without vectors under `FailurePolicy::SkipChunks`.
    pub failed_batches: usize,
}

/// Batching, retrying front end to an `EmbeddingModel`.
pub struct Embedder {
    model: Arc<dyn EmbeddingModel>,
    config: EmbedderConfig,
    cancel: CancellationToken,
}

impl Embedder {
    /// Create an embedder; a zero batch size or concurrency is raised to one.
    pub fn new(model: Arc<dyn EmbeddingModel>, mut config: EmbedderConfig) -> Self {
        config.batch_size = config.batch_size.max(1);
        config.max_concurrency = config.max_concurrency.max(1);
        Self {
            model,
            config,
            cancel: CancellationToken::new(),
        }
    }

    /// Stop starting new batches once `token` is cancelled.
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    pub fn config(&self) -> &EmbedderConfig {
        &self.config
    }

    pub fn dimension(&self) -> usize {
        self.config.dimension
    }

    /// Exactly one vector per text, in input order. Any failed batch fails
    /// the call regardless of the failure policy.
    pub async fn embed_texts(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, PipelineError> {
        let vectors = self.embed_all(texts, FailurePolicy::FailRun).await?;
        Ok(vectors.into_iter().flatten().collect())
    }

    /// One entry per text; `None` marks texts of batches skipped under
    /// `FailurePolicy::SkipChunks`.
    pub async fn embed_with_policy(
        &self,
        texts: &[String],
    ) -> Result<(Vec<Option<Vec<f32>>>, usize), PipelineError> {
        self.embed_all_counting(texts, self.config.failure_policy).await
    }

    /// Fill `text_vector` of every chunk in place.
    #[instrument(skip(self, chunks), fields(chunk_count = chunks.len()))]
    pub async fn embed_chunks(
        &self,
        chunks: &mut [ChunkRecord],
    ) -> Result<EmbeddingReport, PipelineError> {
        let texts: Vec<String> = chunks.iter().map(|chunk| chunk.text.clone()).collect();
        let (vectors, failed_batches) = self.embed_with_policy(&texts).await?;

        let mut report = EmbeddingReport {
            failed_batches,
            ..Default::default()
        };
        for (chunk, vector) in chunks.iter_mut().zip(vectors) {
            match vector {
                Some(vector) => {
                    chunk.text_vector = Some(vector);
                    report.embedded += 1;
                }
                None => {
                    chunk.text_vector = None;
                    report.skipped_chunk_ids.push(chunk.chunk_id());
                }
            }
        }

        info!(
            embedded = report.embedded,
            skipped = report.skipped_chunk_ids.len(),
            "Embedded chunks"
        );
        Ok(report)
    }

    async fn embed_all(
        &self,
        texts: &[String],
        policy: FailurePolicy,
    ) -> Result<Vec<Option<Vec<f32>>>, PipelineError> {
        Ok(self.embed_all_counting(texts, policy).await?.0)
    }

    async fn embed_all_counting(
        &self,
        texts: &[String],
        policy: FailurePolicy,
    ) -> Result<(Vec<Option<Vec<f32>>>, usize), PipelineError> {
        let batches = stream::iter(texts.chunks(self.config.batch_size))
            .map(|batch| async move {
                if self.cancel.is_cancelled() {
                    return (batch, Err(EmbeddingError::Cancelled));
                }
                (batch, self.embed_batch_with_retry(batch).await)
            })
            .buffered(self.config.max_concurrency);
        let mut batches = std::pin::pin!(batches);

        let mut vectors = Vec::with_capacity(texts.len());
        let mut failed_batches = 0;
        while let Some((batch, result)) = batches.next().await {
            match result {
                Ok(batch_vectors) => vectors.extend(batch_vectors.into_iter().map(Some)),
                Err(err @ (EmbeddingError::Schema(_) | EmbeddingError::Cancelled)) => {
                    return Err(err.into())
                }
                Err(err) => match policy {
                    FailurePolicy::FailRun => return Err(err.into()),
                    FailurePolicy::SkipChunks => {
                        warn!(
                            error = %err,
                            batch_size = batch.len(),
                            "Embedding batch failed, skipping its chunks"
                        );
                        failed_batches += 1;
                        vectors.extend(std::iter::repeat(None).take(batch.len()));
                    }
                },
            }
        }

        Ok((vectors, failed_batches))
    }

    /// Call the model with exponential backoff on transient failures.
    async fn embed_batch_with_retry(
        &self,
        batch: &[String],
    ) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        let mut delay_ms = self.config.initial_retry_delay_ms;
        let mut last_error = String::new();

        for attempt in 0..=self.config.max_retries {
            match self.model.embed(batch).await {
                Ok(vectors) => {
                    if attempt > 0 {
                        info!(attempt = attempt, "Embedding succeeded after retry");
                    }
                    self.validate(batch.len(), &vectors)?;
                    return Ok(vectors);
                }
                Err(e) => {
                    if !e.is_retryable() {
                        debug!(error = %e, "Non-retryable embedding error");
                        return Err(e);
                    }
                    last_error = e.to_string();

                    if attempt < self.config.max_retries {
                        warn!(
                            attempt = attempt + 1,
                            max_retries = self.config.max_retries,
                            delay_ms = delay_ms,
                            error = %last_error,
                            "Embedding failed, retrying"
                        );
                        tokio::time::sleep(Duration::from_millis(delay_ms)).await;
                        delay_ms = std::cmp::min(delay_ms * 2, self.config.max_retry_delay_ms);
                    }
                }
            }
        }

        Err(EmbeddingError::Exhausted {
            attempts: self.config.max_retries + 1,
            last_error,
        })
    }

    /// Vectors are never padded or truncated.
    fn validate(&self, expected_count: usize, vectors: &[Vec<f32>]) -> Result<(), EmbeddingSchemaError> {
        if vectors.len() != expected_count {
            return Err(EmbeddingSchemaError::new(
                expected_count,
                vectors.len(),
                "vector count",
            ));
        }
        if let Some(bad) = vectors.iter().find(|v| v.len() != self.config.dimension) {
            return Err(EmbeddingSchemaError::new(
                self.config.dimension,
                bad.len(),
                "vector length",
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio::sync::Mutex;

    /// Deterministic model: the vector is `[len(text), position in batch, 0...]`.
    #[derive(Default)]
    pub(crate) struct MockModel {
        pub dimension: usize,
        pub calls: AtomicUsize,
        pub batch_sizes: Mutex<Vec<usize>>,
        pub transient_failures: AtomicUsize,
        pub reject_marker: Option<String>,
        pub short_by: usize,
    }

    impl MockModel {
        pub(crate) fn new(dimension: usize) -> Self {
            Self {
                dimension,
                ..Default::default()
            }
        }
    }

    #[async_trait]
    impl EmbeddingModel for MockModel {
        async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.batch_sizes.lock().await.push(texts.len());

            if self
                .transient_failures
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
                .is_ok()
            {
                return Err(EmbeddingError::transient("503 service unavailable"));
            }
            if let Some(marker) = &self.reject_marker {
                if texts.iter().any(|t| t.contains(marker.as_str())) {
                    return Err(EmbeddingError::rejected("400 bad input"));
                }
            }

            Ok(texts
                .iter()
                .enumerate()
                .map(|(i, text)| {
                    let mut v = vec![0.0; self.dimension - self.short_by];
                    if let Some(first) = v.first_mut() {
                        *first = text.len() as f32;
                    }
                    if let Some(second) = v.get_mut(1) {
                        *second = i as f32;
                    }
                    v
                })
                .collect())
        }
    }

    fn config(batch_size: usize, dimension: usize) -> EmbedderConfig {
        EmbedderConfig {
            batch_size,
            dimension,
            max_concurrency: 2,
            max_retries: 2,
            initial_retry_delay_ms: 1,
            max_retry_delay_ms: 4,
            failure_policy: FailurePolicy::FailRun,
        }
    }

    fn texts(n: usize) -> Vec<String> {
        (0..n).map(|i| "x".repeat(i + 1)).collect()
    }

    #[tokio::test]
    async fn test_batches_preserve_order() {
        let model = Arc::new(MockModel::new(4));
        let embedder = Embedder::new(model.clone(), config(2, 4));

        let vectors = embedder.embed_texts(&texts(5)).await.unwrap();

        assert_eq!(model.calls.load(Ordering::SeqCst), 3);
        let mut sizes = model.batch_sizes.lock().await.clone();
        sizes.sort_unstable();
        assert_eq!(sizes, vec![1, 2, 2]);

        assert_eq!(vectors.len(), 5);
        for (i, vector) in vectors.iter().enumerate() {
            assert_eq!(vector.len(), 4);
            assert_eq!(vector[0], (i + 1) as f32);
        }
    }

    #[tokio::test]
    async fn test_empty_input_makes_no_calls() {
        let model = Arc::new(MockModel::new(4));
        let embedder = Embedder::new(model.clone(), config(2, 4));

        assert!(embedder.embed_texts(&[]).await.unwrap().is_empty());
        assert_eq!(model.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_transient_failures_are_retried() {
        let model = Arc::new(MockModel::new(3));
        model.transient_failures.store(2, Ordering::SeqCst);
        let embedder = Embedder::new(model.clone(), config(10, 3));

        let vectors = embedder.embed_texts(&texts(3)).await.unwrap();
        assert_eq!(vectors.len(), 3);
        assert_eq!(model.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_retries_exhausted() {
        let model = Arc::new(MockModel::new(3));
        model.transient_failures.store(10, Ordering::SeqCst);
        let embedder = Embedder::new(model.clone(), config(10, 3));

        let err = embedder.embed_texts(&texts(1)).await.unwrap_err();
        assert!(matches!(
            err,
            PipelineError::EmbeddingError(EmbeddingError::Exhausted { attempts: 3, .. })
        ));
        assert_eq!(model.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_rejection_is_not_retried() {
        let model = Arc::new(MockModel {
            reject_marker: Some("bad".to_string()),
            ..MockModel::new(3)
        });
        let embedder = Embedder::new(model.clone(), config(10, 3));

        let err = embedder
            .embed_texts(&["a bad text".to_string()])
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            PipelineError::EmbeddingError(EmbeddingError::RejectedError(_))
        ));
        assert_eq!(model.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_dimension_mismatch_is_fatal() {
        let model = Arc::new(MockModel {
            short_by: 1,
            ..MockModel::new(4)
        });
        let mut cfg = config(2, 4);
        cfg.failure_policy = FailurePolicy::SkipChunks;
        let embedder = Embedder::new(model, cfg);

        let err = embedder.embed_texts(&texts(2)).await.unwrap_err();
        assert!(matches!(
            err,
            PipelineError::EmbeddingSchemaError(EmbeddingSchemaError {
                expected: 4,
                actual: 3,
                ..
            })
        ));

        let mut chunks = vec![ChunkRecord::new("b", 0, "text")];
        assert!(embedder.embed_chunks(&mut chunks).await.is_err());
    }

    #[tokio::test]
    async fn test_skip_policy_records_chunk_ids() {
        let model = Arc::new(MockModel {
            reject_marker: Some("poison".to_string()),
            ..MockModel::new(2)
        });
        let mut cfg = config(2, 2);
        cfg.failure_policy = FailurePolicy::SkipChunks;
        let embedder = Embedder::new(model, cfg);

        let mut chunks = vec![
            ChunkRecord::new("b", 0, "one"),
            ChunkRecord::new("b", 1, "two"),
            ChunkRecord::new("b", 2, "poison"),
            ChunkRecord::new("b", 3, "four"),
            ChunkRecord::new("b", 4, "five"),
        ];
        let report = embedder.embed_chunks(&mut chunks).await.unwrap();

        assert_eq!(report.embedded, 3);
        assert_eq!(report.failed_batches, 1);
        assert_eq!(report.skipped_chunk_ids, vec!["b-000002", "b-000003"]);
        assert!(chunks[0].is_embedded());
        assert!(!chunks[2].is_embedded());
        assert!(!chunks[3].is_embedded());
        assert!(chunks[4].is_embedded());
    }

    #[tokio::test]
    async fn test_fail_policy_aborts() {
        let model = Arc::new(MockModel {
            reject_marker: Some("poison".to_string()),
            ..MockModel::new(2)
        });
        let embedder = Embedder::new(model, config(2, 2));

        let mut chunks = vec![
            ChunkRecord::new("b", 0, "one"),
            ChunkRecord::new("b", 1, "poison"),
        ];
        assert!(embedder.embed_chunks(&mut chunks).await.is_err());
    }

    #[tokio::test]
    async fn test_cancelled_embedder_starts_no_batches() {
        let model = Arc::new(MockModel::new(2));
        let token = CancellationToken::new();
        token.cancel();
        let embedder = Embedder::new(model.clone(), config(2, 2)).with_cancellation(token);

        let err = embedder.embed_texts(&texts(4)).await.unwrap_err();
        assert!(matches!(err, PipelineError::Cancelled));
        assert_eq!(model.calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_failure_policy_parsing() {
        assert_eq!("fail".parse::<FailurePolicy>(), Ok(FailurePolicy::FailRun));
        assert_eq!("SKIP".parse::<FailurePolicy>(), Ok(FailurePolicy::SkipChunks));
        assert!("retry".parse::<FailurePolicy>().is_err());
        assert_eq!(FailurePolicy::SkipChunks.to_string(), "skip");
    }
}
