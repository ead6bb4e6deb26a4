//! Run summary reported at the end of every pipeline run.

use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

use crate::embedder::EmbeddingReport;
use crate::errors::PipelineError;
use crate::loader::LoadSummary;
use crate::orchestrator::RunState;

/// Failure samples kept per run.
pub const FAILURE_SAMPLE_LIMIT: usize = 20;

/// One recorded non-fatal failure.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FailureSample {
    pub stage: String,
    pub subject: String,
    pub reason: String,
}

/// Counts and samples for one run, serialized as the run report.
#[derive(Debug, Clone, Serialize)]
pub struct RunSummary {
    pub run_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    pub state: RunState,
    pub books_processed: usize,
    pub books_skipped: usize,
    pub chunks_produced: usize,
    pub chunks_embedded: usize,
    pub chunks_skipped: usize,
    pub skipped_chunk_ids: Vec<String>,
    pub documents_submitted: usize,
    pub documents_loaded: usize,
    pub documents_failed: usize,
    pub warnings: usize,
    pub failure_samples: Vec<FailureSample>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl RunSummary {
    pub fn new(run_id: Uuid) -> Self {
        Self {
            run_id,
            started_at: Utc::now(),
            finished_at: None,
            state: RunState::NotStarted,
            books_processed: 0,
            books_skipped: 0,
            chunks_produced: 0,
            chunks_embedded: 0,
            chunks_skipped: 0,
            skipped_chunk_ids: Vec::new(),
            documents_submitted: 0,
            documents_loaded: 0,
            documents_failed: 0,
            warnings: 0,
            failure_samples: Vec::new(),
            error: None,
        }
    }

    fn add_sample(&mut self, stage: &str, subject: &str, reason: &str) {
        if self.failure_samples.len() < FAILURE_SAMPLE_LIMIT {
            self.failure_samples.push(FailureSample {
                stage: stage.to_string(),
                subject: subject.to_string(),
                reason: reason.to_string(),
            });
        }
    }

    /// A source that could not be extracted.
    pub fn record_skipped_book(&mut self, name: &str, reason: &str) {
        self.books_skipped += 1;
        self.warnings += 1;
        self.add_sample("extracting", name, reason);
    }

    pub fn record_embedding(&mut self, report: &EmbeddingReport) {
        self.chunks_embedded += report.embedded;
        self.chunks_skipped += report.skipped_chunk_ids.len();
        self.skipped_chunk_ids
            .extend(report.skipped_chunk_ids.iter().cloned());
        self.warnings += report.failed_batches;
    }

    pub fn record_load(&mut self, load: &LoadSummary) {
        self.documents_submitted += load.submitted;
        self.documents_loaded += load.succeeded;
        self.documents_failed += load.failed;
        for failure in &load.failure_samples {
            let subject = format!("{}/{}", failure.index, failure.id);
            let reason = format!("{}: {}", failure.status, failure.reason);
            self.add_sample("loading", &subject, &reason);
        }
    }

    /// Stamp the final state and, for failed runs, the error.
    pub fn finish(&mut self, state: RunState, error: Option<&PipelineError>) {
        self.state = state;
        self.finished_at = Some(Utc::now());
        self.error = error.map(ToString::to_string);
    }

    pub fn is_success(&self) -> bool {
        self.state == RunState::Completed
    }
}
