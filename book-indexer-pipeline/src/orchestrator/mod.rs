//! Orchestrator module for the book indexer pipeline.
//!
//! Drives a run through extraction, chunking, embedding, serialization and
//! loading. Books stream through the stages one at a time; serialization
//! feeds a bounded queue that the loader drains concurrently. The run state
//! records the furthest stage reached.

mod state;

use std::path::{Path, PathBuf};
use std::pin::pin;
use std::sync::Arc;

use futures::stream::{self, Stream, StreamExt};
use tokio::fs::File;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, instrument, warn};
use uuid::Uuid;

use crate::chunker::Chunker;
use crate::embedder::Embedder;
use crate::errors::{EmbeddingSchemaError, PipelineError};
use crate::extractor::BookExtractor;
use crate::loader::{LoadSummary, SearchLoader};
use crate::serializer::{NdjsonWriter, Serializer};
use crate::summary::RunSummary;
use book_indexer_repository::{ObjectStore, TEXT_VECTOR_FIELD};
use book_indexer_shared::{BookRecord, BulkOperation};

pub use state::{RunState, RunTracker};

/// File name of the `books` NDJSON output.
pub const BOOKS_NDJSON: &str = "books.ndjson";
/// File name of the `book_content` NDJSON output.
pub const CONTENT_NDJSON: &str = "book_content.ndjson";

/// Configuration for the orchestrator.
#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
    /// Capacity of the queue between serializer and loader.
    pub channel_buffer_size: usize,
    /// Books extracted at once.
    pub extract_concurrency: usize,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            channel_buffer_size: 1000,
            extract_concurrency: 4,
        }
    }
}

enum Extracted {
    Book(BookRecord),
    Skipped { name: String, reason: String },
    Cancelled,
}

/// Orchestrator that coordinates the pipeline stages for one run at a time.
///
/// Embedding, loading, NDJSON output and persistence of extracted records
/// are each optional.
pub struct Pipeline {
    extractor: Arc<dyn BookExtractor>,
    chunker: Chunker,
    serializer: Serializer,
    embedder: Option<Embedder>,
    loader: Option<SearchLoader>,
    parsed_store: Option<Arc<dyn ObjectStore>>,
    ndjson_dir: Option<PathBuf>,
    config: OrchestratorConfig,
    cancel: CancellationToken,
}

impl Pipeline {
    /// Create a pipeline that extracts, chunks and serializes.
    pub fn new(extractor: Arc<dyn BookExtractor>, chunker: Chunker, serializer: Serializer) -> Self {
        Self {
            extractor,
            chunker,
            serializer,
            embedder: None,
            loader: None,
            parsed_store: None,
            ndjson_dir: None,
            config: OrchestratorConfig::default(),
            cancel: CancellationToken::new(),
        }
    }

    pub fn with_config(mut self, config: OrchestratorConfig) -> Self {
        self.config = config;
        self
    }

    pub fn with_embedder(mut self, embedder: Embedder) -> Self {
        self.embedder = Some(embedder.with_cancellation(self.cancel.clone()));
        self
    }

    pub fn with_loader(mut self, loader: SearchLoader) -> Self {
        self.loader = Some(loader);
        self
    }

    /// Persist every extracted record as JSON in `store`.
    pub fn with_parsed_store(mut self, store: Arc<dyn ObjectStore>) -> Self {
        self.parsed_store = Some(store);
        self
    }

    /// Write `books.ndjson` and `book_content.ndjson` into `dir`.
    pub fn with_ndjson_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.ndjson_dir = Some(dir.into());
        self
    }

    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.embedder = self
            .embedder
            .map(|embedder| embedder.with_cancellation(token.clone()));
        self.cancel = token;
        self
    }

    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Suffix of the source objects the configured extractor reads.
    pub fn source_suffix(&self) -> &str {
        self.extractor.source_suffix()
    }

    /// Run every configured stage over `names` in `source`.
    ///
    /// Books flow through extraction, chunking, embedding and serialization
    /// one at a time; at most `extract_concurrency` books are in memory.
    #[instrument(skip_all, fields(sources = names.len()))]
    pub async fn run(
        &self,
        source: &dyn ObjectStore,
        names: &[String],
    ) -> Result<RunSummary, PipelineError> {
        let mut tracker = RunTracker::new(Uuid::new_v4());
        let mut summary = RunSummary::new(tracker.run_id());
        info!(run_id = %tracker.run_id(), sources = names.len(), "Starting book indexer run");

        let outcome = self
            .execute(&mut tracker, &mut summary, source, names)
            .await;
        conclude(tracker, summary, outcome)
    }

    /// Extract `names` and persist the records, without chunking or loading.
    #[instrument(skip_all, fields(sources = names.len()))]
    pub async fn extract(
        &self,
        source: &dyn ObjectStore,
        names: &[String],
    ) -> Result<RunSummary, PipelineError> {
        let mut tracker = RunTracker::new(Uuid::new_v4());
        let mut summary = RunSummary::new(tracker.run_id());
        if self.parsed_store.is_none() {
            warn!("No parsed store configured, extracted records will be discarded");
        }

        let outcome = self
            .extract_only(&mut tracker, &mut summary, source, names)
            .await;
        conclude(tracker, summary, outcome)
    }

    async fn extract_only(
        &self,
        tracker: &mut RunTracker,
        summary: &mut RunSummary,
        source: &dyn ObjectStore,
        names: &[String],
    ) -> Result<(), PipelineError> {
        tracker.transition(RunState::Extracting)?;

        let mut books = pin!(self.extracted(source, names));
        while let Some(outcome) = books.next().await {
            self.accept(summary, outcome).await?;
        }

        info!(
            extracted = summary.books_processed,
            skipped = summary.books_skipped,
            "Extraction finished"
        );
        Ok(())
    }

    async fn execute(
        &self,
        tracker: &mut RunTracker,
        summary: &mut RunSummary,
        source: &dyn ObjectStore,
        names: &[String],
    ) -> Result<(), PipelineError> {
        tracker.transition(RunState::Extracting)?;
        if let Some(embedder) = &self.embedder {
            self.check_vector_dimension(embedder).await?;
        }

        let mut sink = match &self.ndjson_dir {
            Some(dir) => Some(NdjsonSink::create(dir).await?),
            None => None,
        };

        let (tx, loader_task) = match &self.loader {
            Some(loader) => {
                let (tx, rx) = mpsc::channel(self.config.channel_buffer_size.max(1));
                let loader = loader.clone();
                let cancel = self.cancel.clone();
                let handle = tokio::spawn(async move { loader.load(rx, cancel).await });
                (Some(tx), Some(handle))
            }
            None => (None, None),
        };

        let produced = self
            .produce(tracker, summary, source, names, sink.as_mut(), tx.as_ref())
            .await;
        drop(tx);

        let mut load_cancelled = false;
        if let Some(handle) = loader_task {
            tracker.advance(RunState::Loading)?;
            let load: LoadSummary = handle
                .await
                .map_err(|e| PipelineError::TaskError(e.to_string()))??;
            summary.record_load(&load);
            load_cancelled = load.cancelled;
        }

        // A loader that stopped for cancellation closes the queue under the producer.
        let cancelled = load_cancelled || self.cancel.is_cancelled();
        match produced {
            Err(_) if cancelled => return Err(PipelineError::Cancelled),
            Err(e) => return Err(e),
            Ok(()) => {}
        }
        if cancelled {
            return Err(PipelineError::Cancelled);
        }

        if let Some(sink) = sink {
            sink.finish().await?;
        }
        Ok(())
    }

    /// Extraction outcomes in source order, `extract_concurrency` at a time.
    fn extracted<'a>(
        &'a self,
        source: &'a dyn ObjectStore,
        names: &'a [String],
    ) -> impl Stream<Item = Extracted> + 'a {
        stream::iter(names)
            .map(move |name| self.extract_one(source, name))
            .buffered(self.config.extract_concurrency.max(1))
    }

    /// Record one extraction outcome and persist the record when configured.
    async fn accept(
        &self,
        summary: &mut RunSummary,
        outcome: Extracted,
    ) -> Result<Option<BookRecord>, PipelineError> {
        match outcome {
            Extracted::Book(book) => {
                if let Some(store) = &self.parsed_store {
                    let value = serde_json::to_value(&book)?;
                    store.put_json(&parsed_object_name(&book), &value).await?;
                }
                summary.books_processed += 1;
                Ok(Some(book))
            }
            Extracted::Skipped { name, reason } => {
                warn!(source = %name, reason = %reason, "Skipping book");
                summary.record_skipped_book(&name, &reason);
                Ok(None)
            }
            Extracted::Cancelled => Err(PipelineError::Cancelled),
        }
    }

    async fn extract_one(&self, source: &dyn ObjectStore, name: &str) -> Extracted {
        if self.cancel.is_cancelled() {
            return Extracted::Cancelled;
        }

        let skipped = |reason: String| Extracted::Skipped {
            name: name.to_string(),
            reason,
        };

        let bytes = match source.get(name).await {
            Ok(bytes) => bytes,
            Err(e) => return skipped(e.to_string()),
        };

        let extractor = self.extractor.clone();
        let owned_name = name.to_string();
        let joined =
            tokio::task::spawn_blocking(move || extractor.extract(&owned_name, &bytes)).await;

        match joined {
            Ok(Ok(mut book)) => {
                if book.link_to_book.is_empty() {
                    book.link_to_book = source.uri(name);
                }
                Extracted::Book(book)
            }
            Ok(Err(e)) => skipped(e.to_string()),
            Err(e) => skipped(format!("extraction task failed: {}", e)),
        }
    }

    /// Chunk, embed and serialize each book as soon as it is extracted.
    async fn produce(
        &self,
        tracker: &mut RunTracker,
        summary: &mut RunSummary,
        source: &dyn ObjectStore,
        names: &[String],
        mut sink: Option<&mut NdjsonSink>,
        tx: Option<&mpsc::Sender<BulkOperation>>,
    ) -> Result<(), PipelineError> {
        let mut books = pin!(self.extracted(source, names));
        while let Some(outcome) = books.next().await {
            let Some(book) = self.accept(summary, outcome).await? else {
                continue;
            };
            if self.cancel.is_cancelled() {
                return Err(PipelineError::Cancelled);
            }

            tracker.advance(RunState::Chunking)?;
            let mut chunks = self.chunker.chunk_book(&book);
            summary.chunks_produced += chunks.len();

            if let Some(embedder) = &self.embedder {
                tracker.advance(RunState::Embedding)?;
                let report = embedder.embed_chunks(&mut chunks).await?;
                summary.record_embedding(&report);
            }

            tracker.advance(RunState::Serializing)?;
            let operations = self.serializer.book_operations(&book, &chunks)?;
            if let Some(sink) = sink.as_deref_mut() {
                sink.write(&operations).await?;
            }
            if let Some(tx) = tx {
                for op in operations {
                    tx.send(op).await.map_err(|_| self.queue_closed())?;
                }
            }
        }

        info!(
            books = summary.books_processed,
            skipped = summary.books_skipped,
            chunks = summary.chunks_produced,
            embedded = summary.chunks_embedded,
            "All books serialized"
        );
        Ok(())
    }

    fn queue_closed(&self) -> PipelineError {
        if self.cancel.is_cancelled() {
            PipelineError::Cancelled
        } else {
            PipelineError::loader_transport("loader stopped before the queue was drained")
        }
    }

    /// An existing content index must expect vectors of the embedder's length.
    async fn check_vector_dimension(&self, embedder: &Embedder) -> Result<(), PipelineError> {
        let Some(loader) = &self.loader else {
            return Ok(());
        };
        let index = &self.serializer.indices().content;
        match loader
            .client()
            .vector_dimension(index, TEXT_VECTOR_FIELD)
            .await?
        {
            Some(mapped) if mapped != embedder.dimension() => Err(EmbeddingSchemaError::new(
                mapped,
                embedder.dimension(),
                format!("index '{}' {}", index, TEXT_VECTOR_FIELD),
            )
            .into()),
            _ => Ok(()),
        }
    }
}

/// The pair of NDJSON files of one run.
struct NdjsonSink {
    books: NdjsonWriter<File>,
    content: NdjsonWriter<File>,
}

impl NdjsonSink {
    async fn create(dir: &Path) -> Result<Self, PipelineError> {
        Ok(Self {
            books: NdjsonWriter::create(&dir.join(BOOKS_NDJSON)).await?,
            content: NdjsonWriter::create(&dir.join(CONTENT_NDJSON)).await?,
        })
    }

    /// The first operation is the book's, the rest its chunks'.
    async fn write(&mut self, operations: &[BulkOperation]) -> Result<(), PipelineError> {
        let Some((book, chunks)) = operations.split_first() else {
            return Ok(());
        };
        self.books.write(book).await?;
        for chunk in chunks {
            self.content.write(chunk).await?;
        }
        Ok(())
    }

    async fn finish(self) -> Result<(), PipelineError> {
        let (books, content) = (self.books.written(), self.content.written());
        self.books.finish().await?;
        self.content.finish().await?;
        info!(books = books, chunks = content, "NDJSON files written");
        Ok(())
    }
}

/// Object name of a persisted record.
fn parsed_object_name(book: &BookRecord) -> String {
    format!("{}.json", book.book_id)
}

fn conclude(
    mut tracker: RunTracker,
    mut summary: RunSummary,
    outcome: Result<(), PipelineError>,
) -> Result<RunSummary, PipelineError> {
    match outcome {
        Ok(()) => {
            tracker.transition(RunState::Completed)?;
            summary.finish(RunState::Completed, None);
            info!(
                run_id = %summary.run_id,
                books = summary.books_processed,
                skipped_books = summary.books_skipped,
                chunks = summary.chunks_produced,
                loaded = summary.documents_loaded,
                failed = summary.documents_failed,
                warnings = summary.warnings,
                "Run completed"
            );
            Ok(summary)
        }
        Err(e) => {
            tracker.fail(&e);
            summary.finish(RunState::Failed, Some(&e));
            error!(
                run_id = %summary.run_id,
                books = summary.books_processed,
                loaded = summary.documents_loaded,
                "Run ended early; documents already loaded are left in place"
            );
            Err(e)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chunker::ChunkerConfig;
    use crate::embedder::tests::MockModel;
    use crate::embedder::{EmbedderConfig, FailurePolicy};
    use crate::errors::ExtractionError;
    use crate::extractor::derive_book_id;
    use crate::loader::tests::{client, MockProvider};
    use crate::loader::LoaderConfig;
    use crate::serializer::{read_ndjson, IndexNames};
    use async_trait::async_trait;
    use book_indexer_repository::{
        BatchOperationSummary, IndexDefinition, SearchIndexClient, SearchIndexConfig,
        SearchIndexError, SearchIndexProvider, StorageError,
    };
    use serde_json::Value;
    use std::collections::{BTreeMap, BTreeSet};
    use std::time::Duration;
    use tokio::sync::{Mutex, Notify};

    /// Plain-text books: the first line is the title, the rest the body.
    struct TextExtractor;

    impl BookExtractor for TextExtractor {
        fn source_suffix(&self) -> &str {
            ".txt"
        }

        fn extract(&self, name: &str, bytes: &[u8]) -> Result<BookRecord, ExtractionError> {
            let text = std::str::from_utf8(bytes)
                .map_err(|e| ExtractionError::encoding(e.to_string()))?;
            let (title, body) = text
                .split_once('\n')
                .ok_or_else(|| ExtractionError::missing_content(name))?;
            Ok(BookRecord::new(derive_book_id(name), title)
                .with_authors(vec!["Anon".to_string()])
                .with_content(body, Vec::new()))
        }
    }

    #[derive(Default)]
    struct MemoryStore {
        objects: Mutex<BTreeMap<String, Vec<u8>>>,
    }

    impl MemoryStore {
        async fn with_books(books: &[(&str, &str)]) -> Self {
            let store = Self::default();
            for (name, content) in books {
                store.put(name, content.as_bytes()).await.unwrap();
            }
            store
        }
    }

    #[async_trait]
    impl ObjectStore for MemoryStore {
        async fn list(&self, prefix: &str, suffix: &str) -> Result<Vec<String>, StorageError> {
            Ok(self
                .objects
                .lock()
                .await
                .keys()
                .filter(|name| name.starts_with(prefix) && name.ends_with(suffix))
                .cloned()
                .collect())
        }

        async fn get(&self, name: &str) -> Result<Vec<u8>, StorageError> {
            self.objects
                .lock()
                .await
                .get(name)
                .cloned()
                .ok_or_else(|| StorageError::NotFound(name.to_string()))
        }

        async fn put(&self, name: &str, body: &[u8]) -> Result<(), StorageError> {
            self.objects
                .lock()
                .await
                .insert(name.to_string(), body.to_vec());
            Ok(())
        }

        fn uri(&self, name: &str) -> String {
            format!("memory://raw/{}", name)
        }
    }

    fn long_body(seed: &str) -> String {
        (0..30)
            .map(|i| format!("{} sentence {} of the story.", seed, i))
            .collect::<Vec<_>>()
            .join(" ")
    }

    async fn library() -> MemoryStore {
        let alpha = format!("Alpha\n{}", long_body("Alpha"));
        let beta = format!("Beta\n{}", long_body("Beta"));
        MemoryStore::with_books(&[
            ("a.txt", alpha.as_str()),
            ("b.txt", beta.as_str()),
            ("broken.txt", "no newline here"),
        ])
        .await
    }

    fn pipeline() -> Pipeline {
        let chunker = Chunker::new(ChunkerConfig::new(200, 20)).unwrap();
        Pipeline::new(Arc::new(TextExtractor), chunker, Serializer::new(IndexNames::default()))
    }

    fn embedder(dimension: usize) -> Embedder {
        Embedder::new(
            Arc::new(MockModel::new(dimension)),
            EmbedderConfig {
                batch_size: 4,
                dimension,
                failure_policy: FailurePolicy::FailRun,
                ..Default::default()
            },
        )
    }

    fn loader(provider: &MockProvider) -> SearchLoader {
        SearchLoader::with_config(
            client(provider),
            LoaderConfig {
                batch_size: 5,
                ..Default::default()
            },
        )
    }

    /// Holds back one object until the gate opens.
    struct GatedStore {
        inner: MemoryStore,
        gated: String,
        gate: Arc<Notify>,
    }

    #[async_trait]
    impl ObjectStore for GatedStore {
        async fn list(&self, prefix: &str, suffix: &str) -> Result<Vec<String>, StorageError> {
            self.inner.list(prefix, suffix).await
        }

        async fn get(&self, name: &str) -> Result<Vec<u8>, StorageError> {
            if name == self.gated {
                self.gate.notified().await;
            }
            self.inner.get(name).await
        }

        async fn put(&self, name: &str, body: &[u8]) -> Result<(), StorageError> {
            self.inner.put(name, body).await
        }

        fn uri(&self, name: &str) -> String {
            self.inner.uri(name)
        }
    }

    /// Runs a hook before every bulk request, then delegates.
    struct HookedProvider {
        inner: MockProvider,
        on_bulk: Box<dyn Fn() + Send + Sync>,
    }

    #[async_trait]
    impl SearchIndexProvider for HookedProvider {
        async fn index_exists(&self, index: &str) -> Result<bool, SearchIndexError> {
            self.inner.index_exists(index).await
        }

        async fn create_index(&self, index: &str, body: &Value) -> Result<(), SearchIndexError> {
            self.inner.create_index(index, body).await
        }

        async fn delete_index(&self, index: &str) -> Result<(), SearchIndexError> {
            self.inner.delete_index(index).await
        }

        async fn get_mapping(&self, index: &str) -> Result<Option<Value>, SearchIndexError> {
            self.inner.get_mapping(index).await
        }

        async fn bulk_index(
            &self,
            operations: &[BulkOperation],
        ) -> Result<BatchOperationSummary, SearchIndexError> {
            (self.on_bulk)();
            self.inner.bulk_index(operations).await
        }

        async fn health_check(&self) -> Result<bool, SearchIndexError> {
            self.inner.health_check().await
        }
    }

    fn hooked_loader(
        provider: &MockProvider,
        on_bulk: impl Fn() + Send + Sync + 'static,
        config: LoaderConfig,
    ) -> SearchLoader {
        let hooked = HookedProvider {
            inner: provider.clone(),
            on_bulk: Box::new(on_bulk),
        };
        SearchLoader::with_config(
            Arc::new(SearchIndexClient::with_config(
                Box::new(hooked),
                SearchIndexConfig::default(),
            )),
            config,
        )
    }

    async fn names(store: &MemoryStore) -> Vec<String> {
        store.list("", ".txt").await.unwrap()
    }

    async fn indexed_ids(provider: &MockProvider) -> BTreeSet<(String, String)> {
        provider.state.documents.lock().await.keys().cloned().collect()
    }

    #[tokio::test]
    async fn test_full_run_loads_both_indices() {
        let store = library().await;
        let provider = MockProvider::default();
        let pipeline = pipeline()
            .with_embedder(embedder(4))
            .with_loader(loader(&provider));

        let summary = pipeline.run(&store, &names(&store).await).await.unwrap();

        assert_eq!(summary.state, RunState::Completed);
        assert_eq!(summary.books_processed, 2);
        assert_eq!(summary.books_skipped, 1);
        assert_eq!(summary.failure_samples[0].subject, "broken.txt");
        assert!(summary.chunks_produced > 2);
        assert_eq!(summary.chunks_embedded, summary.chunks_produced);
        assert_eq!(summary.documents_submitted, summary.chunks_produced + 2);
        assert_eq!(summary.documents_loaded, summary.documents_submitted);

        let documents = provider.state.documents.lock().await;
        let book = documents
            .get(&("books".to_string(), derive_book_id("a.txt")))
            .unwrap();
        assert_eq!(book["title"], "Alpha");
        assert_eq!(book["link_to_book"], "memory://raw/a.txt");

        let chunk_id = format!("{}-000000", derive_book_id("a.txt"));
        let chunk = documents
            .get(&("book_content".to_string(), chunk_id))
            .unwrap();
        assert_eq!(chunk["text_vector"].as_array().unwrap().len(), 4);
    }

    #[tokio::test]
    async fn test_rerun_produces_identical_ids() {
        let store = library().await;
        let provider = MockProvider::default();
        let pipeline = pipeline().with_loader(loader(&provider));
        let sources = names(&store).await;

        let first = pipeline.run(&store, &sources).await.unwrap();
        let after_first = indexed_ids(&provider).await;
        let second = pipeline.run(&store, &sources).await.unwrap();
        let after_second = indexed_ids(&provider).await;

        assert_ne!(first.run_id, second.run_id);
        assert_eq!(after_first, after_second);
        assert_eq!(after_first.len(), first.documents_loaded);
    }

    #[tokio::test]
    async fn test_dimension_mismatch_aborts_before_loading() {
        let store = library().await;
        let provider = MockProvider::default();
        let loader = loader(&provider);
        loader
            .client()
            .recreate_index(&IndexDefinition::book_content("book_content", 8), true)
            .await
            .unwrap();
        let pipeline = pipeline().with_embedder(embedder(4)).with_loader(loader);

        let err = pipeline
            .run(&store, &names(&store).await)
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            PipelineError::EmbeddingSchemaError(EmbeddingSchemaError {
                expected: 8,
                actual: 4,
                ..
            })
        ));
        assert_eq!(provider.state.bulk_calls.load(std::sync::atomic::Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_cancelled_run_fails() {
        let store = library().await;
        let provider = MockProvider::default();
        let token = CancellationToken::new();
        let pipeline = pipeline()
            .with_loader(loader(&provider))
            .with_cancellation(token.clone());
        token.cancel();

        let err = pipeline
            .run(&store, &names(&store).await)
            .await
            .unwrap_err();
        assert!(matches!(err, PipelineError::Cancelled));
        assert!(indexed_ids(&provider).await.is_empty());
    }

    #[tokio::test]
    async fn test_cancel_during_load_reports_cancelled() {
        let store = library().await;
        let provider = MockProvider::default();
        let token = CancellationToken::new();
        let hook_token = token.clone();
        let loader = hooked_loader(
            &provider,
            move || hook_token.cancel(),
            LoaderConfig {
                batch_size: 2,
                max_in_flight: 1,
                ..Default::default()
            },
        );
        let pipeline = pipeline()
            .with_config(OrchestratorConfig {
                channel_buffer_size: 1,
                extract_concurrency: 1,
            })
            .with_loader(loader)
            .with_cancellation(token);

        let err = pipeline
            .run(&store, &names(&store).await)
            .await
            .unwrap_err();

        assert!(matches!(err, PipelineError::Cancelled));
        assert_eq!(provider.state.bulk_calls.load(std::sync::atomic::Ordering::SeqCst), 1);
        assert_eq!(indexed_ids(&provider).await.len(), 2);
    }

    #[tokio::test]
    async fn test_books_load_before_library_is_extracted() {
        let gate = Arc::new(Notify::new());
        let store = GatedStore {
            inner: library().await,
            gated: "broken.txt".to_string(),
            gate: gate.clone(),
        };
        let provider = MockProvider::default();
        let loader = hooked_loader(
            &provider,
            move || gate.notify_one(),
            LoaderConfig {
                batch_size: 5,
                ..Default::default()
            },
        );
        let pipeline = pipeline()
            .with_config(OrchestratorConfig {
                channel_buffer_size: 100,
                extract_concurrency: 1,
            })
            .with_loader(loader);
        let sources = store.list("", ".txt").await.unwrap();

        // broken.txt is only readable once the loader has sent a batch.
        let summary = tokio::time::timeout(Duration::from_secs(10), pipeline.run(&store, &sources))
            .await
            .expect("run stalled waiting for the whole library")
            .unwrap();

        assert_eq!(summary.state, RunState::Completed);
        assert_eq!(summary.books_processed, 2);
        assert_eq!(summary.books_skipped, 1);
        assert_eq!(summary.documents_loaded, summary.documents_submitted);
    }

    #[tokio::test]
    async fn test_skipped_chunks_load_without_vectors() {
        let store = library().await;
        let provider = MockProvider::default();
        let model = MockModel {
            reject_marker: Some("Beta".to_string()),
            ..MockModel::new(4)
        };
        let embedder = Embedder::new(
            Arc::new(model),
            EmbedderConfig {
                batch_size: 4,
                dimension: 4,
                max_retries: 0,
                initial_retry_delay_ms: 1,
                failure_policy: FailurePolicy::SkipChunks,
                ..Default::default()
            },
        );
        let pipeline = pipeline()
            .with_embedder(embedder)
            .with_loader(loader(&provider));

        let summary = pipeline.run(&store, &names(&store).await).await.unwrap();

        assert_eq!(summary.state, RunState::Completed);
        assert!(summary.warnings > summary.books_skipped);
        assert!(!summary.skipped_chunk_ids.is_empty());
        assert_eq!(summary.chunks_skipped, summary.skipped_chunk_ids.len());
        assert_eq!(summary.documents_loaded, summary.documents_submitted);

        let beta = derive_book_id("b.txt");
        let alpha = derive_book_id("a.txt");
        let documents = provider.state.documents.lock().await;
        for chunk_id in &summary.skipped_chunk_ids {
            assert!(chunk_id.starts_with(&beta));
            let chunk = documents
                .get(&("book_content".to_string(), chunk_id.clone()))
                .unwrap();
            assert!(chunk.get(TEXT_VECTOR_FIELD).is_none());
            assert!(chunk["text"].as_str().unwrap().contains("Beta"));
        }
        let alpha_chunk = documents
            .get(&("book_content".to_string(), format!("{}-000000", alpha)))
            .unwrap();
        assert_eq!(alpha_chunk[TEXT_VECTOR_FIELD].as_array().unwrap().len(), 4);
    }

    #[tokio::test]
    async fn test_ndjson_output_without_loading() {
        let store = library().await;
        let dir = tempfile::tempdir().unwrap();
        let pipeline = pipeline().with_ndjson_dir(dir.path());

        let summary = pipeline.run(&store, &names(&store).await).await.unwrap();

        let books = read_ndjson(&dir.path().join(BOOKS_NDJSON)).await.unwrap();
        let content = read_ndjson(&dir.path().join(CONTENT_NDJSON)).await.unwrap();
        assert_eq!(books.len(), 2);
        assert_eq!(content.len(), summary.chunks_produced);
        assert!(content.iter().all(|op| op.index == "book_content"));
        assert!(content.iter().all(|op| op.source.get("text_vector").is_none()));
        assert_eq!(summary.documents_submitted, 0);
    }

    #[tokio::test]
    async fn test_extract_persists_records() {
        let store = library().await;
        let parsed = Arc::new(MemoryStore::default());
        let pipeline = pipeline().with_parsed_store(parsed.clone());

        let summary = pipeline.extract(&store, &names(&store).await).await.unwrap();

        assert_eq!(summary.books_processed, 2);
        let stored = parsed.list("", ".json").await.unwrap();
        assert_eq!(stored.len(), 2);
        let bytes = parsed.get(&stored[0]).await.unwrap();
        let record: BookRecord = serde_json::from_slice(&bytes).unwrap();
        assert!(!record.full_text.is_empty());
        assert_eq!(summary.chunks_produced, 0);
    }
}
