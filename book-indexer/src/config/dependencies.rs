//! Dependency initialization and wiring for the book indexer.

use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::config::IndexerConfig;
use crate::IndexingError;
use book_indexer_pipeline::{
    chunker::Chunker,
    embedder::{Embedder, HttpEmbeddingModel},
    extractor::BookExtractor,
    loader::SearchLoader,
    orchestrator::Pipeline,
    serializer::Serializer,
    PipelineError,
};
use book_indexer_repository::{
    LocalObjectStore, OpenSearchClient, SearchIndexClient, SearchIndexConfig,
};

/// Container for all initialized dependencies.
pub struct Dependencies {
    pub config: IndexerConfig,
    /// Search engine client shared by the loader and index administration.
    pub search: Arc<SearchIndexClient>,
    /// Cancelled on shutdown signals.
    pub cancel: CancellationToken,
}

impl Dependencies {
    /// Initialize the search client from `config`.
    ///
    /// The search engine is not contacted here; commands that need it call
    /// [`Dependencies::verify_search`] first.
    pub fn new(config: IndexerConfig) -> Result<Self, IndexingError> {
        info!(
            opensearch_url = %config.opensearch_url,
            books_index = %config.indices.books,
            content_index = %config.indices.content,
            storage_root = %config.storage.root.display(),
            "Initializing dependencies"
        );

        let search_config = SearchIndexConfig::with_max_batch_size(config.loader.batch_size)
            .with_request_timeout(config.request_timeout);
        let provider = OpenSearchClient::new(&config.opensearch_url, &search_config).map_err(
            |e| IndexingError::config(format!("Failed to create OpenSearch client: {}", e)),
        )?;
        let search = SearchIndexClient::with_config(Box::new(provider), search_config);

        Ok(Self::with_client(config, Arc::new(search)))
    }

    /// Assemble dependencies around an existing search client.
    pub fn with_client(config: IndexerConfig, search: Arc<SearchIndexClient>) -> Self {
        Self {
            config,
            search,
            cancel: CancellationToken::new(),
        }
    }

    /// Fail unless the search cluster answers and reports itself healthy.
    pub async fn verify_search(&self) -> Result<(), IndexingError> {
        let healthy = self
            .search
            .health_check()
            .await
            .map_err(|e| IndexingError::config(format!("OpenSearch health check failed: {}", e)))?;

        if !healthy {
            return Err(IndexingError::config("OpenSearch cluster is unhealthy"));
        }

        info!("OpenSearch connection verified");
        Ok(())
    }

    pub fn loader(&self) -> SearchLoader {
        SearchLoader::with_config(Arc::clone(&self.search), self.config.loader.clone())
    }

    /// Build the embedder, or `None` when no embedding endpoint is configured.
    pub fn embedder(&self) -> Result<Option<Embedder>, IndexingError> {
        let settings = &self.config.embedding;
        let Some(url) = &settings.url else {
            return Ok(None);
        };

        let model = HttpEmbeddingModel::new(url, &settings.model, settings.timeout)
            .map_err(PipelineError::from)?;
        info!(
            url = %url,
            model = %settings.model,
            dimension = settings.embedder.dimension,
            "Embedding service configured"
        );

        Ok(Some(
            Embedder::new(Arc::new(model), settings.embedder.clone())
                .with_cancellation(self.cancel.clone()),
        ))
    }

    pub fn require_embedder(&self) -> Result<Embedder, IndexingError> {
        self.embedder()?
            .ok_or_else(|| IndexingError::config("EMBEDDING_URL is required for this command"))
    }

    /// Open one bucket under the storage root.
    pub async fn bucket(&self, name: &str) -> Result<Arc<LocalObjectStore>, IndexingError> {
        let store = LocalObjectStore::open(&self.config.storage.root, name).await?;
        Ok(Arc::new(store))
    }

    pub fn chunker(&self) -> Result<Chunker, IndexingError> {
        Chunker::new(self.config.chunker).map_err(|e| PipelineError::from(e).into())
    }

    /// A pipeline with `extractor`, the configured chunker and index names.
    ///
    /// Embedding, loading and outputs are attached by the caller.
    pub fn pipeline(&self, extractor: Arc<dyn BookExtractor>) -> Result<Pipeline, IndexingError> {
        let serializer = Serializer::new(self.config.indices.clone());
        Ok(Pipeline::new(extractor, self.chunker()?, serializer)
            .with_config(self.config.orchestrator.clone())
            .with_cancellation(self.cancel.clone()))
    }
}
