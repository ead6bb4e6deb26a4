//! Implementations of the `book-indexer` subcommands.
//!
//! Every command takes the initialized [`Dependencies`] and returns a
//! serializable report that the binary prints as JSON.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::Serialize;
use tokio::sync::mpsc;
use tracing::{info, instrument, warn};

use crate::{Dependencies, IndexingError};
use book_indexer_pipeline::{
    embedder::{embed_ndjson_file, NdjsonEmbedOptions, NdjsonEmbedReport},
    extractor::{EpubExtractor, StoredRecordExtractor},
    loader::LoadSummary,
    serializer::NdjsonReader,
    summary::RunSummary,
    PipelineError,
};
use book_indexer_repository::{IndexDefinition, ObjectStore, TEXT_VECTOR_FIELD};

/// File names looked up in a mappings directory.
const BOOKS_MAPPING_FILE: &str = "books.json";
const CONTENT_MAPPING_FILE: &str = "book_content.json";

/// Indices handled by `init-indices`.
#[derive(Debug, Clone, Serialize)]
pub struct InitReport {
    pub indices: Vec<String>,
    pub dropped_existing: bool,
}

/// Options of the `ingest` command.
#[derive(Debug, Clone, Default)]
pub struct IngestOptions {
    pub prefix: String,
    pub load: bool,
    pub ndjson: bool,
    pub embed: bool,
}

/// The two index definitions, read from `mappings_dir` when it holds them.
fn index_definitions(
    deps: &Dependencies,
    mappings_dir: Option<&Path>,
) -> Result<(IndexDefinition, IndexDefinition), IndexingError> {
    let indices = &deps.config.indices;
    let dimension = deps.config.embedding.embedder.dimension;
    let file = |name: &str| {
        mappings_dir
            .map(|dir| dir.join(name))
            .filter(|path| path.is_file())
    };

    let books = match file(BOOKS_MAPPING_FILE) {
        Some(path) => IndexDefinition::from_file(&indices.books, &path)?,
        None => IndexDefinition::books(&indices.books),
    };
    let content = match file(CONTENT_MAPPING_FILE) {
        Some(path) => IndexDefinition::from_file(&indices.content, &path)?,
        None => IndexDefinition::book_content(&indices.content, dimension),
    };

    match content.vector_dimension(TEXT_VECTOR_FIELD) {
        Some(mapped) if mapped != dimension => warn!(
            index = %content.name,
            mapped,
            configured = dimension,
            "Mapping vector dimension differs from EMBEDDING_DIMENSION"
        ),
        None => warn!(index = %content.name, "Mapping has no vector dimension"),
        _ => {}
    }

    Ok((books, content))
}

/// Create the `books` and `book_content` indices.
///
/// Existing indices are dropped first unless `keep_existing` is set.
#[instrument(skip(deps))]
pub async fn init_indices(
    deps: &Dependencies,
    keep_existing: bool,
    mappings_dir: Option<&Path>,
) -> Result<InitReport, IndexingError> {
    deps.verify_search().await?;
    let (books, content) = index_definitions(deps, mappings_dir)?;

    for definition in [&books, &content] {
        deps.search
            .recreate_index(definition, !keep_existing)
            .await?;
    }

    Ok(InitReport {
        indices: vec![books.name, content.name],
        dropped_existing: !keep_existing,
    })
}

/// Load every operation of an NDJSON bulk file.
///
/// The file is streamed into the loader through a bounded queue, so its size
/// is not limited by memory.
#[instrument(skip(deps, file), fields(file = %file.display()))]
pub async fn bulk(
    deps: &Dependencies,
    file: &Path,
    index_override: Option<String>,
) -> Result<LoadSummary, IndexingError> {
    deps.verify_search().await?;

    let mut reader = NdjsonReader::open(file).await?;
    if let Some(index) = index_override {
        reader = reader.with_index_override(index);
    }

    let (tx, rx) = mpsc::channel(deps.config.orchestrator.channel_buffer_size.max(1));
    let reading = tokio::spawn(async move {
        let mut read = 0usize;
        while let Some(op) = reader.next_operation().await? {
            if tx.send(op).await.is_err() {
                break;
            }
            read += 1;
        }
        Ok::<usize, PipelineError>(read)
    });

    let summary = deps.loader().load(rx, deps.cancel.clone()).await?;
    let read = reading
        .await
        .map_err(|e| PipelineError::TaskError(e.to_string()))??;

    info!(
        read,
        succeeded = summary.succeeded,
        failed = summary.failed,
        batches = summary.batches,
        "Bulk load finished"
    );
    Ok(summary)
}

/// Add a vector field to every document of an NDJSON file.
#[instrument(skip(deps, file), fields(file = %file.display()))]
pub async fn embed_from_ndjson(
    deps: &Dependencies,
    file: &Path,
    source_field: &str,
    target_field: &str,
    output: Option<PathBuf>,
) -> Result<NdjsonEmbedReport, IndexingError> {
    let embedder = deps.require_embedder()?;
    let mut options = NdjsonEmbedOptions::new(source_field, target_field);
    if let Some(output) = output {
        options = options.with_output(output);
    }

    Ok(embed_ndjson_file(&embedder, file, &options).await?)
}

/// Extract raw EPUBs into Book Record JSON in the parsed bucket.
#[instrument(skip(deps))]
pub async fn extract(deps: &Dependencies, prefix: &str) -> Result<RunSummary, IndexingError> {
    let storage = &deps.config.storage;
    let raw = deps.bucket(&storage.raw_bucket).await?;
    let parsed = deps.bucket(&storage.parsed_bucket).await?;

    let pipeline = deps
        .pipeline(Arc::new(EpubExtractor::new()))?
        .with_parsed_store(parsed);
    let names = raw.list(prefix, pipeline.source_suffix()).await?;
    info!(sources = names.len(), bucket = %storage.raw_bucket, "Listed raw books");

    Ok(pipeline.extract(&*raw, &names).await?)
}

/// Chunk parsed Book Records into the NDJSON pair in the index bucket.
#[instrument(skip(deps))]
pub async fn convert(deps: &Dependencies, prefix: &str) -> Result<RunSummary, IndexingError> {
    let storage = &deps.config.storage;
    let parsed = deps.bucket(&storage.parsed_bucket).await?;
    let index = deps.bucket(&storage.index_bucket).await?;

    let pipeline = deps
        .pipeline(Arc::new(StoredRecordExtractor))?
        .with_ndjson_dir(index.dir());
    let names = parsed.list(prefix, pipeline.source_suffix()).await?;
    info!(sources = names.len(), bucket = %storage.parsed_bucket, "Listed parsed books");

    Ok(pipeline.run(&*parsed, &names).await?)
}

/// Run the whole pipeline over raw EPUBs.
#[instrument(skip(deps))]
pub async fn ingest(deps: &Dependencies, options: IngestOptions) -> Result<RunSummary, IndexingError> {
    let storage = &deps.config.storage;
    let raw = deps.bucket(&storage.raw_bucket).await?;
    let parsed = deps.bucket(&storage.parsed_bucket).await?;

    let mut pipeline = deps
        .pipeline(Arc::new(EpubExtractor::new()))?
        .with_parsed_store(parsed);

    let write_ndjson = options.ndjson || !options.load;
    if write_ndjson {
        let index = deps.bucket(&storage.index_bucket).await?;
        pipeline = pipeline.with_ndjson_dir(index.dir());
    }

    if options.embed {
        match deps.embedder()? {
            Some(embedder) => pipeline = pipeline.with_embedder(embedder),
            None => warn!("EMBEDDING_URL is not set, chunks will be indexed without vectors"),
        }
    }

    if options.load {
        deps.verify_search().await?;
        let (books, content) = index_definitions(deps, None)?;
        deps.search.ensure_index(&books).await?;
        deps.search.ensure_index(&content).await?;
        pipeline = pipeline.with_loader(deps.loader());
    }

    let names = raw.list(&options.prefix, pipeline.source_suffix()).await?;
    info!(
        sources = names.len(),
        load = options.load,
        ndjson = write_ndjson,
        embed = options.embed,
        "Starting ingest"
    );

    Ok(pipeline.run(&*raw, &names).await?)
}
