//! Embedding an existing NDJSON bulk file.

use std::path::{Path, PathBuf};

use serde::Serialize;
use serde_json::{json, Value};
use tokio::io::AsyncBufRead;
use tracing::{info, instrument, warn};

use super::Embedder;
use crate::errors::PipelineError;
use crate::serializer::{NdjsonReader, NdjsonWriter};
use book_indexer_shared::BulkOperation;

/// Options for `embed_ndjson_file`.
#[derive(Debug, Clone)]
pub struct NdjsonEmbedOptions {
    /// Document field holding the text to embed.
    pub source_field: String,
    /// Document field receiving the vector.
    pub target_field: String,
    /// Destination file; the input is rewritten in place when unset.
    pub output: Option<PathBuf>,
    /// Operations held in memory per embedding round.
    pub window: usize,
}

impl NdjsonEmbedOptions {
    pub fn new(source_field: impl Into<String>, target_field: impl Into<String>) -> Self {
        Self {
            source_field: source_field.into(),
            target_field: target_field.into(),
            output: None,
            window: 512,
        }
    }

    pub fn with_output(mut self, output: impl Into<PathBuf>) -> Self {
        self.output = Some(output.into());
        self
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct NdjsonEmbedReport {
    pub documents: usize,
    pub embedded: usize,
    /// Documents without a non-empty string in the source field.
    pub without_text: usize,
    pub skipped_ids: Vec<String>,
}

/// Add a vector field to every document of an NDJSON bulk file.
#[instrument(skip(embedder, options), fields(input = %input.display()))]
pub async fn embed_ndjson_file(
    embedder: &Embedder,
    input: &Path,
    options: &NdjsonEmbedOptions,
) -> Result<NdjsonEmbedReport, PipelineError> {
    let output = options.output.clone().unwrap_or_else(|| input.to_path_buf());
    let in_place = output == input;
    let target = if in_place {
        input.with_extension("ndjson.tmp")
    } else {
        output.clone()
    };

    let mut reader = NdjsonReader::open(input).await?;
    let report = match rewrite(embedder, &mut reader, &target, options).await {
        Ok(report) => report,
        Err(e) => {
            if let Err(cleanup) = tokio::fs::remove_file(&target).await {
                warn!(path = %target.display(), error = %cleanup, "Cannot remove partial output");
            }
            return Err(e);
        }
    };

    if in_place {
        tokio::fs::rename(&target, input).await?;
    }

    info!(
        documents = report.documents,
        embedded = report.embedded,
        skipped = report.skipped_ids.len(),
        output = %output.display(),
        "Embedded NDJSON file"
    );
    Ok(report)
}

async fn rewrite<R: AsyncBufRead + Unpin>(
    embedder: &Embedder,
    reader: &mut NdjsonReader<R>,
    target: &Path,
    options: &NdjsonEmbedOptions,
) -> Result<NdjsonEmbedReport, PipelineError> {
    let mut writer = NdjsonWriter::create(target).await?;
    let mut report = NdjsonEmbedReport::default();
    let window = options.window.max(1);
    let mut pending: Vec<BulkOperation> = Vec::with_capacity(window);

    loop {
        let next = reader.next_operation().await?;
        let done = next.is_none();
        pending.extend(next);

        if pending.len() >= window || (done && !pending.is_empty()) {
            embed_window(embedder, &mut pending, options, &mut report).await?;
            for op in pending.drain(..) {
                writer.write(&op).await?;
            }
        }
        if done {
            break;
        }
    }
    writer.finish().await?;
    Ok(report)
}

async fn embed_window(
    embedder: &Embedder,
    ops: &mut [BulkOperation],
    options: &NdjsonEmbedOptions,
    report: &mut NdjsonEmbedReport,
) -> Result<(), PipelineError> {
    report.documents += ops.len();

    let mut positions = Vec::with_capacity(ops.len());
    let mut texts = Vec::with_capacity(ops.len());
    for (pos, op) in ops.iter().enumerate() {
        match op.source.get(&options.source_field).and_then(Value::as_str) {
            Some(text) if !text.trim().is_empty() => {
                positions.push(pos);
                texts.push(text.to_string());
            }
            _ => report.without_text += 1,
        }
    }

    let (vectors, _) = embedder.embed_with_policy(&texts).await?;
    for (pos, vector) in positions.into_iter().zip(vectors) {
        let op = &mut ops[pos];
        let Some(fields) = op.source.as_object_mut() else {
            continue;
        };
        match vector {
            Some(vector) => {
                fields.insert(options.target_field.clone(), json!(vector));
                report.embedded += 1;
            }
            None => {
                fields.remove(&options.target_field);
                report.skipped_ids.push(op.id.clone());
            }
        }
    }
    Ok(())
}
