//! NDJSON encoding of bulk operations.
//!
//! Each operation is an action line `{"index":{"_index":..,"_id":..}}`
//! followed by the document line.

use std::path::Path;

use serde_json::Value;
use tokio::fs::File;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt, BufReader, BufWriter, Lines};

use crate::errors::PipelineError;
use book_indexer_shared::BulkOperation;

/// Action line and document line, each newline-terminated.
pub fn encode_operation(op: &BulkOperation) -> Result<String, PipelineError> {
    let mut out = serde_json::to_string(&op.action_line())?;
    out.push('\n');
    out.push_str(&serde_json::to_string(&op.source)?);
    out.push('\n');
    Ok(out)
}

/// Buffered NDJSON sink.
pub struct NdjsonWriter<W> {
    writer: BufWriter<W>,
    written: usize,
}

impl NdjsonWriter<File> {
    /// Create (or truncate) a file, creating parent directories as needed.
    pub async fn create(path: &Path) -> Result<Self, PipelineError> {
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let file = File::create(path).await?;
        Ok(Self::new(file))
    }
}

impl<W: AsyncWrite + Unpin> NdjsonWriter<W> {
    pub fn new(inner: W) -> Self {
        Self {
            writer: BufWriter::new(inner),
            written: 0,
        }
    }

    pub async fn write(&mut self, op: &BulkOperation) -> Result<(), PipelineError> {
        let encoded = encode_operation(op)?;
        self.writer.write_all(encoded.as_bytes()).await?;
        self.written += 1;
        Ok(())
    }

    /// Operations written so far.
    pub fn written(&self) -> usize {
        self.written
    }

    /// Flush buffered output and hand back the sink.
    pub async fn finish(mut self) -> Result<W, PipelineError> {
        self.writer.flush().await?;
        Ok(self.writer.into_inner())
    }
}

/// Streaming NDJSON parser yielding one operation per action/document pair.
///
/// Blank lines are ignored. An action line without `_id` takes the id from
/// the document's `chunk_id` or `book_id`.
pub struct NdjsonReader<R> {
    lines: Lines<R>,
    line_no: usize,
    index_override: Option<String>,
}

impl NdjsonReader<BufReader<File>> {
    pub async fn open(path: &Path) -> Result<Self, PipelineError> {
        let file = File::open(path).await?;
        Ok(Self::new(BufReader::new(file)))
    }
}

impl<R: AsyncBufRead + Unpin> NdjsonReader<R> {
    pub fn new(reader: R) -> Self {
        Self {
            lines: reader.lines(),
            line_no: 0,
            index_override: None,
        }
    }

    /// Send every operation to `index`, ignoring the action lines' `_index`.
    pub fn with_index_override(mut self, index: impl Into<String>) -> Self {
        self.index_override = Some(index.into());
        self
    }

    pub async fn next_operation(&mut self) -> Result<Option<BulkOperation>, PipelineError> {
        let Some((action_line, action)) = self.next_value().await? else {
            return Ok(None);
        };
        let meta = action
            .get("index")
            .or_else(|| action.get("create"))
            .and_then(Value::as_object)
            .ok_or_else(|| PipelineError::ndjson(action_line, "expected an index action line"))?;

        let Some((document_line, source)) = self.next_value().await? else {
            return Err(PipelineError::ndjson(
                action_line,
                "action line is not followed by a document",
            ));
        };
        if !source.is_object() {
            return Err(PipelineError::ndjson(
                document_line,
                "document line is not a JSON object",
            ));
        }

        let index = match &self.index_override {
            Some(index) => index.clone(),
            None => meta
                .get("_index")
                .and_then(Value::as_str)
                .map(str::to_string)
                .ok_or_else(|| PipelineError::ndjson(action_line, "action line has no _index"))?,
        };

        let id = meta
            .get("_id")
            .or_else(|| source.get("chunk_id"))
            .or_else(|| source.get("book_id"))
            .and_then(Value::as_str)
            .filter(|id| !id.is_empty())
            .map(str::to_string)
            .ok_or_else(|| PipelineError::ndjson(action_line, "operation has no document id"))?;

        Ok(Some(BulkOperation::new(index, id, source)))
    }

    async fn next_value(&mut self) -> Result<Option<(usize, Value)>, PipelineError> {
        while let Some(line) = self.lines.next_line().await? {
            self.line_no += 1;
            if line.trim().is_empty() {
                continue;
            }
            let value = serde_json::from_str(&line)
                .map_err(|e| PipelineError::ndjson(self.line_no, e.to_string()))?;
            return Ok(Some((self.line_no, value)));
        }
        Ok(None)
    }
}

/// Read every operation of an NDJSON file.
pub async fn read_ndjson(path: &Path) -> Result<Vec<BulkOperation>, PipelineError> {
    let mut reader = NdjsonReader::open(path).await?;
    let mut operations = Vec::new();
    while let Some(op) = reader.next_operation().await? {
        operations.push(op);
    }
    Ok(operations)
}
