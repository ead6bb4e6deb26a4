//! Embedding model providers.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::errors::EmbeddingError;

/// Trait for embedding model services.
///
/// One call embeds one batch; the returned vectors correspond to `texts`
/// position by position.
#[async_trait]
pub trait EmbeddingModel: Send + Sync {
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError>;
}

#[derive(Debug, Serialize)]
struct EmbeddingRequest<'a> {
    model: &'a str,
    input: &'a [String],
}

#[derive(Debug, Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingData>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingData {
    #[serde(default)]
    index: Option<usize>,
    embedding: Vec<f32>,
}

/// Client for an OpenAI-compatible `/embeddings` endpoint.
#[derive(Debug, Clone)]
pub struct HttpEmbeddingModel {
    client: reqwest::Client,
    url: String,
    model: String,
}

impl HttpEmbeddingModel {
    /// Create a model client with a per-request timeout.
    pub fn new(
        url: impl Into<String>,
        model: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, EmbeddingError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| EmbeddingError::ClientError(e.to_string()))?;

        Ok(Self {
            client,
            url: url.into(),
            model: model.into(),
        })
    }
}

#[async_trait]
impl EmbeddingModel for HttpEmbeddingModel {
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        let request = EmbeddingRequest {
            model: &self.model,
            input: texts,
        };

        let response = self
            .client
            .post(&self.url)
            .json(&request)
            .send()
            .await
            .map_err(classify_send_error)?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(classify_status(status, &body));
        }

        let parsed: EmbeddingResponse = response
            .json()
            .await
            .map_err(|e| EmbeddingError::invalid_response(e.to_string()))?;

        debug!(
            batch_size = texts.len(),
            returned = parsed.data.len(),
            "Embedding response received"
        );
        Ok(order_embeddings(parsed.data))
    }
}

fn classify_send_error(err: reqwest::Error) -> EmbeddingError {
    if err.is_timeout() || err.is_connect() || err.is_request() {
        EmbeddingError::transient(err.to_string())
    } else {
        EmbeddingError::rejected(err.to_string())
    }
}

fn classify_status(status: StatusCode, body: &str) -> EmbeddingError {
    let message = format!("HTTP {}: {}", status.as_u16(), body.trim());
    if status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error() {
        EmbeddingError::transient(message)
    } else {
        EmbeddingError::rejected(message)
    }
}

/// Vectors in input order, following `index` when the service sends it.
fn order_embeddings(mut data: Vec<EmbeddingData>) -> Vec<Vec<f32>> {
    if data.iter().all(|item| item.index.is_some()) {
        data.sort_by_key(|item| item.index);
    }
    data.into_iter().map(|item| item.embedding).collect()
}
