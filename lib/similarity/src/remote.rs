//! OpenAI-compatible embeddings endpoint client

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use taxonorm_core::{Error, Result, RetryPolicy, Sleeper, TokioSleeper, Vector};
use tracing::debug;

use crate::embedder::Embedder;

#[derive(Debug, Serialize)]
struct EmbeddingRequest<'a> {
    model: &'a str,
    input: &'a [String],
}

#[derive(Debug, Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingDatum>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingDatum {
    #[serde(default)]
    index: usize,
    embedding: Vec<f32>,
}

/// Embedder backed by a remote `/embeddings` endpoint
pub struct HttpEmbedder {
    client: Client,
    base_url: String,
    model: String,
    api_key: Option<String>,
    dimension: Option<usize>,
    retry: RetryPolicy,
    sleeper: Arc<dyn Sleeper>,
}

impl HttpEmbedder {
    pub fn new(
        base_url: impl Into<String>,
        model: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| Error::InvalidConfig(format!("embedding client: {}", e)))?;
        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            model: model.into(),
            api_key: None,
            dimension: None,
            retry: RetryPolicy::default(),
            sleeper: Arc::new(TokioSleeper),
        })
    }

    #[must_use]
    pub fn with_api_key(mut self, api_key: Option<String>) -> Self {
        self.api_key = api_key;
        self
    }

    /// Expected vector dimension; responses of any other size are rejected
    #[must_use]
    pub fn with_dimension(mut self, dimension: Option<usize>) -> Self {
        self.dimension = dimension;
        self
    }

    #[must_use]
    pub fn with_retry(mut self, retry: RetryPolicy, sleeper: Arc<dyn Sleeper>) -> Self {
        self.retry = retry;
        self.sleeper = sleeper;
        self
    }

    async fn request(&self, texts: &[String]) -> Result<Vec<Vector>> {
        let url = format!("{}/embeddings", self.base_url);
        let mut builder = self.client.post(&url).json(&EmbeddingRequest {
            model: &self.model,
            input: texts,
        });
        if let Some(key) = &self.api_key {
            builder = builder.bearer_auth(key);
        }

        let response = builder
            .send()
            .await
            .map_err(|e| Error::EmbeddingUnavailable(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(Error::EmbeddingUnavailable(format!("HTTP {}: {}", status, body)));
        }

        let parsed: EmbeddingResponse = response
            .json()
            .await
            .map_err(|e| Error::EmbeddingUnavailable(format!("malformed response: {}", e)))?;

        collect_vectors(parsed, texts.len(), self.dimension)
    }
}

/// Order response entries by index and check count and dimensions
fn collect_vectors(
    response: EmbeddingResponse,
    expected_len: usize,
    dimension: Option<usize>,
) -> Result<Vec<Vector>> {
    let mut data = response.data;
    if data.len() != expected_len {
        return Err(Error::EmbeddingUnavailable(format!(
            "expected {} embeddings, got {}",
            expected_len,
            data.len()
        )));
    }
    data.sort_by_key(|d| d.index);

    let expected_dim = dimension.or_else(|| data.first().map(|d| d.embedding.len()));
    data.into_iter()
        .map(|d| {
            if let Some(expected) = expected_dim {
                if d.embedding.len() != expected {
                    return Err(Error::DimensionMismatch {
                        expected,
                        actual: d.embedding.len(),
                    });
                }
            }
            Ok(Vector::new(d.embedding))
        })
        .collect()
}

#[async_trait]
impl Embedder for HttpEmbedder {
    fn model_name(&self) -> &str {
        &self.model
    }

    async fn embed(&self, text: &str) -> Result<Vector> {
        let mut vectors = self.embed_batch(&[text.to_string()]).await?;
        vectors
            .pop()
            .ok_or_else(|| Error::EmbeddingUnavailable("empty embedding response".to_string()))
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vector>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }
        debug!(model = %self.model, count = texts.len(), "requesting embeddings");
        self.retry
            .run(self.sleeper.as_ref(), "embed", move || self.request(texts))
            .await
    }
}
