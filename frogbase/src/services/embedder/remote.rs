//! OpenAI-compatible `/embeddings` client
//!
//! Texts are sent in batches of `batch_size`. When a batch request fails
//! its texts are retried one by one so a single bad input only fails itself.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, warn};

use super::{check_text, Embedder};
use crate::config::EmbeddingSettings;
use crate::error::{IngestError, IngestResult};

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
    index: usize,
    embedding: Vec<f32>,
}

pub struct RemoteEmbedder {
    settings: EmbeddingSettings,
    client: reqwest::Client,
}

impl RemoteEmbedder {
    pub fn new(settings: EmbeddingSettings, client: reqwest::Client) -> Self {
        Self { settings, client }
    }

    fn api_url(&self) -> String {
        format!("{}/embeddings", self.settings.api_base.trim_end_matches('/'))
    }

    async fn request(&self, texts: &[String]) -> IngestResult<Vec<Vec<f32>>> {
        let mut request = self
            .client
            .post(self.api_url())
            .timeout(Duration::from_secs(self.settings.timeout_secs))
            .json(&EmbeddingRequest {
                model: &self.settings.model,
                input: texts,
            });
        if let Some(key) = &self.settings.api_key {
            request = request.bearer_auth(key);
        }

        let response = request
            .send()
            .await
            .map_err(|e| IngestError::Embedding(format!("Failed to send request: {}", e)))?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(IngestError::Embedding(format!(
                "API error ({}): {}",
                status, error_text
            )));
        }

        let body: EmbeddingResponse = response
            .json()
            .await
            .map_err(|e| IngestError::Embedding(format!("Failed to parse API response: {}", e)))?;

        order_vectors(body.data, texts.len(), self.settings.dimensions)
    }
}

/// Reorder response rows by `index` and check their shape
fn order_vectors(
    mut data: Vec<EmbeddingData>,
    expected: usize,
    dimensions: usize,
) -> IngestResult<Vec<Vec<f32>>> {
    if data.len() != expected {
        return Err(IngestError::Embedding(format!(
            "Expected {} vectors, got {}",
            expected,
            data.len()
        )));
    }
    data.sort_by_key(|d| d.index);
    data.into_iter()
        .map(|d| {
            if d.embedding.len() != dimensions {
                Err(IngestError::Embedding(format!(
                    "Model returned {} dimensions, configured {}",
                    d.embedding.len(),
                    dimensions
                )))
            } else {
                Ok(d.embedding)
            }
        })
        .collect()
}

#[async_trait]
impl Embedder for RemoteEmbedder {
    fn model_id(&self) -> String {
        self.settings.model.clone()
    }

    fn dimensions(&self) -> usize {
        self.settings.dimensions
    }

    async fn embed(&self, text: &str) -> IngestResult<Vec<f32>> {
        let text = check_text(text)?.to_string();
        let mut vectors = self.request(std::slice::from_ref(&text)).await?;
        vectors
            .pop()
            .ok_or_else(|| IngestError::Embedding("Empty response".to_string()))
    }

    async fn embed_batch(&self, texts: &[String]) -> Vec<IngestResult<Vec<f32>>> {
        let mut results: Vec<IngestResult<Vec<f32>>> = Vec::with_capacity(texts.len());

        for chunk in texts.chunks(self.settings.batch_size.max(1)) {
            let valid = chunk.iter().all(|t| check_text(t).is_ok());
            if valid {
                match self.request(chunk).await {
                    Ok(vectors) => {
                        debug!(count = vectors.len(), "Embedded batch");
                        results.extend(vectors.into_iter().map(Ok));
                        continue;
                    }
                    Err(e) => warn!("Batch embedding failed, retrying individually: {}", e),
                }
            }
            for text in chunk {
                results.push(self.embed(text).await);
            }
        }

        results
    }
}
