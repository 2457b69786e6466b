//! Text embedding adapters
//!
//! An `Embedder` maps segment text to a fixed-dimensionality vector.
//! Output must be deterministic for a given model and input so that a
//! rebuilt index answers queries the same way as the original.

pub mod hashing;
pub mod remote;

pub use hashing::HashingEmbedder;
pub use remote::RemoteEmbedder;

use async_trait::async_trait;
use std::sync::Arc;

use crate::config::{EmbeddingBackend, EmbeddingSettings};
use crate::error::{IngestError, IngestResult};

#[async_trait]
pub trait Embedder: Send + Sync {
    /// Identifier stored with every vector and in the index header
    fn model_id(&self) -> String;

    fn dimensions(&self) -> usize;

    async fn embed(&self, text: &str) -> IngestResult<Vec<f32>>;

    /// Embed many texts; one result per input, in input order
    ///
    /// A failure for one text does not fail the others.
    async fn embed_batch(&self, texts: &[String]) -> Vec<IngestResult<Vec<f32>>> {
        let mut results = Vec::with_capacity(texts.len());
        for text in texts {
            results.push(self.embed(text).await);
        }
        results
    }
}

pub fn build_embedder(settings: &EmbeddingSettings, client: reqwest::Client) -> Arc<dyn Embedder> {
    match settings.backend {
        EmbeddingBackend::Hashing => Arc::new(HashingEmbedder::new(settings.dimensions)),
        EmbeddingBackend::Remote => Arc::new(RemoteEmbedder::new(settings.clone(), client)),
    }
}

/// Reject text that carries nothing to embed
pub(crate) fn check_text(text: &str) -> IngestResult<&str> {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return Err(IngestError::Embedding("Text is empty".to_string()));
    }
    if !trimmed.chars().any(|c| c.is_alphanumeric()) {
        return Err(IngestError::Embedding(format!(
            "Text has no encodable content: {:?}",
            trimmed
        )));
    }
    Ok(trimmed)
}

/// Scale a vector to unit length; zero vectors are an error
pub(crate) fn l2_normalize(vector: &mut [f32]) -> IngestResult<()> {
    let norm = vector.iter().map(|v| v * v).sum::<f32>().sqrt();
    if norm == 0.0 || !norm.is_finite() {
        return Err(IngestError::Embedding("Vector has zero norm".to_string()));
    }
    for v in vector.iter_mut() {
        *v /= norm;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_check_text() {
        assert!(check_text("  ").is_err());
        assert!(check_text("...!?").is_err());
        assert_eq!(check_text("  ribbit ").unwrap(), "ribbit");
    }

    #[test]
    fn test_l2_normalize() {
        let mut v = vec![3.0, 4.0];
        l2_normalize(&mut v).unwrap();
        assert!((v[0] - 0.6).abs() < 1e-6);
        assert!((v[1] - 0.8).abs() < 1e-6);

        let mut zero = vec![0.0; 4];
        assert!(l2_normalize(&mut zero).is_err());
    }
}
