//! Offline feature-hashing embedder
//!
//! Lower-cased word unigrams, word bigrams and character trigrams are
//! hashed into `dimensions` signed buckets and the result is L2-normalized.
//! SHA-256 is used as the hash so vectors are identical on every platform
//! and every run.

use async_trait::async_trait;
use sha2::{Digest, Sha256};

use super::{check_text, l2_normalize, Embedder};
use crate::error::IngestResult;

const MODEL_PREFIX: &str = "hashing-v1";

const UNIGRAM_WEIGHT: f32 = 1.0;
const BIGRAM_WEIGHT: f32 = 0.7;
const TRIGRAM_WEIGHT: f32 = 0.35;

pub struct HashingEmbedder {
    dimensions: usize,
}

impl HashingEmbedder {
    pub fn new(dimensions: usize) -> Self {
        Self {
            dimensions: dimensions.max(1),
        }
    }

    fn add_feature(&self, vector: &mut [f32], feature: &str, weight: f32) {
        let digest = Sha256::digest(feature.as_bytes());
        let mut bucket_bytes = [0u8; 8];
        bucket_bytes.copy_from_slice(&digest[..8]);
        let bucket = (u64::from_le_bytes(bucket_bytes) % self.dimensions as u64) as usize;
        let sign = if digest[8] & 1 == 0 { 1.0 } else { -1.0 };
        vector[bucket] += sign * weight;
    }

    /// Compute the vector synchronously
    pub fn embed_sync(&self, text: &str) -> IngestResult<Vec<f32>> {
        let text = check_text(text)?.to_lowercase();
        let words = tokenize(&text);

        let mut vector = vec![0.0f32; self.dimensions];
        for word in &words {
            self.add_feature(&mut vector, &format!("w:{}", word), UNIGRAM_WEIGHT);

            let padded: Vec<char> = format!("<{}>", word).chars().collect();
            for gram in padded.windows(3) {
                let gram: String = gram.iter().collect();
                self.add_feature(&mut vector, &format!("c:{}", gram), TRIGRAM_WEIGHT);
            }
        }
        for pair in words.windows(2) {
            self.add_feature(&mut vector, &format!("b:{} {}", pair[0], pair[1]), BIGRAM_WEIGHT);
        }

        l2_normalize(&mut vector)?;
        Ok(vector)
    }
}

fn tokenize(text: &str) -> Vec<&str> {
    text.split(|c: char| !(c.is_alphanumeric() || c == '\''))
        .map(|w| w.trim_matches('\''))
        .filter(|w| !w.is_empty())
        .collect()
}

#[async_trait]
impl Embedder for HashingEmbedder {
    fn model_id(&self) -> String {
        format!("{}-{}", MODEL_PREFIX, self.dimensions)
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }

    async fn embed(&self, text: &str) -> IngestResult<Vec<f32>> {
        self.embed_sync(text)
    }
}
