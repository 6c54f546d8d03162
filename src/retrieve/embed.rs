//! Embedding backend seam.
//!
//! The default embedder hashes character trigrams of the normalized text
//! into a fixed-width vector. It is deterministic and needs no model
//! download, which keeps vector search reproducible in tests and offline
//! deployments. Production builds can enable the `embeddings` feature for
//! an ONNX-backed model.

use crate::arabic::normalize_for_embedding;
use thiserror::Error;

/// Errors from embedding operations.
#[derive(Debug, Error)]
pub enum EmbeddingError {
    #[error("embedding returned no results")]
    EmptyResult,

    #[error("embedding model error: {0}")]
    ModelError(String),
}

/// Trait for embedding text into vectors.
pub trait Embedder: Send + Sync {
    /// Embed a batch of texts, one vector per text.
    fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>, EmbeddingError>;

    fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
        self.embed_batch(&[text])?
            .into_iter()
            .next()
            .ok_or(EmbeddingError::EmptyResult)
    }
}

/// Cosine similarity between two vectors. Zero for mismatched or empty
/// inputs.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.is_empty() || a.len() != b.len() {
        return 0.0;
    }
    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot / (norm_a * norm_b)
}

/// Deterministic feature-hashing embedder over character trigrams.
pub struct HashedEmbedder {
    dimensions: usize,
}

impl Default for HashedEmbedder {
    fn default() -> Self {
        Self { dimensions: 256 }
    }
}

impl HashedEmbedder {
    pub fn new(dimensions: usize) -> Self {
        Self {
            dimensions: dimensions.max(8),
        }
    }

    fn embed_one(&self, text: &str) -> Vec<f32> {
        let normalized = normalize_for_embedding(text);
        let chars: Vec<char> = normalized.chars().collect();
        let mut vector = vec![0.0f32; self.dimensions];

        if chars.len() < 3 {
            return vector;
        }
        for window in chars.windows(3) {
            let bucket = fnv1a(window) as usize % self.dimensions;
            vector[bucket] += 1.0;
        }

        let norm: f32 = vector.iter().map(|x| x * x).sum::<f32>().sqrt();
        if norm > 0.0 {
            for x in &mut vector {
                *x /= norm;
            }
        }
        vector
    }
}

impl Embedder for HashedEmbedder {
    fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        Ok(texts.iter().map(|t| self.embed_one(t)).collect())
    }
}

/// FNV-1a over the UTF-32 code points of a character window.
fn fnv1a(window: &[char]) -> u64 {
    let mut hash: u64 = 0xcbf29ce484222325;
    for &c in window {
        for byte in (c as u32).to_le_bytes() {
            hash ^= byte as u64;
            hash = hash.wrapping_mul(0x100000001b3);
        }
    }
    hash
}

#[cfg(feature = "embeddings")]
mod fastembed_impl {
    use super::{Embedder, EmbeddingError};
    use fastembed::{EmbeddingModel, InitOptions, TextEmbedding};
    use std::sync::Mutex;

    /// Production embedder backed by fastembed (ONNX Runtime).
    ///
    /// `TextEmbedding::embed` takes `&mut self`, so the model sits behind a
    /// mutex to satisfy the `&self` trait contract.
    pub struct FastEmbedEmbedder {
        model: Mutex<TextEmbedding>,
    }

    impl FastEmbedEmbedder {
        pub fn new() -> Result<Self, EmbeddingError> {
            let model = TextEmbedding::try_new(
                InitOptions::new(EmbeddingModel::MultilingualE5Small),
            )
            .map_err(|e| EmbeddingError::ModelError(e.to_string()))?;
            Ok(Self {
                model: Mutex::new(model),
            })
        }
    }

    impl Embedder for FastEmbedEmbedder {
        fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
            let mut model = self
                .model
                .lock()
                .map_err(|_| EmbeddingError::ModelError("poisoned lock".to_string()))?;
            model
                .embed(texts.to_vec(), None)
                .map_err(|e| EmbeddingError::ModelError(e.to_string()))
        }
    }
}

#[cfg(feature = "embeddings")]
pub use fastembed_impl::FastEmbedEmbedder;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn embedding_is_deterministic() {
        let embedder = HashedEmbedder::default();
        let a = embedder.embed("التزكية تطهير النفس").unwrap();
        let b = embedder.embed("التزكية تطهير النفس").unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn similar_texts_score_higher_than_unrelated() {
        let embedder = HashedEmbedder::default();
        let query = embedder.embed("تعريف التزكية").unwrap();
        let related = embedder.embed("التزكية هي تطهير النفس وتنميتها").unwrap();
        let unrelated = embedder.embed("الطقس اليوم مشمس في المدينة").unwrap();

        let sim_related = cosine_similarity(&query, &related);
        let sim_unrelated = cosine_similarity(&query, &unrelated);
        assert!(sim_related > sim_unrelated);
    }

    #[test]
    fn vectors_are_unit_norm() {
        let embedder = HashedEmbedder::default();
        let v = embedder.embed("الصبر والشكر").unwrap();
        let norm: f32 = v.iter().map(|x| x * x).sum::<f32>().sqrt();
        assert!((norm - 1.0).abs() < 1e-5);
    }

    #[test]
    fn short_text_embeds_to_zero_vector() {
        let embedder = HashedEmbedder::default();
        let v = embedder.embed("ا").unwrap();
        assert!(v.iter().all(|&x| x == 0.0));
        assert_eq!(cosine_similarity(&v, &v), 0.0);
    }
}
