//! Embedding provider boundary
//!
//! Text-to-vector conversion is an external collaborator: the engine only
//! depends on the [`EmbeddingProvider`] trait. A fastembed-backed provider
//! is included for local deployments.

use std::sync::Mutex;

use fastembed::{EmbeddingModel as FastEmbedModel, InitOptions, TextEmbedding};

use crate::error::{MemoryError, Result};

/// Default dimensionality of the bundled model (e5-small)
pub const DEFAULT_DIMENSION: usize = 384;

/// Converts text into a fixed-length vector.
///
/// Dimensionality is fixed per deployment; providers surface failures as
/// [`MemoryError::Embedding`] rather than substituting degenerate vectors.
pub trait EmbeddingProvider: Send + Sync {
    /// Embed a single text
    fn embed(&self, text: &str) -> Result<Vec<f32>>;

    /// Vector dimensionality produced by this provider
    fn dimension(&self) -> usize;

    /// Provider name for logging
    fn name(&self) -> &'static str;
}

/// Embedding provider backed by fastembed (MultilingualE5Small, 384 dims)
pub struct FastembedProvider {
    model: Mutex<TextEmbedding>,
}

impl FastembedProvider {
    /// Load the model; fails with [`MemoryError::Embedding`] if the model
    /// cannot be initialized.
    pub fn new() -> Result<Self> {
        let model = TextEmbedding::try_new(InitOptions::new(FastEmbedModel::MultilingualE5Small))
            .map_err(|e| MemoryError::Embedding(e.to_string()))?;
        Ok(Self {
            model: Mutex::new(model),
        })
    }
}

impl EmbeddingProvider for FastembedProvider {
    fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let mut model = self
            .model
            .lock()
            .map_err(|_| MemoryError::Embedding("Embedding model lock poisoned".to_string()))?;
        let embeddings = model
            .embed(vec![text.to_string()], None)
            .map_err(|e| MemoryError::Embedding(e.to_string()))?;
        embeddings
            .into_iter()
            .next()
            .ok_or_else(|| MemoryError::Embedding("No embedding returned".to_string()))
    }

    fn dimension(&self) -> usize {
        DEFAULT_DIMENSION
    }

    fn name(&self) -> &'static str {
        "fastembed"
    }
}

/// Cosine similarity of two vectors, mapped to 0.0 when either norm is zero.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    let dot: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot / (norm_a * norm_b)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cosine_identical_vectors() {
        let v = vec![0.3, 0.5, 0.1];
        assert!((cosine_similarity(&v, &v) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_cosine_orthogonal_vectors() {
        let a = vec![1.0, 0.0];
        let b = vec![0.0, 1.0];
        assert!(cosine_similarity(&a, &b).abs() < 1e-6);
    }

    #[test]
    fn test_cosine_zero_vector_is_zero() {
        let a = vec![0.0, 0.0];
        let b = vec![0.4, 0.6];
        assert_eq!(cosine_similarity(&a, &b), 0.0);
    }

    #[test]
    fn test_cosine_known_value() {
        // [1, 0] vs [0.8, 0.6]: dot = 0.8, norms 1.0 and 1.0
        let a = vec![1.0, 0.0];
        let b = vec![0.8, 0.6];
        assert!((cosine_similarity(&a, &b) - 0.8).abs() < 1e-6);
    }
}
