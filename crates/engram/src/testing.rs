//! Test utilities - deterministic embedders and in-memory doubles
//!
//! These run without models, servers, or network, so unit tests stay fast.
//! Exposed as a regular module because the integration tests use them too.

use std::collections::HashMap;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use uuid::Uuid;

use crate::analysis::{AnalysisHook, Assessment};
use crate::backend::{LongTermBackend, rank_candidates};
use crate::embedding::EmbeddingProvider;
use crate::error::{MemoryError, Result};
use crate::memory::types::{LongTermRecord, RecordUpdate};

/// Deterministic embedder for tests that don't need real ML.
///
/// Produces pseudo-random but stable vectors from the input text hash, so
/// identical texts embed identically and distinct texts are (with near
/// certainty) dissimilar.
#[derive(Debug, Clone)]
pub struct HashEmbedder {
    dimension: usize,
}

impl HashEmbedder {
    pub fn new(dimension: usize) -> Self {
        Self { dimension }
    }

    fn hash_vector(&self, text: &str) -> Vec<f32> {
        use std::collections::hash_map::DefaultHasher;
        use std::hash::{Hash, Hasher};

        let mut hasher = DefaultHasher::new();
        text.hash(&mut hasher);
        let seed = hasher.finish();

        (0..self.dimension)
            .map(|i| {
                let x = seed
                    .wrapping_mul(i as u64 + 1)
                    .wrapping_add(0x9e3779b97f4a7c15);
                let normalized = (x as f32) / (u64::MAX as f32);
                (normalized * 2.0) - 1.0 // Range [-1, 1]
            })
            .collect()
    }
}

impl EmbeddingProvider for HashEmbedder {
    fn embed(&self, text: &str) -> Result<Vec<f32>> {
        Ok(self.hash_vector(text))
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    fn name(&self) -> &'static str {
        "hash"
    }
}

/// Embedder returning preset vectors per exact text, for tests that need
/// controlled similarity (e.g. threshold boundaries). Unknown texts fall
/// back to the hash scheme.
pub struct StaticEmbedder {
    dimension: usize,
    vectors: HashMap<String, Vec<f32>>,
}

impl StaticEmbedder {
    pub fn new(dimension: usize) -> Self {
        Self {
            dimension,
            vectors: HashMap::new(),
        }
    }

    pub fn with_vector(mut self, text: &str, vector: Vec<f32>) -> Self {
        self.vectors.insert(text.to_string(), vector);
        self
    }
}

impl EmbeddingProvider for StaticEmbedder {
    fn embed(&self, text: &str) -> Result<Vec<f32>> {
        if let Some(vector) = self.vectors.get(text) {
            return Ok(vector.clone());
        }
        HashEmbedder::new(self.dimension).embed(text)
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    fn name(&self) -> &'static str {
        "static"
    }
}

/// In-memory long-term backend double with mutation counters.
#[derive(Default)]
pub struct StubBackend {
    records: Mutex<Vec<LongTermRecord>>,
    adds: AtomicUsize,
    updates: AtomicUsize,
}

impl StubBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Place a record directly, bypassing the trait (and the counters).
    pub fn seed_record(&self, record: LongTermRecord) {
        self.records.lock().expect("stub lock poisoned").push(record);
    }

    pub fn add_count(&self) -> usize {
        self.adds.load(Ordering::SeqCst)
    }

    pub fn update_count(&self) -> usize {
        self.updates.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl LongTermBackend for StubBackend {
    async fn add_record(
        &self,
        content: &str,
        embedding: &[f32],
        importance: f32,
        truthfulness: Option<bool>,
        metadata: HashMap<String, String>,
    ) -> Result<Uuid> {
        let record = LongTermRecord::new(
            content.to_string(),
            embedding.to_vec(),
            importance,
            truthfulness,
            metadata,
        );
        let id = record.id;
        self.records.lock().expect("stub lock poisoned").push(record);
        self.adds.fetch_add(1, Ordering::SeqCst);
        Ok(id)
    }

    async fn find_similar(
        &self,
        embedding: &[f32],
        threshold: f32,
        k: usize,
    ) -> Result<Vec<(LongTermRecord, f32)>> {
        let records = self.records.lock().expect("stub lock poisoned").clone();
        Ok(rank_candidates(records, embedding, threshold, k))
    }

    async fn update_record(&self, id: Uuid, update: RecordUpdate) -> Result<()> {
        let mut records = self.records.lock().expect("stub lock poisoned");
        let record = records
            .iter_mut()
            .find(|r| r.id == id)
            .ok_or(MemoryError::RecordNotFound(id))?;
        update.apply(record);
        self.updates.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn get_all(&self) -> Result<Vec<LongTermRecord>> {
        Ok(self.records.lock().expect("stub lock poisoned").clone())
    }

    async fn get_by_id(&self, id: Uuid) -> Result<Option<LongTermRecord>> {
        Ok(self
            .records
            .lock()
            .expect("stub lock poisoned")
            .iter()
            .find(|r| r.id == id)
            .cloned())
    }

    fn name(&self) -> &'static str {
        "stub"
    }
}

/// Analyzer returning the same assessment for every call.
pub struct FixedAnalyzer {
    assessment: Assessment,
}

impl FixedAnalyzer {
    pub fn new(truthful: bool, importance: f32) -> Self {
        Self {
            assessment: Assessment {
                truthful,
                importance,
            },
        }
    }

    pub fn untruthful() -> Self {
        Self::new(false, 0.0)
    }
}

#[async_trait]
impl AnalysisHook for FixedAnalyzer {
    async fn assess(&self, _content: &str, _context: Option<&str>) -> Result<Assessment> {
        Ok(self.assessment)
    }

    fn name(&self) -> &'static str {
        "fixed"
    }
}

/// Analyzer that always fails, for exercising the fallback path.
pub struct FailingAnalyzer;

#[async_trait]
impl AnalysisHook for FailingAnalyzer {
    async fn assess(&self, _content: &str, _context: Option<&str>) -> Result<Assessment> {
        Err(MemoryError::Analysis("simulated analyzer outage".to_string()))
    }

    fn name(&self) -> &'static str {
        "failing"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hash_embedder_is_deterministic() {
        let embedder = HashEmbedder::new(16);
        let a = embedder.embed("hello world").unwrap();
        let b = embedder.embed("hello world").unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn hash_embedder_has_requested_dimension() {
        let embedder = HashEmbedder::new(16);
        assert_eq!(embedder.embed("test").unwrap().len(), 16);
        assert_eq!(embedder.dimension(), 16);
    }

    #[test]
    fn hash_embedder_values_in_range() {
        let embedder = HashEmbedder::new(32);
        for val in embedder.embed("test input").unwrap() {
            assert!((-1.0..=1.0).contains(&val), "Value {val} out of range");
        }
    }

    #[test]
    fn hash_embedder_differs_per_input() {
        let embedder = HashEmbedder::new(16);
        assert_ne!(
            embedder.embed("hello").unwrap(),
            embedder.embed("world").unwrap()
        );
    }

    #[test]
    fn static_embedder_returns_preset_vector() {
        let embedder = StaticEmbedder::new(2).with_vector("pinned", vec![1.0, 0.0]);
        assert_eq!(embedder.embed("pinned").unwrap(), vec![1.0, 0.0]);
        // Unknown text falls back to hashing at the configured dimension
        assert_eq!(embedder.embed("other").unwrap().len(), 2);
    }

    #[tokio::test]
    async fn stub_backend_counts_mutations() {
        let backend = StubBackend::new();
        let id = backend
            .add_record("x", &[1.0], 0.5, None, HashMap::new())
            .await
            .unwrap();
        backend
            .update_record(
                id,
                RecordUpdate {
                    importance: Some(0.9),
                    ..RecordUpdate::default()
                },
            )
            .await
            .unwrap();

        assert_eq!(backend.add_count(), 1);
        assert_eq!(backend.update_count(), 1);
    }

    #[tokio::test]
    async fn stub_backend_update_unknown_id_fails() {
        let backend = StubBackend::new();
        let result = backend
            .update_record(Uuid::new_v4(), RecordUpdate::default())
            .await;
        assert!(matches!(result, Err(MemoryError::RecordNotFound(_))));
    }
}
