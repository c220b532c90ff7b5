//! Long-term storage backends
//!
//! One capability set, three structurally different media: an embedded file
//! database (LanceDB), a relational server (SurrealDB over HTTP), and a
//! remote versioned dataset. The backend is selected at construction via
//! explicit configuration; the engine only ever sees the trait.

pub mod dataset;
pub mod lance;
pub mod surreal;

use std::collections::HashMap;

use async_trait::async_trait;
use uuid::Uuid;

use crate::error::Result;
use crate::memory::types::{LongTermRecord, RecordUpdate};

pub use dataset::DatasetBackend;
pub use lance::LanceBackend;
pub use surreal::SurrealBackend;

/// Durable storage for consolidated memory records.
///
/// All variants share success/failure semantics: `find_similar` on an empty
/// backend returns an empty vector (never an error), `update_record` on an
/// unknown id fails with [`crate::MemoryError::RecordNotFound`]. Results
/// from `find_similar` are ordered best match first; ties are broken by
/// most recent `updated_at`. Scores are cosine similarity in [-1, 1] and
/// the threshold is inclusive.
///
/// Consistency differs per variant and is documented on each type: the file
/// and server backends are read-after-write, the dataset backend stages
/// writes until an explicit sync.
#[async_trait]
pub trait LongTermBackend: Send + Sync {
    /// Create a new durable record, returning its id.
    async fn add_record(
        &self,
        content: &str,
        embedding: &[f32],
        importance: f32,
        truthfulness: Option<bool>,
        metadata: HashMap<String, String>,
    ) -> Result<Uuid>;

    /// Records with similarity >= `threshold`, at most `k`, best first.
    async fn find_similar(
        &self,
        embedding: &[f32],
        threshold: f32,
        k: usize,
    ) -> Result<Vec<(LongTermRecord, f32)>>;

    /// Partially update an existing record, refreshing its `updated_at`.
    async fn update_record(&self, id: Uuid, update: RecordUpdate) -> Result<()>;

    /// All records, in backend-defined order.
    async fn get_all(&self) -> Result<Vec<LongTermRecord>>;

    /// A single record by id, `None` if absent.
    async fn get_by_id(&self, id: Uuid) -> Result<Option<LongTermRecord>>;

    /// Backend name for logging
    fn name(&self) -> &'static str;
}

/// Score candidates against a query embedding, filter by the inclusive
/// threshold, order by score then recency, and truncate to `k`.
///
/// Shared by backends that score in-process rather than in the storage
/// engine.
pub(crate) fn rank_candidates(
    records: Vec<LongTermRecord>,
    embedding: &[f32],
    threshold: f32,
    k: usize,
) -> Vec<(LongTermRecord, f32)> {
    let mut scored: Vec<(LongTermRecord, f32)> = records
        .into_iter()
        .map(|r| {
            let score = crate::embedding::cosine_similarity(&r.embedding, embedding);
            (r, score)
        })
        .filter(|(_, score)| *score >= threshold)
        .collect();

    scored.sort_by(|a, b| {
        b.1.partial_cmp(&a.1)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| b.0.updated_at.cmp(&a.0.updated_at))
    });
    scored.truncate(k);
    scored
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, Utc};

    fn record(content: &str, embedding: Vec<f32>) -> LongTermRecord {
        LongTermRecord::new(content.to_string(), embedding, 0.5, Some(true), HashMap::new())
    }

    #[test]
    fn test_rank_orders_by_score() {
        let records = vec![
            record("far", vec![0.0, 1.0]),
            record("exact", vec![1.0, 0.0]),
            record("near", vec![1.0, 0.2]),
        ];

        let ranked = rank_candidates(records, &[1.0, 0.0], 0.0, 10);
        assert_eq!(ranked[0].0.content, "exact");
        assert_eq!(ranked[1].0.content, "near");
        assert_eq!(ranked[2].0.content, "far");
    }

    #[test]
    fn test_rank_threshold_is_inclusive() {
        // [0.8, 0.6] scores exactly 0.8 against [1, 0]
        let records = vec![record("boundary", vec![0.8, 0.6])];
        let ranked = rank_candidates(records, &[1.0, 0.0], 0.8, 10);
        assert_eq!(ranked.len(), 1);

        let records = vec![record("below", vec![0.7, 0.8])];
        let ranked = rank_candidates(records, &[1.0, 0.0], 0.8, 10);
        assert!(ranked.is_empty());
    }

    #[test]
    fn test_rank_ties_break_by_recency() {
        let mut older = record("older", vec![1.0, 0.0]);
        older.updated_at = Utc::now() - Duration::hours(2);
        let newer = record("newer", vec![1.0, 0.0]);

        let ranked = rank_candidates(vec![older, newer], &[1.0, 0.0], 0.0, 10);
        assert_eq!(ranked[0].0.content, "newer");
    }

    #[test]
    fn test_rank_scores_span_negative_range() {
        // Opposed vectors score -1; a threshold of 0 excludes them, a
        // threshold at the bottom of the range admits them
        let records = vec![record("opposed", vec![-1.0, 0.0])];
        let ranked = rank_candidates(records.clone(), &[1.0, 0.0], 0.0, 10);
        assert!(ranked.is_empty());

        let ranked = rank_candidates(records, &[1.0, 0.0], -1.0, 10);
        assert_eq!(ranked.len(), 1);
        assert!((ranked[0].1 + 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_rank_truncates_to_k() {
        let records = (0..5).map(|_| record("r", vec![1.0, 0.0])).collect();
        let ranked = rank_candidates(records, &[1.0, 0.0], 0.0, 2);
        assert_eq!(ranked.len(), 2);
    }
}
