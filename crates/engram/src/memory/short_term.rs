//! Capacity-bounded short-term memory
//!
//! A FIFO ring of recent entries with brute-force nearest-neighbor lookup.
//! All access goes through an internal mutex so the capacity invariant
//! (`len <= capacity`) holds under concurrent insertion.

use std::collections::VecDeque;
use std::sync::Mutex;

use tracing::debug;

use crate::embedding::cosine_similarity;
use crate::error::{MemoryError, Result};
use crate::memory::types::MemoryEntry;

/// Short-term memory store.
///
/// Entries live until evicted by capacity pressure; consolidation reads
/// from this tier but never removes from it, so an entry may exist in both
/// tiers at once.
pub struct ShortTermStore {
    capacity: usize,
    entries: Mutex<VecDeque<MemoryEntry>>,
}

impl ShortTermStore {
    /// Create a store holding at most `capacity` entries.
    ///
    /// Fails with [`MemoryError::CapacityConfig`] when `capacity` is zero.
    pub fn new(capacity: usize) -> Result<Self> {
        if capacity < 1 {
            return Err(MemoryError::CapacityConfig(capacity));
        }
        Ok(Self {
            capacity,
            entries: Mutex::new(VecDeque::with_capacity(capacity)),
        })
    }

    /// Insert an entry, evicting the oldest one first if the store is full.
    ///
    /// The incoming entry is always accepted.
    pub fn insert(&self, entry: MemoryEntry) {
        let mut entries = self.entries.lock().expect("short-term lock poisoned");
        if entries.len() == self.capacity {
            if let Some(evicted) = entries.pop_front() {
                debug!(evicted_id = %evicted.id, "Evicting oldest short-term entry");
            }
        }
        entries.push_back(entry);
    }

    /// Return at most `k` entries nearest to `embedding`, best first.
    ///
    /// An empty store yields an empty vector, never an error.
    pub fn query_similar(&self, embedding: &[f32], k: usize) -> Vec<(MemoryEntry, f32)> {
        let entries = self.entries.lock().expect("short-term lock poisoned");
        let mut scored: Vec<(MemoryEntry, f32)> = entries
            .iter()
            .map(|e| (e.clone(), cosine_similarity(&e.embedding, embedding)))
            .collect();
        scored.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
        scored.truncate(k);
        scored
    }

    /// All entries, oldest first.
    pub fn all(&self) -> Vec<MemoryEntry> {
        let entries = self.entries.lock().expect("short-term lock poisoned");
        entries.iter().cloned().collect()
    }

    /// Current number of entries
    pub fn len(&self) -> usize {
        self.entries.lock().expect("short-term lock poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Configured maximum size
    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::types::Role;

    fn entry(content: &str, embedding: Vec<f32>) -> MemoryEntry {
        MemoryEntry::new(Role::User, content.to_string(), embedding, None)
    }

    #[test]
    fn test_zero_capacity_rejected() {
        let result = ShortTermStore::new(0);
        assert!(matches!(result, Err(MemoryError::CapacityConfig(0))));
    }

    #[test]
    fn test_insert_within_capacity() {
        let store = ShortTermStore::new(3).unwrap();
        store.insert(entry("a", vec![1.0, 0.0]));
        store.insert(entry("b", vec![0.0, 1.0]));
        assert_eq!(store.len(), 2);
    }

    #[test]
    fn test_fifo_eviction_keeps_most_recent() {
        let store = ShortTermStore::new(2).unwrap();
        store.insert(entry("a", vec![1.0, 0.0]));
        store.insert(entry("b", vec![0.0, 1.0]));
        store.insert(entry("c", vec![1.0, 1.0]));

        let contents: Vec<String> = store.all().into_iter().map(|e| e.content).collect();
        assert_eq!(contents, vec!["b", "c"]);
    }

    #[test]
    fn test_size_never_exceeds_capacity() {
        let store = ShortTermStore::new(4).unwrap();
        for i in 0..20 {
            store.insert(entry(&format!("entry-{i}"), vec![i as f32, 1.0]));
            assert_eq!(store.len(), (i + 1).min(4));
        }

        // The survivors are exactly the four most recent inserts
        let contents: Vec<String> = store.all().into_iter().map(|e| e.content).collect();
        assert_eq!(contents, vec!["entry-16", "entry-17", "entry-18", "entry-19"]);
    }

    #[test]
    fn test_query_similar_orders_by_score() {
        let store = ShortTermStore::new(5).unwrap();
        store.insert(entry("far", vec![0.0, 1.0]));
        store.insert(entry("near", vec![1.0, 0.1]));
        store.insert(entry("exact", vec![1.0, 0.0]));

        let results = store.query_similar(&[1.0, 0.0], 2);
        assert_eq!(results.len(), 2);
        assert_eq!(results[0].0.content, "exact");
        assert_eq!(results[1].0.content, "near");
        assert!(results[0].1 >= results[1].1);
    }

    #[test]
    fn test_query_similar_empty_store() {
        let store = ShortTermStore::new(3).unwrap();
        let results = store.query_similar(&[1.0, 0.0], 10);
        assert!(results.is_empty());
    }

    #[test]
    fn test_concurrent_inserts_hold_invariant() {
        use std::sync::Arc;

        let store = Arc::new(ShortTermStore::new(8).unwrap());
        let mut handles = Vec::new();
        for t in 0..4 {
            let store = Arc::clone(&store);
            handles.push(std::thread::spawn(move || {
                for i in 0..50 {
                    store.insert(entry(&format!("t{t}-{i}"), vec![i as f32, t as f32]));
                }
            }));
        }
        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(store.len(), 8);
    }
}
