//! Engram - Two-tier memory for conversational and agentic applications
//!
//! This crate provides a capacity-bounded, similarity-searchable short-term
//! store and a durable long-term store behind pluggable backends, connected
//! by a consolidation engine that decides whether incoming content is
//! merged into an existing record, inserted as a new one, or discarded.

pub mod analysis;
pub mod backend;
pub mod config;
pub mod embedding;
pub mod engine;
pub mod error;
pub mod memory;
pub mod testing;

pub use analysis::{AnalysisHook, Assessment};
pub use backend::LongTermBackend;
pub use config::EngineConfig;
pub use embedding::EmbeddingProvider;
pub use engine::{ConsolidationAction, ConsolidationEngine, ConsolidationResult};
pub use error::MemoryError;
pub use memory::short_term::ShortTermStore;
pub use memory::types::{LongTermRecord, MemoryEntry, RecordUpdate, Role};
