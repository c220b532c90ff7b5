//! Error types for Engram

use thiserror::Error;
use uuid::Uuid;

/// Main error type for Engram operations
#[derive(Error, Debug)]
pub enum MemoryError {
    /// Short-term capacity misconfiguration (must be at least 1)
    #[error("Invalid short-term capacity {0}: must be at least 1")]
    CapacityConfig(usize),

    /// Embedding provider failures
    #[error("Embedding error: {0}")]
    Embedding(String),

    /// Backend unreachable or misconfigured at construction
    #[error("Backend connection error: {0}")]
    BackendConnection(String),

    /// Update target does not exist in the long-term backend
    #[error("Record not found: {0}")]
    RecordNotFound(Uuid),

    /// Storage-related errors (LanceDB, SurrealDB, file system, etc.)
    #[error("Storage error: {0}")]
    Storage(String),

    /// Analysis hook per-call errors
    #[error("Analysis error: {0}")]
    Analysis(String),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization errors
    #[error("Serialization error: {0}")]
    Serialization(String),
}

/// Result type alias for Engram operations
pub type Result<T> = std::result::Result<T, MemoryError>;
