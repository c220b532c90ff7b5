//! Core data structures for the two memory tiers
//!
//! Short-term entries are ephemeral and capacity-bounded; long-term records
//! are durable and owned by whichever backend stores them.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Origin of a piece of content
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// Content produced by the end user
    User,
    /// Content produced by the assistant
    Assistant,
    /// System-level content (instructions, notices)
    System,
    /// Content produced by a tool invocation
    Tool,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Assistant => "assistant",
            Role::System => "system",
            Role::Tool => "tool",
        }
    }
}

/// A single entry in short-term memory.
///
/// Immutable once written; merge decisions touch long-term records only.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemoryEntry {
    /// Unique identifier for this entry
    pub id: Uuid,
    /// The content itself
    pub content: String,
    /// Vector embedding of the content
    pub embedding: Vec<f32>,
    /// Who produced the content
    pub role: Role,
    /// Optional surrounding context (e.g. the query that elicited it)
    pub context: Option<String>,
    /// When this entry was ingested
    pub timestamp: DateTime<Utc>,
}

impl MemoryEntry {
    pub fn new(role: Role, content: String, embedding: Vec<f32>, context: Option<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            content,
            embedding,
            role,
            context,
            timestamp: Utc::now(),
        }
    }
}

/// A consolidated record in long-term memory.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LongTermRecord {
    /// Unique identifier for this record
    pub id: Uuid,
    /// The consolidated content
    pub content: String,
    /// Vector embedding of the content
    pub embedding: Vec<f32>,
    /// Importance score in [0, 1]
    pub importance: f32,
    /// Truthfulness verdict from analysis, if one was produced
    pub truthfulness: Option<bool>,
    /// Free-form string metadata (source role, context, ...)
    pub metadata: HashMap<String, String>,
    /// When this record was created
    pub created_at: DateTime<Utc>,
    /// When this record was last updated by a merge
    pub updated_at: DateTime<Utc>,
}

impl LongTermRecord {
    pub fn new(
        content: String,
        embedding: Vec<f32>,
        importance: f32,
        truthfulness: Option<bool>,
        metadata: HashMap<String, String>,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            content,
            embedding,
            importance: importance.clamp(0.0, 1.0),
            truthfulness,
            metadata,
            created_at: now,
            updated_at: now,
        }
    }
}

/// Partial update applied to a long-term record on merge.
///
/// `None` fields are left untouched.
#[derive(Debug, Clone, Default)]
pub struct RecordUpdate {
    pub content: Option<String>,
    pub importance: Option<f32>,
    pub metadata: Option<HashMap<String, String>>,
}

impl RecordUpdate {
    /// True when no field would change
    pub fn is_empty(&self) -> bool {
        self.content.is_none() && self.importance.is_none() && self.metadata.is_none()
    }

    /// Apply this update to a record in place, refreshing `updated_at`.
    pub fn apply(&self, record: &mut LongTermRecord) {
        if let Some(content) = &self.content {
            record.content = content.clone();
        }
        if let Some(importance) = self.importance {
            record.importance = importance.clamp(0.0, 1.0);
        }
        if let Some(metadata) = &self.metadata {
            record.metadata = metadata.clone();
        }
        record.updated_at = Utc::now();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_entry_serialization_roundtrip() {
        let entry = MemoryEntry::new(
            Role::User,
            "Test content".to_string(),
            vec![0.1; 8],
            Some("a question".to_string()),
        );

        let json = serde_json::to_string(&entry).expect("Failed to serialize entry");
        let deserialized: MemoryEntry =
            serde_json::from_str(&json).expect("Failed to deserialize entry");

        assert_eq!(entry.id, deserialized.id);
        assert_eq!(entry.content, deserialized.content);
        assert_eq!(entry.role, deserialized.role);
        assert_eq!(entry.context, deserialized.context);
    }

    #[test]
    fn test_role_serializes_lowercase() {
        let json = serde_json::to_string(&Role::Assistant).expect("Failed to serialize");
        assert_eq!(json, "\"assistant\"");
    }

    #[test]
    fn test_record_clamps_importance() {
        let record = LongTermRecord::new(
            "x".to_string(),
            vec![0.1; 4],
            1.7,
            Some(true),
            HashMap::new(),
        );
        assert_eq!(record.importance, 1.0);

        let record = LongTermRecord::new(
            "x".to_string(),
            vec![0.1; 4],
            -0.5,
            None,
            HashMap::new(),
        );
        assert_eq!(record.importance, 0.0);
    }

    #[test]
    fn test_record_update_apply() {
        let mut record = LongTermRecord::new(
            "original".to_string(),
            vec![0.1; 4],
            0.4,
            Some(true),
            HashMap::new(),
        );
        let created_at = record.created_at;
        let before = record.updated_at;

        let update = RecordUpdate {
            content: Some("revised".to_string()),
            importance: Some(0.9),
            metadata: None,
        };
        update.apply(&mut record);

        assert_eq!(record.content, "revised");
        assert_eq!(record.importance, 0.9);
        assert_eq!(record.created_at, created_at);
        assert!(record.updated_at >= before);
    }

    #[test]
    fn test_record_update_empty() {
        assert!(RecordUpdate::default().is_empty());
        let update = RecordUpdate {
            importance: Some(0.2),
            ..RecordUpdate::default()
        };
        assert!(!update.is_empty());
    }
}
