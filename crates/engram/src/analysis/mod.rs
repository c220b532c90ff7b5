//! Content analysis hook
//!
//! Optional scoring stage for incoming content. When no hook is configured
//! (or a configured one fails on a call), consolidation proceeds with
//! [`Assessment::default_scores`], so the engine never blocks on analysis.

pub mod remote;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::Result;

pub use remote::RemoteAnalyzer;

/// Scores produced by an analysis hook for one piece of content.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Assessment {
    /// Whether the content is considered truthful
    pub truthful: bool,
    /// Importance score in [0, 1]
    pub importance: f32,
}

impl Assessment {
    /// Scores used when no hook is configured or a hook call fails:
    /// truthful, middling importance.
    pub fn default_scores() -> Self {
        Self {
            truthful: true,
            importance: 0.5,
        }
    }
}

/// A pluggable content analyzer.
#[async_trait]
pub trait AnalysisHook: Send + Sync {
    /// Score `content`, optionally informed by its surrounding `context`.
    async fn assess(&self, content: &str, context: Option<&str>) -> Result<Assessment>;

    /// Hook name for logging
    fn name(&self) -> &'static str;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_scores() {
        let scores = Assessment::default_scores();
        assert!(scores.truthful);
        assert!((scores.importance - 0.5).abs() < f32::EPSILON);
    }

    #[test]
    fn test_assessment_deserializes_from_json() {
        let json = r#"{"truthful": false, "importance": 0.25}"#;
        let assessment: Assessment = serde_json::from_str(json).unwrap();
        assert!(!assessment.truthful);
        assert!((assessment.importance - 0.25).abs() < f32::EPSILON);
    }
}
