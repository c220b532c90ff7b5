//! Consolidation engine
//!
//! Ties the tiers together: every piece of content lands in short-term
//! memory, then an analysis verdict and a similarity search against the
//! long-term backend decide whether it is discarded, merged into an
//! existing record, or inserted as a new one.

use std::collections::HashMap;
use std::sync::Arc;

use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::analysis::{AnalysisHook, Assessment};
use crate::backend::LongTermBackend;
use crate::config::EngineConfig;
use crate::embedding::EmbeddingProvider;
use crate::error::Result;
use crate::memory::short_term::ShortTermStore;
use crate::memory::types::{MemoryEntry, RecordUpdate, Role};

/// What consolidation did with one piece of content.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConsolidationAction {
    /// Judged untruthful; kept in short-term only
    Discarded,
    /// Folded into an existing long-term record
    Merged,
    /// Stored as a new long-term record
    Inserted,
}

/// Outcome of consolidating one piece of content.
#[derive(Debug, Clone)]
pub struct ConsolidationResult {
    /// The decision taken
    pub action: ConsolidationAction,
    /// The long-term record touched, if any
    pub record_id: Option<Uuid>,
    /// Truthfulness verdict used for the decision
    pub truthful: bool,
    /// Importance score used for the decision
    pub importance: f32,
    /// Similarity to the best existing record, when one was found
    pub similarity: Option<f32>,
}

/// The consolidation engine.
///
/// Owns the short-term store; the backend, embedder, and optional analyzer
/// are shared trait objects so callers choose the concrete stack.
pub struct ConsolidationEngine {
    config: EngineConfig,
    short_term: Arc<ShortTermStore>,
    backend: Arc<dyn LongTermBackend>,
    embedder: Arc<dyn EmbeddingProvider>,
    analyzer: Option<Arc<dyn AnalysisHook>>,
}

impl ConsolidationEngine {
    /// Create an engine over the given backend and embedder.
    ///
    /// Fails if `config.max_short_term_size` is zero.
    pub fn new(
        config: EngineConfig,
        backend: Arc<dyn LongTermBackend>,
        embedder: Arc<dyn EmbeddingProvider>,
    ) -> Result<Self> {
        let short_term = Arc::new(ShortTermStore::new(config.max_short_term_size)?);
        info!(
            backend = backend.name(),
            embedder = embedder.name(),
            threshold = config.similarity_threshold,
            capacity = config.max_short_term_size,
            "Consolidation engine initialized"
        );
        Ok(Self {
            config,
            short_term,
            backend,
            embedder,
            analyzer: None,
        })
    }

    /// Attach an analysis hook. Without one, every piece of content gets
    /// [`Assessment::default_scores`].
    pub fn with_analyzer(mut self, analyzer: Arc<dyn AnalysisHook>) -> Self {
        info!(analyzer = analyzer.name(), "Analysis hook attached");
        self.analyzer = Some(analyzer);
        self
    }

    /// Ingest one piece of content and consolidate it.
    ///
    /// The content always enters short-term memory first; the returned
    /// result describes what happened on the long-term side.
    pub async fn process_content(
        &self,
        role: Role,
        content: &str,
        context: Option<&str>,
    ) -> Result<ConsolidationResult> {
        let embedding = self.embedder.embed(content)?;

        let entry = MemoryEntry::new(
            role,
            content.to_string(),
            embedding.clone(),
            context.map(str::to_string),
        );
        self.short_term.insert(entry);

        let assessment = self.assess(content, context).await;
        if !assessment.truthful {
            debug!(role = role.as_str(), "Content judged untruthful, not consolidating");
            return Ok(ConsolidationResult {
                action: ConsolidationAction::Discarded,
                record_id: None,
                truthful: false,
                importance: assessment.importance,
                similarity: None,
            });
        }

        let matches = self
            .backend
            .find_similar(&embedding, self.config.similarity_threshold, 1)
            .await?;

        if let Some((record, similarity)) = matches.into_iter().next() {
            // Merge keeps the stronger importance and refreshes the content
            let merged_importance = record.importance.max(assessment.importance);
            self.backend
                .update_record(
                    record.id,
                    RecordUpdate {
                        content: Some(content.to_string()),
                        importance: Some(merged_importance),
                        metadata: None,
                    },
                )
                .await?;

            info!(
                record_id = %record.id,
                similarity,
                importance = merged_importance,
                "Merged content into existing record"
            );
            return Ok(ConsolidationResult {
                action: ConsolidationAction::Merged,
                record_id: Some(record.id),
                truthful: true,
                importance: merged_importance,
                similarity: Some(similarity),
            });
        }

        let mut metadata = HashMap::new();
        metadata.insert("role".to_string(), role.as_str().to_string());
        if let Some(ctx) = context {
            metadata.insert("context".to_string(), ctx.to_string());
        }

        let record_id = self
            .backend
            .add_record(
                content,
                &embedding,
                assessment.importance,
                Some(true),
                metadata,
            )
            .await?;

        info!(
            record_id = %record_id,
            importance = assessment.importance,
            "Inserted new long-term record"
        );
        Ok(ConsolidationResult {
            action: ConsolidationAction::Inserted,
            record_id: Some(record_id),
            truthful: true,
            importance: assessment.importance,
            similarity: None,
        })
    }

    /// Run the analyzer, falling back to default scores when none is
    /// configured or the call fails.
    async fn assess(&self, content: &str, context: Option<&str>) -> Assessment {
        match &self.analyzer {
            Some(analyzer) => match analyzer.assess(content, context).await {
                Ok(assessment) => assessment,
                Err(e) => {
                    warn!(
                        analyzer = analyzer.name(),
                        error = %e,
                        "Analysis failed, using default scores"
                    );
                    Assessment::default_scores()
                }
            },
            None => Assessment::default_scores(),
        }
    }

    /// All short-term entries, oldest first.
    pub fn get_short_term(&self) -> Vec<MemoryEntry> {
        self.short_term.all()
    }

    /// At most `k` short-term entries nearest to the embedding of `query`.
    pub fn query_short_term(&self, query: &str, k: usize) -> Result<Vec<(MemoryEntry, f32)>> {
        let embedding = self.embedder.embed(query)?;
        Ok(self.short_term.query_similar(&embedding, k))
    }

    /// All long-term records from the backend.
    pub async fn get_long_term(&self) -> Result<Vec<crate::memory::types::LongTermRecord>> {
        self.backend.get_all().await
    }

    /// The short-term store, for direct inspection.
    pub fn short_term(&self) -> &ShortTermStore {
        &self.short_term
    }

    /// Engine configuration in effect.
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }
}
