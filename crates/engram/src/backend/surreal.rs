//! Relational-server backend on SurrealDB
//!
//! Talks to a running SurrealDB server over HTTP. Each operation maps to a
//! single statement; concurrency control is the server's job, so this type
//! holds no locks of its own.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use surrealdb::{
    Surreal,
    engine::any::{Any, connect},
    opt::auth::Root,
};
use tracing::{debug, info};
use uuid::Uuid;

use crate::backend::{LongTermBackend, rank_candidates};
use crate::config::ServerBackendConfig;
use crate::error::{MemoryError, Result};
use crate::memory::types::{LongTermRecord, RecordUpdate};

const RECORDS_TABLE: &str = "memory_record";

/// Row shape stored in SurrealDB.
///
/// The id is kept as a plain UUID string so records keep the same identity
/// across backends.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct RecordRow {
    id: String,
    content: String,
    embedding: Vec<f32>,
    importance: f32,
    truthfulness: Option<bool>,
    metadata: HashMap<String, String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl RecordRow {
    fn from_record(record: &LongTermRecord) -> Self {
        Self {
            id: record.id.to_string(),
            content: record.content.clone(),
            embedding: record.embedding.clone(),
            importance: record.importance,
            truthfulness: record.truthfulness,
            metadata: record.metadata.clone(),
            created_at: record.created_at,
            updated_at: record.updated_at,
        }
    }

    fn into_record(self) -> Result<LongTermRecord> {
        let id = Uuid::parse_str(&self.id)
            .map_err(|e| MemoryError::Storage(format!("Failed to parse record id: {e}")))?;
        Ok(LongTermRecord {
            id,
            content: self.content,
            embedding: self.embedding,
            importance: self.importance,
            truthfulness: self.truthfulness,
            metadata: self.metadata,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}

/// Long-term backend backed by a SurrealDB server.
///
/// Construction authenticates eagerly and selects the configured namespace
/// and database, so an unreachable or misconfigured server fails fast with
/// [`MemoryError::BackendConnection`].
pub struct SurrealBackend {
    db: Surreal<Any>,
}

impl SurrealBackend {
    /// Connect, sign in as root, and select namespace/database.
    pub async fn connect(config: &ServerBackendConfig) -> Result<Self> {
        let db: Surreal<Any> = connect(&config.url).await.map_err(|e| {
            MemoryError::BackendConnection(format!("Failed to reach {}: {e}", config.url))
        })?;

        db.signin(Root {
            username: &config.username,
            password: &config.password,
        })
        .await
        .map_err(|e| MemoryError::BackendConnection(format!("Authentication failed: {e}")))?;

        db.use_ns(&config.namespace)
            .use_db(&config.database)
            .await
            .map_err(|e| {
                MemoryError::BackendConnection(format!(
                    "Failed to select {}/{}: {e}",
                    config.namespace, config.database
                ))
            })?;

        info!(
            url = %config.url,
            namespace = %config.namespace,
            database = %config.database,
            "SurrealBackend ready"
        );

        Ok(Self { db })
    }

    async fn fetch_row(&self, id: Uuid) -> Result<Option<RecordRow>> {
        let row: Option<RecordRow> = self
            .db
            .select((RECORDS_TABLE, id.to_string()))
            .await
            .map_err(|e| MemoryError::Storage(format!("Failed to fetch record: {e}")))?;
        Ok(row)
    }
}

#[async_trait]
impl LongTermBackend for SurrealBackend {
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
        let row = RecordRow::from_record(&record);

        let created: Option<RecordRow> = self
            .db
            .create((RECORDS_TABLE, row.id.clone()))
            .content(row)
            .await
            .map_err(|e| MemoryError::Storage(format!("Failed to insert record: {e}")))?;

        if created.is_none() {
            return Err(MemoryError::Storage(format!(
                "Server did not return created record {}",
                record.id
            )));
        }

        debug!(record_id = %record.id, "Inserted long-term record");
        Ok(record.id)
    }

    async fn find_similar(
        &self,
        embedding: &[f32],
        threshold: f32,
        k: usize,
    ) -> Result<Vec<(LongTermRecord, f32)>> {
        let rows: Vec<RecordRow> = self
            .db
            .query(format!("SELECT * FROM {RECORDS_TABLE}"))
            .await
            .map_err(|e| MemoryError::Storage(format!("Failed to query records: {e}")))?
            .take(0)
            .map_err(|e| MemoryError::Storage(format!("Failed to read query result: {e}")))?;

        let candidates = rows
            .into_iter()
            .map(RecordRow::into_record)
            .collect::<Result<Vec<_>>>()?;

        Ok(rank_candidates(candidates, embedding, threshold, k))
    }

    async fn update_record(&self, id: Uuid, update: RecordUpdate) -> Result<()> {
        let row = self
            .fetch_row(id)
            .await?
            .ok_or(MemoryError::RecordNotFound(id))?;

        let mut record = row.into_record()?;
        update.apply(&mut record);

        let updated: Option<RecordRow> = self
            .db
            .update((RECORDS_TABLE, id.to_string()))
            .content(RecordRow::from_record(&record))
            .await
            .map_err(|e| MemoryError::Storage(format!("Failed to update record: {e}")))?;

        if updated.is_none() {
            return Err(MemoryError::RecordNotFound(id));
        }

        debug!(record_id = %id, "Updated long-term record");
        Ok(())
    }

    async fn get_all(&self) -> Result<Vec<LongTermRecord>> {
        let rows: Vec<RecordRow> = self
            .db
            .query(format!(
                "SELECT * FROM {RECORDS_TABLE} ORDER BY created_at ASC"
            ))
            .await
            .map_err(|e| MemoryError::Storage(format!("Failed to list records: {e}")))?
            .take(0)
            .map_err(|e| MemoryError::Storage(format!("Failed to read query result: {e}")))?;

        rows.into_iter().map(RecordRow::into_record).collect()
    }

    async fn get_by_id(&self, id: Uuid) -> Result<Option<LongTermRecord>> {
        match self.fetch_row(id).await? {
            Some(row) => Ok(Some(row.into_record()?)),
            None => Ok(None),
        }
    }

    fn name(&self) -> &'static str {
        "surreal"
    }
}
