//! File-embedded backend on LanceDB
//!
//! Stores records in a local Lance table. The underlying engine is not safe
//! for concurrent writers, so all mutations are serialized through a single
//! write lock held by this process.

use std::collections::HashMap;
use std::sync::Arc;

use arrow_array::{
    Array, BooleanArray, FixedSizeListArray, Float32Array, RecordBatch, RecordBatchIterator,
    StringArray, TimestampMicrosecondArray,
};
use arrow_schema::{DataType, Field, Schema, TimeUnit};
use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use futures::TryStreamExt;
use lancedb::Table;
use lancedb::connection::Connection;
use lancedb::query::{ExecutableQuery, QueryBase};
use tokio::sync::Mutex;
use tracing::{debug, info};
use uuid::Uuid;

use crate::backend::{LongTermBackend, rank_candidates};
use crate::config::FileBackendConfig;
use crate::error::{MemoryError, Result};
use crate::memory::types::{LongTermRecord, RecordUpdate};

const RECORDS_TABLE: &str = "long_term_records";

/// Long-term backend backed by an embedded LanceDB database.
///
/// Construction is eager: the database directory is opened and the records
/// table is created or opened before the backend is handed to the engine.
pub struct LanceBackend {
    #[allow(dead_code)]
    connection: Connection,
    table: Table,
    dimension: i32,
    // Single-writer discipline for the embedded engine
    write_lock: Mutex<()>,
}

impl LanceBackend {
    /// Open (or initialize) the database at `config.data_dir`.
    ///
    /// Fails with [`MemoryError::BackendConnection`] when the directory is
    /// unusable or the table cannot be created.
    pub async fn connect(config: &FileBackendConfig) -> Result<Self> {
        let uri = config
            .data_dir
            .to_str()
            .ok_or_else(|| MemoryError::BackendConnection("Invalid path encoding".to_string()))?;

        let connection = lancedb::connect(uri)
            .execute()
            .await
            .map_err(|e| MemoryError::BackendConnection(format!("Failed to open LanceDB: {e}")))?;

        let dimension = config.dimension as i32;
        let names = connection
            .table_names()
            .execute()
            .await
            .map_err(|e| MemoryError::BackendConnection(format!("Failed to list tables: {e}")))?;

        let table = if names.contains(&RECORDS_TABLE.to_string()) {
            connection
                .open_table(RECORDS_TABLE)
                .execute()
                .await
                .map_err(|e| {
                    MemoryError::BackendConnection(format!("Failed to open records table: {e}"))
                })?
        } else {
            let schema = Self::records_schema(dimension);
            let batch = Self::empty_batch(schema.clone(), dimension)?;
            let batches = RecordBatchIterator::new(vec![Ok(batch)], schema);
            connection
                .create_table(RECORDS_TABLE, Box::new(batches))
                .execute()
                .await
                .map_err(|e| {
                    MemoryError::BackendConnection(format!("Failed to create records table: {e}"))
                })?
        };

        info!(path = %config.data_dir.display(), dimension, "LanceBackend ready");

        Ok(Self {
            connection,
            table,
            dimension,
            write_lock: Mutex::new(()),
        })
    }

    fn records_schema(dimension: i32) -> Arc<Schema> {
        Arc::new(Schema::new(vec![
            Field::new("id", DataType::Utf8, false),
            Field::new("content", DataType::Utf8, false),
            Field::new(
                "embedding",
                DataType::FixedSizeList(
                    Arc::new(Field::new("item", DataType::Float32, true)),
                    dimension,
                ),
                false,
            ),
            Field::new("importance", DataType::Float32, false),
            Field::new("truthfulness", DataType::Boolean, true),
            Field::new("metadata", DataType::Utf8, false),
            Field::new(
                "created_at",
                DataType::Timestamp(TimeUnit::Microsecond, Some("UTC".into())),
                false,
            ),
            Field::new(
                "updated_at",
                DataType::Timestamp(TimeUnit::Microsecond, Some("UTC".into())),
                false,
            ),
        ]))
    }

    fn empty_batch(schema: Arc<Schema>, dimension: i32) -> Result<RecordBatch> {
        let empty_strings: Vec<Option<&str>> = vec![];
        let empty_floats: Vec<f32> = vec![];
        let empty_bools: Vec<Option<bool>> = vec![];
        let empty_timestamps: Vec<i64> = vec![];
        let empty_embeddings: Vec<Option<Vec<Option<f32>>>> = vec![];

        RecordBatch::try_new(
            schema,
            vec![
                Arc::new(StringArray::from(empty_strings.clone())),
                Arc::new(StringArray::from(empty_strings.clone())),
                Arc::new(FixedSizeListArray::from_iter_primitive::<
                    arrow_array::types::Float32Type,
                    _,
                    _,
                >(empty_embeddings, dimension)),
                Arc::new(Float32Array::from(empty_floats)),
                Arc::new(BooleanArray::from(empty_bools)),
                Arc::new(StringArray::from(empty_strings)),
                Arc::new(
                    TimestampMicrosecondArray::from(empty_timestamps.clone()).with_timezone("UTC"),
                ),
                Arc::new(TimestampMicrosecondArray::from(empty_timestamps).with_timezone("UTC")),
            ],
        )
        .map_err(|e| MemoryError::Storage(format!("Failed to create empty batch: {e}")))
    }

    fn record_to_batch(record: &LongTermRecord, schema: Arc<Schema>, dimension: i32) -> Result<RecordBatch> {
        let metadata_json = serde_json::to_string(&record.metadata)
            .map_err(|e| MemoryError::Serialization(e.to_string()))?;

        let embedding: Vec<Option<Vec<Option<f32>>>> =
            vec![Some(record.embedding.iter().map(|&v| Some(v)).collect())];

        RecordBatch::try_new(
            schema,
            vec![
                Arc::new(StringArray::from(vec![record.id.to_string()])),
                Arc::new(StringArray::from(vec![record.content.as_str()])),
                Arc::new(FixedSizeListArray::from_iter_primitive::<
                    arrow_array::types::Float32Type,
                    _,
                    _,
                >(embedding, dimension)),
                Arc::new(Float32Array::from(vec![record.importance])),
                Arc::new(BooleanArray::from(vec![record.truthfulness])),
                Arc::new(StringArray::from(vec![metadata_json.as_str()])),
                Arc::new(
                    TimestampMicrosecondArray::from(vec![record.created_at.timestamp_micros()])
                        .with_timezone("UTC"),
                ),
                Arc::new(
                    TimestampMicrosecondArray::from(vec![record.updated_at.timestamp_micros()])
                        .with_timezone("UTC"),
                ),
            ],
        )
        .map_err(|e| MemoryError::Storage(format!("Failed to create RecordBatch: {e}")))
    }

    fn batch_to_record(batch: &RecordBatch, row: usize) -> Result<LongTermRecord> {
        let id_array = batch
            .column(0)
            .as_any()
            .downcast_ref::<StringArray>()
            .ok_or_else(|| MemoryError::Storage("Failed to get id column".to_string()))?;

        let content_array = batch
            .column(1)
            .as_any()
            .downcast_ref::<StringArray>()
            .ok_or_else(|| MemoryError::Storage("Failed to get content column".to_string()))?;

        let embedding_array = batch
            .column(2)
            .as_any()
            .downcast_ref::<FixedSizeListArray>()
            .ok_or_else(|| MemoryError::Storage("Failed to get embedding column".to_string()))?;

        let importance_array = batch
            .column(3)
            .as_any()
            .downcast_ref::<Float32Array>()
            .ok_or_else(|| MemoryError::Storage("Failed to get importance column".to_string()))?;

        let truthfulness_array = batch
            .column(4)
            .as_any()
            .downcast_ref::<BooleanArray>()
            .ok_or_else(|| MemoryError::Storage("Failed to get truthfulness column".to_string()))?;

        let metadata_array = batch
            .column(5)
            .as_any()
            .downcast_ref::<StringArray>()
            .ok_or_else(|| MemoryError::Storage("Failed to get metadata column".to_string()))?;

        let created_at_array = batch
            .column(6)
            .as_any()
            .downcast_ref::<TimestampMicrosecondArray>()
            .ok_or_else(|| MemoryError::Storage("Failed to get created_at column".to_string()))?;

        let updated_at_array = batch
            .column(7)
            .as_any()
            .downcast_ref::<TimestampMicrosecondArray>()
            .ok_or_else(|| MemoryError::Storage("Failed to get updated_at column".to_string()))?;

        let id = Uuid::parse_str(id_array.value(row))
            .map_err(|e| MemoryError::Storage(format!("Failed to parse UUID: {e}")))?;

        let embedding_list = embedding_array.value(row);
        let embedding_values = embedding_list
            .as_any()
            .downcast_ref::<Float32Array>()
            .ok_or_else(|| MemoryError::Storage("Failed to get embedding values".to_string()))?;
        let embedding: Vec<f32> = (0..embedding_values.len())
            .map(|i| embedding_values.value(i))
            .collect();

        let truthfulness = if truthfulness_array.is_null(row) {
            None
        } else {
            Some(truthfulness_array.value(row))
        };

        let metadata: HashMap<String, String> = serde_json::from_str(metadata_array.value(row))
            .map_err(|e| MemoryError::Serialization(format!("Bad metadata JSON: {e}")))?;

        let created_at = Utc
            .timestamp_micros(created_at_array.value(row))
            .single()
            .ok_or_else(|| MemoryError::Storage("Failed to parse created_at".to_string()))?;

        let updated_at = Utc
            .timestamp_micros(updated_at_array.value(row))
            .single()
            .ok_or_else(|| MemoryError::Storage("Failed to parse updated_at".to_string()))?;

        Ok(LongTermRecord {
            id,
            content: content_array.value(row).to_string(),
            embedding,
            importance: importance_array.value(row),
            truthfulness,
            metadata,
            created_at,
            updated_at,
        })
    }

    async fn collect_records(
        &self,
        stream: impl futures::Stream<Item = lancedb::error::Result<RecordBatch>> + Unpin,
    ) -> Result<Vec<LongTermRecord>> {
        let batches: Vec<RecordBatch> = stream
            .try_collect()
            .await
            .map_err(|e| MemoryError::Storage(format!("Failed to collect query results: {e}")))?;

        let mut records = Vec::new();
        for batch in &batches {
            for row in 0..batch.num_rows() {
                records.push(Self::batch_to_record(batch, row)?);
            }
        }
        Ok(records)
    }
}

#[async_trait]
impl LongTermBackend for LanceBackend {
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

        let schema = Self::records_schema(self.dimension);
        let batch = Self::record_to_batch(&record, schema.clone(), self.dimension)?;
        let batches = RecordBatchIterator::new(vec![Ok(batch)], schema);

        let _guard = self.write_lock.lock().await;
        self.table
            .add(Box::new(batches))
            .execute()
            .await
            .map_err(|e| MemoryError::Storage(format!("Failed to insert record: {e}")))?;

        debug!(record_id = %record.id, "Inserted long-term record");
        Ok(record.id)
    }

    async fn find_similar(
        &self,
        embedding: &[f32],
        threshold: f32,
        k: usize,
    ) -> Result<Vec<(LongTermRecord, f32)>> {
        let stream = self
            .table
            .query()
            .nearest_to(embedding)
            .map_err(|e| MemoryError::Storage(format!("Failed to create vector query: {e}")))?
            .limit(k.max(1))
            .execute()
            .await
            .map_err(|e| MemoryError::Storage(format!("Failed to execute search: {e}")))?;

        let candidates = self.collect_records(stream).await?;
        Ok(rank_candidates(candidates, embedding, threshold, k))
    }

    async fn update_record(&self, id: Uuid, update: RecordUpdate) -> Result<()> {
        // Existence check and mutation stay under one lock acquisition
        let _guard = self.write_lock.lock().await;
        if self.get_by_id(id).await?.is_none() {
            return Err(MemoryError::RecordNotFound(id));
        }

        let mut builder = self.table.update().only_if(format!("id = '{id}'"));

        if let Some(content) = &update.content {
            let escaped = content.replace('\'', "''");
            builder = builder.column("content", format!("'{escaped}'"));
        }
        if let Some(importance) = update.importance {
            builder = builder.column("importance", format!("{}", importance.clamp(0.0, 1.0)));
        }
        if let Some(metadata) = &update.metadata {
            let json = serde_json::to_string(metadata)
                .map_err(|e| MemoryError::Serialization(e.to_string()))?;
            let escaped = json.replace('\'', "''");
            builder = builder.column("metadata", format!("'{escaped}'"));
        }
        builder = builder.column("updated_at", format!("{}", Utc::now().timestamp_micros()));

        builder
            .execute()
            .await
            .map_err(|e| MemoryError::Storage(format!("Failed to update record: {e}")))?;

        debug!(record_id = %id, "Updated long-term record");
        Ok(())
    }

    async fn get_all(&self) -> Result<Vec<LongTermRecord>> {
        let stream = self
            .table
            .query()
            .execute()
            .await
            .map_err(|e| MemoryError::Storage(format!("Failed to list records: {e}")))?;
        self.collect_records(stream).await
    }

    async fn get_by_id(&self, id: Uuid) -> Result<Option<LongTermRecord>> {
        let stream = self
            .table
            .query()
            .only_if(format!("id = '{id}'"))
            .execute()
            .await
            .map_err(|e| MemoryError::Storage(format!("Failed to query record: {e}")))?;

        let mut records = self.collect_records(stream).await?;
        Ok(if records.is_empty() {
            None
        } else {
            Some(records.remove(0))
        })
    }

    fn name(&self) -> &'static str {
        "lance"
    }
}
