
use super::{CollectionInfo, Point, SearchResult, StoreOutcome, UpsertSummary};
use crate::data::Document;
use crate::embeddings::TextEmbedder;
use crate::{Result, SearchError, config::Config};
use arrow::array::{
    Array, FixedSizeListArray, Float32Array, RecordBatchIterator, StringArray, UInt64Array,
};
use arrow::datatypes::{DataType, Field, Schema};
use arrow::record_batch::RecordBatch;
use futures::TryStreamExt;
use indicatif::{ProgressBar, ProgressStyle};
use lancedb::{
    Connection, DistanceType, Table,
    query::{ExecutableQuery, QueryBase, Select},
};
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// One collection of points in LanceDB, searched by cosine similarity
pub struct VectorStore {
    connection: Connection,
    table_name: String,
    batch_size: usize,
    embedder: Arc<dyn TextEmbedder>,
}

impl VectorStore {
    /// Connect to the configured database; the collection itself is not touched
    #[inline]
    pub async fn open(config: &Config, embedder: Arc<dyn TextEmbedder>) -> Result<Self> {
        let uri = config.vector_database_uri();
        debug!("Connecting to LanceDB at {}", uri);

        if !uri.contains("://") {
            std::fs::create_dir_all(&uri).map_err(|e| {
                SearchError::Database(format!("Failed to create vector database directory: {}", e))
            })?;
        }

        let connection = lancedb::connect(&uri)
            .execute()
            .await
            .map_err(|e| SearchError::Database(format!("Failed to connect to LanceDB: {}", e)))?;

        Ok(Self {
            connection,
            table_name: config.database.collection.clone(),
            batch_size: config.database.batch_size.max(1),
            embedder,
        })
    }

    #[inline]
    pub fn collection_name(&self) -> &str {
        &self.table_name
    }

    /// Drop and recreate the collection sized to the embedder's dimension
    #[inline]
    pub async fn create_collection(&self) -> Result<StoreOutcome<()>> {
        let dimension = self.embedder.dimension()?;

        let outcome = StoreOutcome::from(self.recreate_table(dimension).await);
        match &outcome {
            StoreOutcome::Success(()) => info!(
                "Created collection '{}' with {} dimensions (cosine distance)",
                self.table_name, dimension
            ),
            StoreOutcome::Failure(message) => {
                error!("Error creating collection '{}': {}", self.table_name, message);
            }
        }
        Ok(outcome)
    }

    /// Remove the collection; a collection that does not exist counts as removed
    #[inline]
    pub async fn delete_collection(&self) -> StoreOutcome<()> {
        let outcome = StoreOutcome::from(self.drop_table_if_exists().await);
        if let StoreOutcome::Failure(message) = &outcome {
            error!("Error deleting collection '{}': {}", self.table_name, message);
        }
        outcome
    }

    /// Insert or overwrite points by id, `batch_size` points per write
    #[inline]
    pub async fn upsert_batch(&self, points: Vec<Point>) -> StoreOutcome<UpsertSummary> {
        if points.is_empty() {
            debug!("No points to upsert");
            return StoreOutcome::Success(UpsertSummary {
                points: 0,
                batches: 0,
            });
        }

        let table = match self.open_table().await {
            Ok(table) => table,
            Err(e) => {
                error!("Error upserting into '{}': {}", self.table_name, e);
                return StoreOutcome::from(Err(e));
            }
        };

        let total_batches = points.len().div_ceil(self.batch_size);
        info!(
            "Inserting {} points in batches of {}...",
            points.len(),
            self.batch_size
        );

        let bar = if console::user_attended_stderr() {
            ProgressBar::new(total_batches as u64).with_style(
                ProgressStyle::with_template("{bar:40} [{pos}/{len}] Upserting {msg}")
                    .expect("style template is valid"),
            )
        } else {
            ProgressBar::hidden()
        };

        let mut summary = UpsertSummary {
            points: 0,
            batches: 0,
        };

        for (index, batch) in points.chunks(self.batch_size).enumerate() {
            bar.set_message(self.table_name.clone());

            if let Err(e) = self.merge_batch(&table, batch).await {
                bar.abandon();
                error!(
                    "Upsert into '{}' stopped after {}/{} batches: {}",
                    self.table_name, summary.batches, total_batches, e
                );
                return StoreOutcome::Failure(format!(
                    "Upsert failed after {}/{} batches ({} points written): {}",
                    summary.batches, total_batches, summary.points, e
                ));
            }

            summary.points += batch.len();
            summary.batches += 1;
            bar.inc(1);
            info!("Processed batch {}/{}", index + 1, total_batches);
        }

        bar.finish_and_clear();
        info!("Successfully upserted {} points", summary.points);
        StoreOutcome::Success(summary)
    }

    /// Whether the collection table is present; listing errors are a `Failure`
    #[inline]
    pub async fn collection_exists(&self) -> StoreOutcome<bool> {
        let outcome = StoreOutcome::from(self.table_exists().await);
        if let StoreOutcome::Failure(message) = &outcome {
            error!("Error checking collection '{}': {}", self.table_name, message);
        }
        outcome
    }

    /// Number of points; a missing collection is a failure, not zero
    #[inline]
    pub async fn count(&self) -> StoreOutcome<u64> {
        let outcome = StoreOutcome::from(self.try_count().await);
        if let StoreOutcome::Failure(message) = &outcome {
            warn!("Error counting documents in '{}': {}", self.table_name, message);
        }
        outcome
    }

    #[inline]
    pub async fn collection_info(&self) -> StoreOutcome<CollectionInfo> {
        let outcome = StoreOutcome::from(self.try_collection_info().await);
        if let StoreOutcome::Failure(message) = &outcome {
            warn!("Error getting collection info for '{}': {}", self.table_name, message);
        }
        outcome
    }

    /// First id free for appending: one past the largest stored id, 0 when empty or absent
    #[inline]
    pub async fn next_point_id(&self) -> StoreOutcome<u64> {
        let outcome = StoreOutcome::from(self.try_next_point_id().await);
        if let StoreOutcome::Failure(message) = &outcome {
            warn!("Error reading ids from '{}': {}", self.table_name, message);
        }
        outcome
    }

    /// Embed `query` and return the nearest documents
    ///
    /// Embedding errors are returned as `Err`; database errors as a `Failure`.
    #[inline]
    pub async fn search(
        &self,
        query: &str,
        limit: usize,
    ) -> Result<StoreOutcome<Vec<SearchResult>>> {
        let vector = self.embedder.embed(query)?;
        Ok(self.search_vector(&vector, limit).await)
    }

    /// Nearest points to `vector`, best first, at most `limit` of them
    #[inline]
    pub async fn search_vector(
        &self,
        vector: &[f32],
        limit: usize,
    ) -> StoreOutcome<Vec<SearchResult>> {
        let outcome = StoreOutcome::from(self.try_search_vector(vector, limit).await);
        match &outcome {
            StoreOutcome::Success(results) => {
                debug!("Search returned {} results", results.len());
            }
            StoreOutcome::Failure(message) => {
                error!("Error searching '{}': {}", self.table_name, message);
            }
        }
        outcome
    }

    async fn open_table(&self) -> Result<Table> {
        self.connection
            .open_table(&self.table_name)
            .execute()
            .await
            .map_err(|e| {
                SearchError::Database(format!("Failed to open table '{}': {}", self.table_name, e))
            })
    }

    async fn table_exists(&self) -> Result<bool> {
        let table_names = self
            .connection
            .table_names()
            .execute()
            .await
            .map_err(|e| SearchError::Database(format!("Failed to list tables: {}", e)))?;

        Ok(table_names.contains(&self.table_name))
    }

    async fn drop_table_if_exists(&self) -> Result<()> {
        if self.table_exists().await? {
            info!("Dropping collection '{}'", self.table_name);
            self.connection
                .drop_table(&self.table_name)
                .await
                .map_err(|e| SearchError::Database(format!("Failed to drop table: {}", e)))?;
        } else {
            debug!("Collection '{}' does not exist, nothing to drop", self.table_name);
        }

        Ok(())
    }

    async fn recreate_table(&self, dimension: usize) -> Result<()> {
        self.drop_table_if_exists().await?;

        self.connection
            .create_empty_table(&self.table_name, Self::create_schema(dimension))
            .execute()
            .await
            .map_err(|e| SearchError::Database(format!("Failed to create table: {}", e)))?;

        Ok(())
    }

    /// Vector dimension recorded in the table schema
    async fn detect_vector_dimension(table: &Table) -> Result<usize> {
        let schema = table
            .schema()
            .await
            .map_err(|e| SearchError::Database(format!("Failed to get table schema: {}", e)))?;

        for field in schema.fields() {
            if field.name() == "vector" {
                if let DataType::FixedSizeList(_, size) = field.data_type() {
                    return Ok(*size as usize);
                }
            }
        }

        Err(SearchError::Database(
            "Could not find vector column or determine dimension".to_string(),
        ))
    }

    fn create_schema(dimension: usize) -> Arc<Schema> {
        Arc::new(Schema::new(vec![
            Field::new("id", DataType::UInt64, false),
            Field::new(
                "vector",
                DataType::FixedSizeList(
                    Arc::new(Field::new("item", DataType::Float32, true)),
                    dimension as i32,
                ),
                false,
            ),
            Field::new("text", DataType::Utf8, false),
            Field::new("document_id", DataType::UInt64, false),
            Field::new("source_file", DataType::Utf8, true),
            Field::new("metadata", DataType::Utf8, false),
        ]))
    }

    async fn merge_batch(&self, table: &Table, points: &[Point]) -> Result<()> {
        let dimension = Self::detect_vector_dimension(table).await?;
        let record_batch = Self::create_record_batch(points, dimension)?;

        let schema = record_batch.schema();
        let reader = RecordBatchIterator::new(std::iter::once(Ok(record_batch)), schema);

        let mut merge = table.merge_insert(&["id"]);
        merge
            .when_matched_update_all(None)
            .when_not_matched_insert_all();
        merge
            .execute(Box::new(reader))
            .await
            .map_err(|e| SearchError::Database(format!("Failed to upsert points: {}", e)))?;

        Ok(())
    }

    fn create_record_batch(points: &[Point], dimension: usize) -> Result<RecordBatch> {
        let len = points.len();

        let mut ids = Vec::with_capacity(len);
        let mut flat_values = Vec::with_capacity(len * dimension);
        let mut texts = Vec::with_capacity(len);
        let mut document_ids = Vec::with_capacity(len);
        let mut source_files = Vec::with_capacity(len);
        let mut metadata = Vec::with_capacity(len);

        for point in points {
            if point.vector.len() != dimension {
                return Err(SearchError::Database(format!(
                    "Point {} has {} dimensions but the collection expects {}",
                    point.id,
                    point.vector.len(),
                    dimension
                )));
            }

            ids.push(point.id);
            flat_values.extend_from_slice(&point.vector);
            texts.push(point.payload.text.as_str());
            document_ids.push(point.payload.id);
            source_files.push(point.payload.source_file.as_deref());
            metadata.push(serde_json::to_string(&point.payload.metadata).map_err(|e| {
                SearchError::Database(format!("Failed to serialize payload: {}", e))
            })?);
        }

        let field = Arc::new(Field::new("item", DataType::Float32, true));
        let vector_array = FixedSizeListArray::try_new(
            field,
            dimension as i32,
            Arc::new(Float32Array::from(flat_values)),
            None,
        )
        .map_err(|e| SearchError::Database(format!("Failed to create vector array: {}", e)))?;

        let arrays: Vec<Arc<dyn Array>> = vec![
            Arc::new(UInt64Array::from(ids)),
            Arc::new(vector_array),
            Arc::new(StringArray::from(texts)),
            Arc::new(UInt64Array::from(document_ids)),
            Arc::new(StringArray::from(source_files)),
            Arc::new(StringArray::from(metadata)),
        ];

        RecordBatch::try_new(Self::create_schema(dimension), arrays)
            .map_err(|e| SearchError::Database(format!("Failed to create record batch: {}", e)))
    }

    async fn try_count(&self) -> Result<u64> {
        let table = self.open_table().await?;
        let count = table
            .count_rows(None)
            .await
            .map_err(|e| SearchError::Database(format!("Failed to count rows: {}", e)))?;

        Ok(count as u64)
    }

    async fn try_collection_info(&self) -> Result<CollectionInfo> {
        let table = self.open_table().await?;

        let points_count = table
            .count_rows(None)
            .await
            .map_err(|e| SearchError::Database(format!("Failed to count rows: {}", e)))?;
        let dimension = Self::detect_vector_dimension(&table).await?;
        let version = table
            .version()
            .await
            .map_err(|e| SearchError::Database(format!("Failed to read table version: {}", e)))?;

        Ok(CollectionInfo {
            name: self.table_name.clone(),
            points_count: points_count as u64,
            dimension,
            version,
        })
    }

    async fn try_next_point_id(&self) -> Result<u64> {
        if !self.table_exists().await? {
            return Ok(0);
        }

        let table = self.open_table().await?;
        let mut stream = table
            .query()
            .select(Select::Columns(vec!["id".to_string()]))
            .execute()
            .await
            .map_err(|e| SearchError::Database(format!("Failed to query ids: {}", e)))?;

        let mut max_id: Option<u64> = None;
        while let Some(batch) = stream
            .try_next()
            .await
            .map_err(|e| SearchError::Database(format!("Failed to read id stream: {}", e)))?
        {
            let ids = u64_column(&batch, "id")?;
            for row in 0..ids.len() {
                max_id = max_id.max(Some(ids.value(row)));
            }
        }

        Ok(max_id.map_or(0, |id| id + 1))
    }

    async fn try_search_vector(&self, vector: &[f32], limit: usize) -> Result<Vec<SearchResult>> {
        if limit == 0 {
            return Ok(Vec::new());
        }

        let table = self.open_table().await?;
        let mut stream = table
            .vector_search(vector)
            .map_err(|e| SearchError::Database(format!("Failed to create vector search: {}", e)))?
            .column("vector")
            .distance_type(DistanceType::Cosine)
            .limit(limit)
            .execute()
            .await
            .map_err(|e| SearchError::Database(format!("Failed to execute search: {}", e)))?;

        let mut results = Vec::new();
        while let Some(batch) = stream
            .try_next()
            .await
            .map_err(|e| SearchError::Database(format!("Failed to read result stream: {}", e)))?
        {
            results.extend(Self::parse_search_batch(&batch)?);
        }

        results.sort_by(|a, b| b.score.total_cmp(&a.score));
        results.truncate(limit);
        Ok(results)
    }

    fn parse_search_batch(batch: &RecordBatch) -> Result<Vec<SearchResult>> {
        let texts = string_column(batch, "text")?;
        let document_ids = u64_column(batch, "document_id")?;
        let source_files = string_column(batch, "source_file")?;
        let metadata = string_column(batch, "metadata")?;
        let distances = batch
            .column_by_name("_distance")
            .and_then(|col| col.as_any().downcast_ref::<Float32Array>());

        (0..batch.num_rows())
            .map(|row| {
                let metadata = serde_json::from_str(metadata.value(row)).map_err(|e| {
                    SearchError::Database(format!("Failed to parse stored metadata: {}", e))
                })?;

                let distance = distances
                    .filter(|d| !d.is_null(row))
                    .map_or(0.0, |d| d.value(row));
                let score = if distance.is_nan() { 0.0 } else { 1.0 - distance };

                Ok(SearchResult {
                    score,
                    data: Document {
                        id: document_ids.value(row),
                        text: texts.value(row).to_string(),
                        metadata,
                        source_file: (!source_files.is_null(row))
                            .then(|| source_files.value(row).to_string()),
                    },
                })
            })
            .collect()
    }
}

fn string_column<'a>(batch: &'a RecordBatch, name: &str) -> Result<&'a StringArray> {
    batch
        .column_by_name(name)
        .ok_or_else(|| SearchError::Database(format!("Missing {} column", name)))?
        .as_any()
        .downcast_ref::<StringArray>()
        .ok_or_else(|| SearchError::Database(format!("Invalid {} column type", name)))
}

fn u64_column<'a>(batch: &'a RecordBatch, name: &str) -> Result<&'a UInt64Array> {
    batch
        .column_by_name(name)
        .ok_or_else(|| SearchError::Database(format!("Missing {} column", name)))?
        .as_any()
        .downcast_ref::<UInt64Array>()
        .ok_or_else(|| SearchError::Database(format!("Invalid {} column type", name)))
}
