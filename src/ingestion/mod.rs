// Ingestion orchestration
// Loader -> documents -> embedder -> vector store, followed by a count check

#[cfg(test)]
mod tests;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::config::Config;
use crate::data::{
    Document, TEXT_CONTENT_COLUMN, Table, TextColumns, build_documents, load_file,
    prepare_property_data, with_source_file,
};
use crate::database::lancedb::{Point, SearchResult, StoreOutcome, VectorStore};
use crate::embeddings::{Embedder, TextEmbedder};
use crate::{Result, SearchError};

/// What one ingestion run wrote
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct IngestionReport {
    pub collection: String,
    pub documents: usize,
    pub batches: usize,
    /// Point id given to the first document of this run
    pub first_id: u64,
    pub finished_at: DateTime<Utc>,
}

/// Expected versus stored document counts after ingestion
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ValidationReport {
    pub expected: u64,
    pub actual: Option<u64>,
    pub matched: bool,
}

/// Drives documents into the configured collection with one embedder instance
pub struct Ingestor {
    config: Config,
    embedder: Embedder,
}

impl Ingestor {
    #[inline]
    pub fn new(config: Config, embedder: Embedder) -> Self {
        Self { config, embedder }
    }

    #[inline]
    pub fn from_config(config: Config) -> Result<Self> {
        let embedder = Embedder::from_config(&config)?;
        Ok(Self::new(config, embedder))
    }

    #[inline]
    pub fn config(&self) -> &Config {
        &self.config
    }

    #[inline]
    pub fn embedder(&self) -> &Embedder {
        &self.embedder
    }

    /// Ingest every record of `table`, text taken from `text_columns`
    #[inline]
    pub async fn ingest_table(
        &mut self,
        table: &Table,
        text_columns: &TextColumns,
        recreate: bool,
    ) -> Result<IngestionReport> {
        let documents = build_documents(table, text_columns)?;
        self.ingest_documents(documents, recreate).await
    }

    #[inline]
    pub async fn ingest_file(
        &mut self,
        path: &Path,
        text_column: &str,
        recreate: bool,
    ) -> Result<IngestionReport> {
        self.ingest_files(&[path.to_path_buf()], text_column, recreate)
            .await
    }

    /// Ingest several files as one sequence; ids run across all files
    #[inline]
    pub async fn ingest_files(
        &mut self,
        paths: &[PathBuf],
        text_column: &str,
        recreate: bool,
    ) -> Result<IngestionReport> {
        let mut all_documents = Vec::new();

        for path in paths {
            let table = load_file(path, None)?;
            let mut documents = build_documents(&table, &TextColumns::from(text_column))?;
            with_source_file(&mut documents, path);
            info!("Loaded {} documents from {}", documents.len(), path.display());
            all_documents.extend(documents);
        }

        for (position, document) in all_documents.iter_mut().enumerate() {
            document.id = position as u64;
        }

        let report = self.ingest_documents(all_documents, recreate).await?;
        info!(
            "Successfully ingested {} documents from {} files",
            report.documents,
            paths.len()
        );
        Ok(report)
    }

    /// Prepare the configured property file and rebuild the collection from it
    #[inline]
    pub async fn ingest_property_data(&mut self) -> Result<IngestionReport> {
        let path = self.config.property_data_path();
        let table = prepare_property_data(&path, self.config.data.max_rows)?;
        info!("Processed {} rows from {}", table.len(), path.display());

        self.ingest_table(&table, &TextColumns::from(TEXT_CONTENT_COLUMN), true)
            .await
    }

    /// Fit, (re)create, embed and upsert `documents`
    ///
    /// A refit works on a copy of the embedder; the new state is persisted and
    /// adopted only once the upsert has succeeded. Appending never drops an
    /// existing collection and aborts if its existence cannot be determined.
    #[inline]
    pub async fn ingest_documents(
        &mut self,
        documents: Vec<Document>,
        recreate: bool,
    ) -> Result<IngestionReport> {
        if documents.is_empty() {
            return Err(SearchError::Data("No documents to ingest".to_string()));
        }

        let texts: Vec<String> = documents.iter().map(|d| d.text.clone()).collect();
        let mut embedder = self.embedder.clone();
        let mut store = self.open_store(&embedder).await?;

        let create = if recreate {
            true
        } else {
            match store.collection_exists().await {
                StoreOutcome::Success(true) => false,
                StoreOutcome::Success(false) => {
                    info!(
                        "Collection '{}' not found, creating it",
                        store.collection_name()
                    );
                    true
                }
                StoreOutcome::Failure(message) => {
                    return Err(SearchError::Database(format!(
                        "Cannot append to collection '{}': {}",
                        store.collection_name(),
                        message
                    )));
                }
            }
        };

        let refit = recreate || embedder.needs_fit();
        if refit && !create {
            // Existing vectors were built from a vocabulary that is no longer on disk
            warn!(
                "Collection '{}' exists but the {} embedder has no saved state",
                store.collection_name(),
                embedder.name()
            );
            return Err(SearchError::NotFitted);
        }

        if refit {
            embedder.fit_corpus(&texts)?;
            store = self.open_store(&embedder).await?;
        } else {
            debug!("Appending with the existing {} embedder state", embedder.name());
        }

        if create {
            store.create_collection().await?.into_result()?;
        }

        let first_id = if create {
            0
        } else {
            store.next_point_id().await.into_result()?
        };

        let batch_size = self.config.database.batch_size.max(1);
        let mut vectors = Vec::with_capacity(texts.len());
        for (index, chunk) in texts.chunks(batch_size).enumerate() {
            debug!(
                "Embedding batch {}/{}",
                index + 1,
                texts.len().div_ceil(batch_size)
            );
            vectors.extend(embedder.embed_batch(chunk)?);
        }

        let points: Vec<Point> = documents
            .into_iter()
            .zip(vectors)
            .map(|(mut document, vector)| {
                document.id += first_id;
                Point {
                    id: document.id,
                    vector,
                    payload: document,
                }
            })
            .collect();
        let document_count = points.len();

        let summary = store.upsert_batch(points).await.into_result()?;

        if refit {
            embedder.persist(&self.config)?;
        }
        self.embedder = embedder;

        info!(
            "Successfully ingested {} documents into '{}'",
            document_count,
            store.collection_name()
        );

        Ok(IngestionReport {
            collection: store.collection_name().to_string(),
            documents: document_count,
            batches: summary.batches,
            first_id,
            finished_at: Utc::now(),
        })
    }

    /// Compare the collection size with the number of rows that were ingested
    #[inline]
    pub async fn validate(&self, expected: usize) -> Result<ValidationReport> {
        let store = self.open_store(&self.embedder).await?;
        let expected = expected as u64;

        let report = match store.count().await {
            StoreOutcome::Success(actual) => ValidationReport {
                expected,
                actual: Some(actual),
                matched: actual == expected,
            },
            StoreOutcome::Failure(message) => {
                warn!("Could not count documents for validation: {}", message);
                ValidationReport {
                    expected,
                    actual: None,
                    matched: false,
                }
            }
        };

        if report.matched {
            info!(
                "Validation successful: {} rows processed = {} documents in collection",
                expected, expected
            );
        } else if let Some(actual) = report.actual {
            warn!(
                "Validation mismatch: {} rows processed != {} documents in collection",
                expected, actual
            );
        }

        Ok(report)
    }

    #[inline]
    pub async fn search(
        &self,
        query: &str,
        limit: usize,
    ) -> Result<StoreOutcome<Vec<SearchResult>>> {
        let store = self.open_store(&self.embedder).await?;
        store.search(query, limit).await
    }

    async fn open_store(&self, embedder: &Embedder) -> Result<VectorStore> {
        let embedder: Arc<dyn TextEmbedder> = Arc::new(embedder.clone());
        VectorStore::open(&self.config, embedder).await
    }
}
