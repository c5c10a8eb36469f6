use std::sync::Arc;

use axum::Json;
use axum::extract::State;
use axum::extract::rejection::JsonRejection;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use super::AppState;
use super::errors::{ApiError, map_join_error, map_json_rejection};
use crate::database::lancedb::{SearchResult, StoreOutcome, VectorStore};
use crate::embeddings::TextEmbedder;

pub(crate) const DEFAULT_LIMIT: usize = 5;

#[derive(Debug, Deserialize)]
pub(crate) struct QueryRequest {
    query: String,
    #[serde(default = "default_limit")]
    limit: usize,
}

fn default_limit() -> usize {
    DEFAULT_LIMIT
}

#[derive(Debug, Serialize)]
pub(crate) struct SearchResponse {
    query: String,
    results: Vec<SearchResult>,
    total: usize,
}

#[derive(Debug, Serialize)]
pub(crate) struct ChatResponse {
    query: String,
    response: String,
    total: usize,
}

#[derive(Debug, Serialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub(crate) enum StatusResponse {
    Healthy {
        collection: String,
        document_count: u64,
    },
    Error {
        collection: String,
        message: String,
    },
}

pub(crate) async fn search(
    State(state): State<AppState>,
    payload: Result<Json<QueryRequest>, JsonRejection>,
) -> Result<Json<SearchResponse>, ApiError> {
    let Json(payload) = payload.map_err(map_json_rejection)?;
    let query = validate_query(&payload)?;

    let results = run_search(&state, &query, payload.limit).await?;
    info!("Search for '{}' returned {} results", query, results.len());

    Ok(Json(SearchResponse {
        query,
        total: results.len(),
        results,
    }))
}

pub(crate) async fn chat(
    State(state): State<AppState>,
    payload: Result<Json<QueryRequest>, JsonRejection>,
) -> Result<Json<ChatResponse>, ApiError> {
    let Json(payload) = payload.map_err(map_json_rejection)?;
    let query = validate_query(&payload)?;

    let results = run_search(&state, &query, payload.limit).await?;
    let total = results.len();

    let agent = Arc::clone(&state.agent);
    let prompt_query = query.clone();
    let response =
        tokio::task::spawn_blocking(move || agent.make_conversational(&prompt_query, &results))
            .await
            .map_err(map_join_error)?;

    Ok(Json(ChatResponse {
        query,
        response,
        total,
    }))
}

pub(crate) async fn status(State(state): State<AppState>) -> Result<Json<StatusResponse>, ApiError> {
    let collection = state.config.database.collection.clone();
    let store = VectorStore::open(&state.config, Arc::clone(&state.embedder)).await?;

    let response = match store.count().await {
        StoreOutcome::Success(document_count) => StatusResponse::Healthy {
            collection,
            document_count,
        },
        StoreOutcome::Failure(message) => {
            warn!("Status check could not count documents: {}", message);
            StatusResponse::Error {
                collection,
                message,
            }
        }
    };

    Ok(Json(response))
}

fn validate_query(payload: &QueryRequest) -> Result<String, ApiError> {
    let query = payload.query.trim();
    if query.is_empty() {
        return Err(ApiError::invalid_argument("Query cannot be empty"));
    }
    if payload.limit == 0 {
        return Err(ApiError::invalid_argument("limit must be at least 1"));
    }
    Ok(query.to_string())
}

/// Embed off the async runtime, then query the collection
async fn run_search(
    state: &AppState,
    query: &str,
    limit: usize,
) -> Result<Vec<SearchResult>, ApiError> {
    let embedder = Arc::clone(&state.embedder);
    let text = query.to_string();
    let vector = tokio::task::spawn_blocking(move || embedder.embed(&text))
        .await
        .map_err(map_join_error)??;

    let store = VectorStore::open(&state.config, Arc::clone(&state.embedder)).await?;
    store
        .search_vector(&vector, limit)
        .await
        .into_result()
        .map_err(ApiError::from)
}
