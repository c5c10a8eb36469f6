// LanceDB vector database module
// Point and outcome types shared by the vector store and its callers


pub mod vector_store;

pub use vector_store::VectorStore;

use serde::Serialize;

use crate::data::Document;
use crate::{Result, SearchError};

/// A vector with its id and the document it was computed from
#[derive(Debug, Clone, PartialEq)]
pub struct Point {
    pub id: u64,
    pub vector: Vec<f32>,
    pub payload: Document,
}

/// Result of a store operation whose infrastructure errors are reported, not raised
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreOutcome<T> {
    Success(T),
    Failure(String),
}

impl<T> StoreOutcome<T> {
    #[inline]
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success(_))
    }

    #[inline]
    pub fn ok(self) -> Option<T> {
        match self {
            Self::Success(value) => Some(value),
            Self::Failure(_) => None,
        }
    }

    #[inline]
    pub fn error(&self) -> Option<&str> {
        match self {
            Self::Success(_) => None,
            Self::Failure(message) => Some(message),
        }
    }

    #[inline]
    pub fn unwrap_or(self, default: T) -> T {
        self.ok().unwrap_or(default)
    }

    #[inline]
    pub fn map<U, F: FnOnce(T) -> U>(self, f: F) -> StoreOutcome<U> {
        match self {
            Self::Success(value) => StoreOutcome::Success(f(value)),
            Self::Failure(message) => StoreOutcome::Failure(message),
        }
    }

    /// Escalate a failure into a `Database` error
    #[inline]
    pub fn into_result(self) -> Result<T> {
        match self {
            Self::Success(value) => Ok(value),
            Self::Failure(message) => Err(SearchError::Database(message)),
        }
    }
}

impl<T> From<Result<T>> for StoreOutcome<T> {
    fn from(result: Result<T>) -> Self {
        match result {
            Ok(value) => Self::Success(value),
            Err(SearchError::Database(message)) => Self::Failure(message),
            Err(e) => Self::Failure(e.to_string()),
        }
    }
}

/// How much of an upsert reached the database
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct UpsertSummary {
    pub points: usize,
    pub batches: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CollectionInfo {
    pub name: String,
    pub points_count: u64,
    pub dimension: usize,
    pub version: u64,
}

/// A stored document and its cosine similarity to the query
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SearchResult {
    pub score: f32,
    pub data: Document,
}
