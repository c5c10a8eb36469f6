// Database module
// LanceDB-backed vector collections holding property documents

pub mod lancedb;

pub use lancedb::{
    CollectionInfo, Point, SearchResult, StoreOutcome, UpsertSummary, VectorStore,
};
