use std::path::PathBuf;

use thiserror::Error;

pub type Result<T> = std::result::Result<T, SearchError>;

#[derive(Error, Debug)]
pub enum SearchError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Database error: {0}")]
    Database(String),

    #[error("Network error: {0}")]
    Network(String),

    #[error("Embedding error: {0}")]
    Embedding(String),

    #[error("File {} not found", .0.display())]
    NotFound(PathBuf),

    #[error("Unsupported file format: {0} (supported: .csv, .xlsx, .xls)")]
    UnsupportedFormat(String),

    #[error("Column '{0}' not found")]
    MissingColumn(String),

    #[error("Vectorizer has not been fitted; call fit() with the corpus first")]
    NotFitted,

    #[error("Data error: {0}")]
    Data(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Other error: {0}")]
    Other(#[from] anyhow::Error),
}

pub mod chat;
pub mod commands;
pub mod config;
pub mod data;
pub mod database;
pub mod embeddings;
pub mod ingestion;
pub mod server;
