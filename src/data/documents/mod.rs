#[cfg(test)]
mod tests;

use std::collections::BTreeMap;
use std::path::Path;

use itertools::Itertools;
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::loader::{CellValue, Table};
use crate::{Result, SearchError};

/// Separator placed between column values when several columns form one text
pub const COMBINED_SEPARATOR: &str = " | ";

/// Which column(s) provide the text that gets embedded
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TextColumns {
    Single(String),
    Combined(Vec<String>),
}

impl TextColumns {
    #[inline]
    pub fn names(&self) -> &[String] {
        match self {
            Self::Single(name) => std::slice::from_ref(name),
            Self::Combined(names) => names,
        }
    }
}

impl From<&str> for TextColumns {
    fn from(name: &str) -> Self {
        Self::Single(name.to_string())
    }
}

/// A unit of ingestion: the text to embed plus everything else in the row
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    pub id: u64,
    pub text: String,
    pub metadata: BTreeMap<String, CellValue>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_file: Option<String>,
}

/// Convert every record of `table` into a document, ids by position
#[inline]
pub fn build_documents(table: &Table, text_columns: &TextColumns) -> Result<Vec<Document>> {
    let names = text_columns.names();
    if names.is_empty() {
        return Err(SearchError::Config(
            "At least one text column must be given".to_string(),
        ));
    }
    ensure_columns(table, names)?;

    let texts: Vec<String> = match text_columns {
        TextColumns::Single(name) => table.column_values(name).map(CellValue::to_text).collect(),
        TextColumns::Combined(names) => combine_text_columns(table, names, COMBINED_SEPARATOR)?,
    };

    let documents: Vec<Document> = table
        .records()
        .iter()
        .zip(texts)
        .enumerate()
        .map(|(position, (record, text))| Document {
            id: position as u64,
            text,
            metadata: record
                .iter()
                .filter(|(column, _)| !names.iter().any(|n| n.as_str() == *column))
                .map(|(column, value)| (column.to_string(), value.clone()))
                .collect(),
            source_file: None,
        })
        .collect();

    debug!(
        "Built {} documents from text column(s) [{}]",
        documents.len(),
        names.join(", ")
    );
    Ok(documents)
}

/// Join the string forms of `names` per record, in the given column order
#[inline]
pub fn combine_text_columns(table: &Table, names: &[String], separator: &str) -> Result<Vec<String>> {
    ensure_columns(table, names)?;

    Ok(table
        .records()
        .iter()
        .map(|record| {
            names
                .iter()
                .map(|name| record.get(name).map(CellValue::to_text).unwrap_or_default())
                .join(separator)
        })
        .collect())
}

/// Tag documents with the file they were read from
#[inline]
pub fn with_source_file(documents: &mut [Document], source: &Path) {
    let source = source.display().to_string();
    for document in documents {
        document.source_file = Some(source.clone());
    }
}

fn ensure_columns(table: &Table, names: &[String]) -> Result<()> {
    match names.iter().find(|name| !table.has_column(name)) {
        Some(missing) => Err(SearchError::MissingColumn(missing.clone())),
        None => Ok(()),
    }
}
