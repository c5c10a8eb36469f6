
use std::path::Path;

use itertools::Itertools;
use serde::Serialize;
use tracing::info;

use super::documents::COMBINED_SEPARATOR;
use super::loader::{CellValue, ColumnKind, Table, load_file};
use crate::{Result, SearchError};

/// Column holding the combined, cleaned text of a prepared property table
pub const TEXT_CONTENT_COLUMN: &str = "text_content";

/// Summary of a processed data file
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProcessedDataReport {
    pub total_records: usize,
    pub has_text_content: bool,
    pub empty_text_records: usize,
    pub columns: Vec<String>,
    pub sample_text: Option<String>,
}

/// Load up to `max_rows` property records and derive a `text_content` column
/// from every text-bearing column
#[inline]
pub fn prepare_property_data(path: &Path, max_rows: usize) -> Result<Table> {
    info!("Loading first {} rows from {}", max_rows, path.display());
    let mut table = load_file(path, Some(max_rows))?;

    let text_columns: Vec<String> = table
        .columns()
        .iter()
        .filter(|column| table.column_kind(column) == ColumnKind::Text)
        .cloned()
        .collect();

    if text_columns.is_empty() {
        return Err(SearchError::Data(format!(
            "No text columns found in {} (columns: {})",
            path.display(),
            table.columns().join(", ")
        )));
    }

    let combined = table
        .records()
        .iter()
        .map(|record| {
            let text = text_columns
                .iter()
                .map(|column| record.get(column).map(clean_text).unwrap_or_default())
                .join(COMBINED_SEPARATOR);
            CellValue::Text(text)
        })
        .collect();
    table.set_column(TEXT_CONTENT_COLUMN, combined)?;

    info!("Processed {} records in memory", table.len());
    info!("Text columns used: [{}]", text_columns.join(", "));

    Ok(table)
}

/// Normalize a cell into single-line text
#[inline]
pub fn clean_text(value: &CellValue) -> String {
    if value.is_null() {
        return String::new();
    }

    value.to_text().split_whitespace().join(" ")
}

/// Report on a file that is expected to carry a `text_content` column
#[inline]
pub fn validate_processed_data(path: &Path) -> Result<ProcessedDataReport> {
    let table = load_file(path, None)?;
    let has_text_content = table.has_column(TEXT_CONTENT_COLUMN);

    let (empty_text_records, sample_text) = if has_text_content {
        (
            table.null_count(TEXT_CONTENT_COLUMN),
            table
                .column_values(TEXT_CONTENT_COLUMN)
                .next()
                .map(CellValue::to_text),
        )
    } else {
        (0, None)
    };

    Ok(ProcessedDataReport {
        total_records: table.len(),
        has_text_content,
        empty_text_records,
        columns: table.columns().to_vec(),
        sample_text,
    })
}
