
use std::collections::{BTreeMap, HashMap, HashSet};
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

use calamine::{Data, Reader, open_workbook_auto};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::{Result, SearchError};

/// File extensions the loader knows how to parse
pub const SUPPORTED_EXTENSIONS: [&str; 3] = ["csv", "xlsx", "xls"];

/// Cell contents treated as missing values in delimited files
const NULL_MARKERS: [&str; 9] = ["", "NA", "N/A", "NaN", "nan", "null", "NULL", "None", "n/a"];

static NULL_CELL: CellValue = CellValue::Null;

/// A single scalar cell read from a tabular file
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum CellValue {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
}

impl CellValue {
    /// Infer a typed value from a raw delimited-text field
    #[inline]
    pub fn from_field(raw: &str) -> Self {
        let trimmed = raw.trim();

        if NULL_MARKERS.contains(&trimmed) {
            return Self::Null;
        }

        match trimmed {
            "true" | "True" | "TRUE" => return Self::Bool(true),
            "false" | "False" | "FALSE" => return Self::Bool(false),
            _ => {}
        }

        if let Ok(int) = trimmed.parse::<i64>() {
            return Self::Int(int);
        }

        if let Ok(float) = trimmed.parse::<f64>() {
            if float.is_nan() {
                return Self::Null;
            }
            return Self::Float(float);
        }

        Self::Text(raw.to_string())
    }

    #[inline]
    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    /// String form used when a cell becomes embedding text; null renders as empty
    #[inline]
    pub fn to_text(&self) -> String {
        match self {
            Self::Null => String::new(),
            Self::Bool(value) => value.to_string(),
            Self::Int(value) => value.to_string(),
            Self::Float(value) => {
                if value.is_finite() && value.fract() == 0.0 && value.abs() < 1e15 {
                    format!("{:.1}", value)
                } else {
                    value.to_string()
                }
            }
            Self::Text(value) => value.clone(),
        }
    }
}

impl fmt::Display for CellValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_text())
    }
}

impl From<&Data> for CellValue {
    fn from(cell: &Data) -> Self {
        match cell {
            Data::Empty => Self::Null,
            Data::Bool(value) => Self::Bool(*value),
            Data::Int(value) => Self::Int(*value),
            Data::Float(value) if value.is_nan() => Self::Null,
            Data::Float(value) => Self::Float(*value),
            Data::String(value) if value.trim().is_empty() => Self::Null,
            Data::String(value) => Self::Text(value.clone()),
            other => Self::Text(other.to_string()),
        }
    }
}

/// Broad type of a column, in the spirit of a dataframe dtype
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ColumnKind {
    Empty,
    Boolean,
    Integer,
    Float,
    Text,
    Mixed,
}

/// One row of source data: column name to value, in header order
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Record {
    cells: Vec<(String, CellValue)>,
}

impl Record {
    #[inline]
    pub fn new(cells: Vec<(String, CellValue)>) -> Self {
        Self { cells }
    }

    #[inline]
    pub fn get(&self, column: &str) -> Option<&CellValue> {
        self.cells
            .iter()
            .find(|(name, _)| name == column)
            .map(|(_, value)| value)
    }

    #[inline]
    pub fn iter(&self) -> impl Iterator<Item = (&str, &CellValue)> {
        self.cells.iter().map(|(name, value)| (name.as_str(), value))
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.cells.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }

    #[inline]
    pub fn to_map(&self) -> BTreeMap<String, CellValue> {
        self.cells.iter().cloned().collect()
    }

    fn set(&mut self, column: &str, value: CellValue) {
        if let Some(slot) = self.cells.iter_mut().find(|(name, _)| name == column) {
            slot.1 = value;
        } else {
            self.cells.push((column.to_string(), value));
        }
    }
}

/// An in-memory table: header plus records
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Table {
    columns: Vec<String>,
    records: Vec<Record>,
}

impl Table {
    #[inline]
    pub fn new(columns: Vec<String>) -> Self {
        Self {
            columns,
            records: Vec::new(),
        }
    }

    /// Append a row of values in column order; short rows are padded with nulls
    #[inline]
    pub fn push_row(&mut self, mut values: Vec<CellValue>) {
        if values.len() > self.columns.len() {
            debug!(
                "Dropping {} trailing fields beyond the header",
                values.len() - self.columns.len()
            );
            values.truncate(self.columns.len());
        }
        values.resize(self.columns.len(), CellValue::Null);

        let cells = self.columns.iter().cloned().zip(values).collect();
        self.records.push(Record::new(cells));
    }

    #[inline]
    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    #[inline]
    pub fn records(&self) -> &[Record] {
        &self.records
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.records.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    #[inline]
    pub fn has_column(&self, column: &str) -> bool {
        self.columns.iter().any(|c| c == column)
    }

    /// Values of one column, top to bottom
    #[inline]
    pub fn column_values<'a>(&'a self, column: &'a str) -> impl Iterator<Item = &'a CellValue> {
        self.records
            .iter()
            .map(move |record| record.get(column).unwrap_or(&NULL_CELL))
    }

    #[inline]
    pub fn null_count(&self, column: &str) -> usize {
        self.column_values(column).filter(|v| v.is_null()).count()
    }

    #[inline]
    pub fn column_kind(&self, column: &str) -> ColumnKind {
        let mut kind = ColumnKind::Empty;

        for value in self.column_values(column) {
            let value_kind = match value {
                CellValue::Null => continue,
                CellValue::Bool(_) => ColumnKind::Boolean,
                CellValue::Int(_) => ColumnKind::Integer,
                CellValue::Float(_) => ColumnKind::Float,
                CellValue::Text(_) => return ColumnKind::Text,
            };

            kind = match (kind, value_kind) {
                (ColumnKind::Empty, next) => next,
                (current, next) if current == next => current,
                (ColumnKind::Integer, ColumnKind::Float) | (ColumnKind::Float, ColumnKind::Integer) => {
                    ColumnKind::Float
                }
                _ => ColumnKind::Mixed,
            };
        }

        kind
    }

    /// Add (or replace) a column with one value per record
    #[inline]
    pub fn set_column(&mut self, column: &str, values: Vec<CellValue>) -> Result<()> {
        if values.len() != self.records.len() {
            return Err(SearchError::Data(format!(
                "Column '{}' has {} values but the table has {} rows",
                column,
                values.len(),
                self.records.len()
            )));
        }

        if !self.has_column(column) {
            self.columns.push(column.to_string());
        }

        for (record, value) in self.records.iter_mut().zip(values) {
            record.set(column, value);
        }

        Ok(())
    }

    /// The first `rows` records as a new table
    #[inline]
    pub fn head(&self, rows: usize) -> Self {
        Self {
            columns: self.columns.clone(),
            records: self.records.iter().take(rows).cloned().collect(),
        }
    }
}

/// Descriptive statistics about a data file
#[derive(Debug, Clone, Serialize)]
pub struct FileInfo {
    pub path: PathBuf,
    pub size_mb: f64,
    pub total_records: usize,
    pub total_columns: usize,
    pub columns: Vec<String>,
    pub column_kinds: BTreeMap<String, ColumnKind>,
    pub null_counts: BTreeMap<String, usize>,
    pub sample: Vec<BTreeMap<String, CellValue>>,
}

/// Whether `path` has one of the supported extensions
#[inline]
pub fn is_supported(path: &Path) -> bool {
    extension_of(path).is_some_and(|ext| SUPPORTED_EXTENSIONS.contains(&ext.as_str()))
}

fn extension_of(path: &Path) -> Option<String> {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(str::to_ascii_lowercase)
}

/// Load a table, choosing the parser from the file extension
#[inline]
pub fn load_file(path: &Path, max_rows: Option<usize>) -> Result<Table> {
    if !path.exists() {
        return Err(SearchError::NotFound(path.to_path_buf()));
    }

    match extension_of(path).as_deref() {
        Some("csv") => load_csv(path, max_rows),
        Some("xlsx" | "xls") => load_excel(path, None, max_rows),
        Some(other) => Err(SearchError::UnsupportedFormat(format!(".{}", other))),
        None => Err(SearchError::UnsupportedFormat(String::from("(no extension)"))),
    }
}

/// Load a delimited file, decoding as UTF-8 with a Latin-1 fallback
#[inline]
pub fn load_csv(path: &Path, max_rows: Option<usize>) -> Result<Table> {
    let bytes = fs::read(path).map_err(|e| {
        SearchError::Data(format!("Failed to read {}: {}", path.display(), e))
    })?;

    let text = match String::from_utf8(bytes) {
        Ok(text) => text,
        Err(err) => {
            warn!(
                "UTF-8 decoding failed for {} ({}), falling back to latin-1",
                path.display(),
                err.utf8_error()
            );
            decode_latin1(err.as_bytes())
        }
    };

    let table = parse_csv(&text, max_rows)
        .map_err(|e| SearchError::Data(format!("Error loading {}: {}", path.display(), e)))?;

    info!(
        "Successfully loaded {} records from {}",
        table.len(),
        path.display()
    );
    Ok(table)
}

/// Decode ISO-8859-1; every byte maps to the code point of the same value
#[inline]
pub fn decode_latin1(bytes: &[u8]) -> String {
    encoding_rs::mem::decode_latin1(bytes).into_owned()
}

/// Parse delimited text with a header row
#[inline]
pub fn parse_csv(text: &str, max_rows: Option<usize>) -> Result<Table> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .from_reader(text.as_bytes());

    let columns: Vec<String> = reader
        .headers()
        .map_err(|e| SearchError::Data(format!("Failed to read header row: {}", e)))?
        .iter()
        .map(|header| header.trim_start_matches('\u{feff}').trim().to_string())
        .collect();

    let mut table = Table::new(dedupe_columns(columns));

    for (index, row) in reader.records().enumerate() {
        if max_rows.is_some_and(|max| index >= max) {
            break;
        }

        let row = row.map_err(|e| SearchError::Data(format!("Malformed row {}: {}", index + 1, e)))?;
        table.push_row(row.iter().map(CellValue::from_field).collect());
    }

    Ok(table)
}

/// Suffix repeated header names with `.1`, `.2`, ... so every column stays addressable
fn dedupe_columns(columns: Vec<String>) -> Vec<String> {
    let mut taken: HashSet<String> = columns.iter().cloned().collect();
    let mut seen: HashSet<String> = HashSet::with_capacity(columns.len());
    let mut suffixes: HashMap<String, usize> = HashMap::new();

    columns
        .into_iter()
        .map(|name| {
            if seen.insert(name.clone()) {
                return name;
            }

            let suffix = suffixes.entry(name.clone()).or_insert(0);
            let renamed = loop {
                *suffix += 1;
                let candidate = format!("{}.{}", name, suffix);
                if !taken.contains(&candidate) {
                    break candidate;
                }
            };
            warn!("Duplicate column '{}' renamed to '{}'", name, renamed);
            taken.insert(renamed.clone());
            seen.insert(renamed.clone());
            renamed
        })
        .collect()
}

/// Load a spreadsheet; the first sheet is used unless `sheet_name` is given
#[inline]
pub fn load_excel(path: &Path, sheet_name: Option<&str>, max_rows: Option<usize>) -> Result<Table> {
    let mut workbook = open_workbook_auto(path).map_err(|e| {
        SearchError::Data(format!("Error loading {}: {}", path.display(), e))
    })?;

    let sheet = match sheet_name {
        Some(name) => name.to_string(),
        None => workbook.sheet_names().first().cloned().ok_or_else(|| {
            SearchError::Data(format!("Workbook {} has no sheets", path.display()))
        })?,
    };

    let range = workbook.worksheet_range(&sheet).map_err(|e| {
        SearchError::Data(format!(
            "Failed to read sheet '{}' of {}: {}",
            sheet,
            path.display(),
            e
        ))
    })?;

    let mut rows = range.rows();
    let Some(header) = rows.next() else {
        warn!("Sheet '{}' of {} is empty", sheet, path.display());
        return Ok(Table::default());
    };

    let columns = header
        .iter()
        .enumerate()
        .map(|(index, cell)| match cell {
            Data::Empty => format!("Unnamed: {}", index),
            other => other.to_string().trim().to_string(),
        })
        .collect();

    let mut table = Table::new(dedupe_columns(columns));
    for row in rows.take(max_rows.unwrap_or(usize::MAX)) {
        table.push_row(row.iter().map(CellValue::from).collect());
    }

    info!(
        "Successfully loaded {} records from {}",
        table.len(),
        path.display()
    );
    Ok(table)
}

/// Gather descriptive statistics about a data file
#[inline]
pub fn file_info(path: &Path) -> Result<FileInfo> {
    let table = load_file(path, None)?;
    let size_bytes = fs::metadata(path)?.len();

    let column_kinds = table
        .columns()
        .iter()
        .map(|c| (c.clone(), table.column_kind(c)))
        .collect();
    let null_counts = table
        .columns()
        .iter()
        .map(|c| (c.clone(), table.null_count(c)))
        .collect();

    Ok(FileInfo {
        path: path.to_path_buf(),
        size_mb: (size_bytes as f64 / (1024.0 * 1024.0) * 100.0).round() / 100.0,
        total_records: table.len(),
        total_columns: table.columns().len(),
        columns: table.columns().to_vec(),
        column_kinds,
        null_counts,
        sample: table.records().iter().take(3).map(Record::to_map).collect(),
    })
}

/// Discovers data files inside a directory
#[derive(Debug, Clone)]
pub struct DataLoader {
    data_dir: PathBuf,
}

impl DataLoader {
    #[inline]
    pub fn new<P: Into<PathBuf>>(data_dir: P) -> Self {
        Self {
            data_dir: data_dir.into(),
        }
    }

    #[inline]
    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    /// All supported files directly inside the data directory, sorted by path
    #[inline]
    pub fn list_data_files(&self) -> Result<Vec<PathBuf>> {
        self.matching_files(|_| true)
    }

    /// Supported files whose name contains `pattern`
    #[inline]
    pub fn search_files_by_pattern(&self, pattern: &str) -> Result<Vec<PathBuf>> {
        self.matching_files(|name| name.contains(pattern))
    }

    /// Load the first `rows` records of a file
    #[inline]
    pub fn preview(&self, path: &Path, rows: usize) -> Result<Table> {
        Ok(load_file(path, Some(rows))?.head(rows))
    }

    fn matching_files<F>(&self, predicate: F) -> Result<Vec<PathBuf>>
    where
        F: Fn(&str) -> bool,
    {
        if !self.data_dir.is_dir() {
            debug!(
                "Data directory {} does not exist",
                self.data_dir.display()
            );
            return Ok(Vec::new());
        }

        let mut files = Vec::new();
        for entry in fs::read_dir(&self.data_dir)? {
            let path = entry?.path();
            if !path.is_file() || !is_supported(&path) {
                continue;
            }

            let matches = path
                .file_name()
                .and_then(|name| name.to_str())
                .is_some_and(&predicate);
            if matches {
                files.push(path);
            }
        }

        files.sort();
        Ok(files)
    }
}
