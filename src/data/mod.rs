// Data module
// Loading tabular property files, preparing text columns and building documents

pub mod documents;
pub mod loader;
pub mod processing;

pub use documents::{
    COMBINED_SEPARATOR, Document, TextColumns, build_documents, combine_text_columns,
    with_source_file,
};
pub use loader::{CellValue, ColumnKind, DataLoader, FileInfo, Record, Table, file_info, load_file};
pub use processing::{
    ProcessedDataReport, TEXT_CONTENT_COLUMN, clean_text, prepare_property_data,
    validate_processed_data,
};
