use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

use crate::excel::ExcelError;

#[derive(Error, Debug)]
pub enum DbError {
    #[error("Timed out after {waited:?} waiting for the write lock on {path}")]
    LockTimeout { path: PathBuf, waited: Duration },

    #[error("Written workbook failed validation: {0}")]
    WriteValidation(String),

    #[error("Table {0} does not exist")]
    UnknownTable(String),

    #[error("Store {path} is corrupt: {reason}")]
    CorruptStore { path: PathBuf, reason: String },

    #[error("Source sheet {sheet} not found in import file")]
    ImportMapping { sheet: String },

    #[error("Row {index} out of range for table {table} ({len} rows)")]
    RowOutOfRange { table: String, index: usize, len: usize },

    #[error("Excel error: {0}")]
    Excel(#[from] ExcelError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl DbError {
    /// Errors a caller can reasonably retry.
    pub fn is_retryable(&self) -> bool {
        matches!(self, DbError::LockTimeout { .. })
    }
}
