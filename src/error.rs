use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// The one fatal ingest condition: the workbook itself could not be read.
    #[error("Failed to process {}: {message}. Please check the file format.", path.display())]
    WorkbookParse { path: PathBuf, message: String },

    #[error("Unsupported file type: .{0}. Please upload a CSV or Excel file (.csv, .xlsx, .xls)")]
    UnsupportedFormat(String),

    #[error("No file has been loaded")]
    NoWorkbook,

    #[error("Please select at least one sheet")]
    NoSheetsSelected,

    #[error("No data to export. Generate a summary first")]
    NoData,

    #[error("Unknown timezone: {0}")]
    InvalidTimezone(String),
}

pub type Result<T> = std::result::Result<T, AppError>;
