//! Output sink traits and errors

use crate::output::Row;
use thiserror::Error;

/// Errors that can occur during output operations
#[derive(Debug, Error)]
pub enum OutputError {
    #[error("Failed to write output: {0}")]
    Write(String),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to read site list {path}: {message}")]
    SiteList { path: String, message: String },
}

/// Result type for output operations
pub type OutputResult<T> = Result<T, OutputError>;

/// Destination for result rows
///
/// Files are named relative to the run's results directory. Appends to the
/// same file are atomic with respect to each other; appends to different
/// files do not block each other.
pub trait ResultSink: Send + Sync {
    /// Appends rows to `file`, writing a header first if the file is new
    fn append_rows(&self, file: &str, rows: &[Row]) -> OutputResult<()>;

    /// Writes a binary artifact (e.g. a screenshot) to `file`
    fn write_artifact(&self, file: &str, bytes: &[u8]) -> OutputResult<()>;
}
