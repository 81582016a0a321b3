//! Error types for nimble-core

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias using our Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in nimble-core
#[derive(Debug, Error)]
pub enum Error {
    /// The file does not exist
    #[error("file not found: '{0}'")]
    FileNotFound(PathBuf),

    /// The file failed the open/re-save/re-open integrity check
    #[error("corrupt file '{path}': {message}")]
    CorruptFile { path: PathBuf, message: String },

    /// No row carries the `DATA` marker in its first column
    #[error("no 'DATA' header row found in '{0}'")]
    MissingHeaderSentinel(PathBuf),

    /// A join key names a header the dataset does not have
    #[error("join header '{header}' does not exist in '{path}'")]
    InvalidJoinConfiguration { header: String, path: PathBuf },

    /// The dataset was never loaded successfully
    #[error("dataset '{0}' is not loaded")]
    NotReady(PathBuf),

    /// Failed to read a file
    #[error("failed to read file '{path}': {source}")]
    FileRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Malformed settings file
    #[error("invalid settings in '{path}' line {line}: {message}")]
    Settings {
        path: PathBuf,
        line: usize,
        message: String,
    },

    /// Directory traversal error
    #[error("failed to traverse directory: {0}")]
    WalkDir(#[from] walkdir::Error),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// CSV error from the csv crate
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    /// JSON serialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}
