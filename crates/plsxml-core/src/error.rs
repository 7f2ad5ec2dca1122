//! Error types for plsxml-core

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias using our Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in plsxml-core
#[derive(Debug, Error)]
pub enum Error {
    /// Failed to read a file
    #[error("failed to read file '{path}': {source}")]
    FileRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The XML reader rejected the document
    #[error("XML error in '{path}' at byte {position}: {source}")]
    Xml {
        path: PathBuf,
        position: u64,
        #[source]
        source: quick_xml::Error,
    },

    /// The document is well-formed so far but does not have the report shape
    #[error("malformed report '{path}': {message}")]
    Malformed { path: PathBuf, message: String },

    /// A `table` element is missing one of its required attributes
    #[error("<{element}> element in '{path}' is missing required attribute '{attribute}'")]
    MissingAttribute {
        path: PathBuf,
        element: String,
        attribute: String,
    },

    /// Failed to open or read a ZIP archive
    #[error("archive error in '{path}': {source}")]
    Archive {
        path: PathBuf,
        #[source]
        source: zip::result::ZipError,
    },

    /// The path is neither an XML report nor an archive of reports
    #[error("invalid input '{path}': {reason}")]
    InvalidInput { path: PathBuf, reason: String },

    /// Requested table is not in the store
    #[error("table '{0}' not found")]
    TableNotFound(String),

    /// CSV writer error
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}
