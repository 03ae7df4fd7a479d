//! Error types for the search and chunking subsystem
//!
//! This module provides structured error types using thiserror so callers
//! get actionable messages and a stable status code per failure kind.

use crate::embedding::EmbedderError;
use crate::vector::VectorError;
use std::path::PathBuf;
use thiserror::Error;

/// Main error type for engine, chunking and persistence operations
#[derive(Error, Debug)]
pub enum SearchError {
    /// Caller supplied a value outside the accepted domain
    #[error("Invalid argument: {reason}")]
    InvalidArgument { reason: String },

    #[error(
        "Vector dimension mismatch: expected {expected}, got {actual}\nSuggestion: Ensure all vectors come from the same embedding model"
    )]
    DimensionMismatch { expected: usize, actual: usize },

    #[error(
        "No open incremental search with fetch key {fetch_key}\nSuggestion: The search was completed or never started, open a new one"
    )]
    UnknownCursor { fetch_key: u64 },

    /// A named archive entry is missing or does not decode
    #[error(
        "Archive entry '{name}' is missing or corrupt: {reason}\nSuggestion: Rebuild the archive from the source documents"
    )]
    CorruptArchiveEntry { name: String, reason: String },

    #[error("Vector index operation failed: {0}")]
    IndexBackend(String),

    #[error(transparent)]
    Embedder(#[from] EmbedderError),

    #[error("I/O error on '{path}': {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Configuration error: {0}\nSuggestion: Check .ragsearch/settings.toml")]
    Config(String),
}

impl SearchError {
    pub fn invalid_argument(reason: impl Into<String>) -> Self {
        Self::InvalidArgument {
            reason: reason.into(),
        }
    }

    pub fn corrupt_entry(name: impl Into<String>, reason: impl ToString) -> Self {
        Self::CorruptArchiveEntry {
            name: name.into(),
            reason: reason.to_string(),
        }
    }

    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Get a stable status code for this error type.
    ///
    /// Used by the CLI's JSON output for programmatic error handling.
    pub fn status_code(&self) -> String {
        match self {
            Self::InvalidArgument { .. } => "INVALID_ARGUMENT",
            Self::DimensionMismatch { .. } => "DIMENSION_MISMATCH",
            Self::UnknownCursor { .. } => "UNKNOWN_CURSOR",
            Self::CorruptArchiveEntry { .. } => "CORRUPT_ARCHIVE_ENTRY",
            Self::IndexBackend(_) => "INDEX_BACKEND_ERROR",
            Self::Embedder(_) => "EMBEDDER_ERROR",
            Self::Io { .. } => "IO_ERROR",
            Self::Config(_) => "CONFIG_ERROR",
        }
        .to_string()
    }

    /// Get recovery suggestions for this error
    pub fn recovery_suggestions(&self) -> Vec<&'static str> {
        match self {
            Self::CorruptArchiveEntry { .. } => vec![
                "The in-memory state was left untouched by the failed load",
                "Run 'ragsearch index' on the source files to rebuild the archive",
            ],
            Self::DimensionMismatch { .. } => vec![
                "Archives built with one embedding model cannot be queried with another",
                "Set embedding.model in .ragsearch/settings.toml to the model used at index time",
            ],
            Self::Embedder(_) => vec![
                "Check that the embedding model was downloaded completely",
                "Delete the model cache directory to force a fresh download",
            ],
            Self::Io { .. } => vec![
                "Check that the path exists and you have the needed permissions",
                "Check free disk space in the archive directory",
            ],
            _ => vec![],
        }
    }
}

impl From<VectorError> for SearchError {
    fn from(err: VectorError) -> Self {
        match err {
            VectorError::DimensionMismatch { expected, actual } => {
                Self::DimensionMismatch { expected, actual }
            }
            VectorError::InvalidDimension { .. } | VectorError::InvalidParameter { .. } => {
                Self::InvalidArgument {
                    reason: err.to_string(),
                }
            }
            other => Self::IndexBackend(other.to_string()),
        }
    }
}

/// Result type alias for search operations
pub type SearchResult<T> = Result<T, SearchError>;
