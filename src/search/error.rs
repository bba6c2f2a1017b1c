//! Error types for index and query operations

use crate::error::AppError;
use crate::search::parser::QueryParseError;
use std::sync::Arc;
use tantivy::TantivyError;

/// Result type for search operations
pub type SearchResult<T> = std::result::Result<T, SearchError>;

/// Errors raised by the index engine adapter and the query engine
#[derive(Debug, Clone, thiserror::Error)]
pub enum SearchError {
    /// Index files are damaged or unreadable as an index; repaired by a clear and rebuild
    #[error("Index corruption detected: {0}")]
    IndexCorruption(String),

    /// I/O failure that is not corruption
    #[error("IO error: {0}")]
    Io(Arc<std::io::Error>),

    /// Another writer holds the index lock
    #[error("Index writer lock held: {0}")]
    WriterLocked(String),

    /// Index initialization failed
    #[error("Index initialization failed: {0}")]
    IndexInitFailed(String),

    /// Typed query syntax failure
    #[error(transparent)]
    QueryParse(#[from] QueryParseError),

    /// Schema error
    #[error("Schema error: {0}")]
    SchemaError(String),

    /// Invalid configuration
    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),

    /// Any other engine failure
    #[error("Tantivy error: {0}")]
    TantivyError(String),
}

impl SearchError {
    /// Whether the failure requires clearing the index
    pub fn is_corruption(&self) -> bool {
        matches!(self, SearchError::IndexCorruption(_))
    }
}

impl From<std::io::Error> for SearchError {
    fn from(err: std::io::Error) -> Self {
        SearchError::Io(Arc::new(err))
    }
}

impl From<TantivyError> for SearchError {
    fn from(err: TantivyError) -> Self {
        match err {
            TantivyError::DataCorruption(_)
            | TantivyError::IncompatibleIndex(_)
            | TantivyError::OpenReadError(_) => SearchError::IndexCorruption(err.to_string()),
            TantivyError::IoError(io) => SearchError::Io(io),
            TantivyError::LockFailure(..) => SearchError::WriterLocked(err.to_string()),
            TantivyError::SchemaError(msg) => SearchError::SchemaError(msg),
            other => SearchError::TantivyError(other.to_string()),
        }
    }
}

impl From<SearchError> for AppError {
    fn from(err: SearchError) -> Self {
        match err {
            SearchError::QueryParse(err) => AppError::Validation(err.to_string()),
            SearchError::InvalidConfiguration(msg) => AppError::Configuration(msg),
            SearchError::IndexCorruption(msg) => AppError::IndexCorruption(msg),
            _ => AppError::Internal(err.to_string()),
        }
    }
}
