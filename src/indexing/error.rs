//! Error types for the indexing pipeline

use crate::error::AppError;
use crate::search::SearchError;
use crate::store::StoreError;

/// Result type for indexing operations
pub type IndexingResult<T> = std::result::Result<T, IndexingError>;

/// Errors raised by the queue, writer coordinator, rebuilder and listener
#[derive(Debug, thiserror::Error)]
pub enum IndexingError {
    /// `drain_one` on an empty queue
    #[error("Index queue is empty")]
    EmptyQueue,

    /// Index engine failure
    #[error(transparent)]
    Search(#[from] SearchError),

    /// Content store failure
    #[error(transparent)]
    Store(#[from] StoreError),

    /// Corruption persisted after the allowed number of repairs
    #[error("Index still corrupt after {attempts} repair attempts: {last_error}")]
    RepeatedCorruption { attempts: u32, last_error: String },

    /// The writer coordinator is no longer running
    #[error("Index updater stopped")]
    UpdaterStopped,

    /// A blocking cycle panicked or was cancelled
    #[error("Index updater task failed: {0}")]
    TaskFailed(String),
}

impl IndexingError {
    pub fn is_corruption(&self) -> bool {
        matches!(self, IndexingError::Search(err) if err.is_corruption())
    }
}

impl From<tokio::task::JoinError> for IndexingError {
    fn from(err: tokio::task::JoinError) -> Self {
        IndexingError::TaskFailed(err.to_string())
    }
}

impl From<IndexingError> for AppError {
    fn from(err: IndexingError) -> Self {
        match err {
            IndexingError::Search(err) => err.into(),
            IndexingError::Store(err) => err.into(),
            IndexingError::RepeatedCorruption { .. } => AppError::IndexCorruption(err.to_string()),
            IndexingError::UpdaterStopped => AppError::InvalidState(err.to_string()),
            _ => AppError::Internal(err.to_string()),
        }
    }
}
