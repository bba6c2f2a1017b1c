//! Content store errors

use crate::error::AppError;
use crate::models::EntityPath;

pub type StoreResult<T> = std::result::Result<T, StoreError>;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// Page does not exist (in the requested language)
    #[error("Entity not found: {path} ({language})")]
    EntityNotFound { path: EntityPath, language: String },

    /// Attachment does not exist on its page
    #[error("Attachment not found: {path}@{filename}")]
    AttachmentNotFound { path: EntityPath, filename: String },

    #[error("Unknown partition: {0}")]
    UnknownPartition(String),

    /// Corpus file could not be read or decoded
    #[error("Invalid corpus: {0}")]
    InvalidCorpus(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Text extraction failure, always tolerated by callers
    #[error("Extraction failed for {filename}: {reason}")]
    ExtractionFailed { filename: String, reason: String },
}

impl From<serde_json::Error> for StoreError {
    fn from(err: serde_json::Error) -> Self {
        StoreError::InvalidCorpus(err.to_string())
    }
}

impl From<StoreError> for AppError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::EntityNotFound { .. }
            | StoreError::AttachmentNotFound { .. }
            | StoreError::UnknownPartition(_) => AppError::NotFound(err.to_string()),
            StoreError::InvalidCorpus(msg) => AppError::Serialization(msg),
            StoreError::Io(err) => AppError::Io(err),
            StoreError::ExtractionFailed { .. } => AppError::Processing(err.to_string()),
        }
    }
}
