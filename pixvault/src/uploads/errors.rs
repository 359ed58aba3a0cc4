use crate::db::errors::DbError;
use crate::storage::{ContentStreamError, StorageError};
use thiserror::Error;

/// Failure of the image upload use case
#[derive(Debug, Error)]
pub enum UploadImageError {
    /// Content type outside the allow-list; nothing was stored
    #[error("Invalid file format.")]
    InvalidFileFormat,

    /// The file exceeded the size limit while streaming; the object write was aborted
    #[error("File size limit reached.")]
    FileSizeLimitReached { limit: u64 },

    #[error("failed to store image: {0}")]
    Storage(#[source] StorageError),

    /// The object was stored but its record could not be written
    #[error("failed to record upload: {0}")]
    Database(#[from] DbError),
}

impl From<StorageError> for UploadImageError {
    fn from(err: StorageError) -> Self {
        match err {
            StorageError::Content(ContentStreamError::SizeLimitExceeded { limit }) => UploadImageError::FileSizeLimitReached { limit },
            other => UploadImageError::Storage(other),
        }
    }
}

/// Failure of the CSV export use case
#[derive(Debug, Error)]
pub enum ExportUploadsError {
    #[error("failed to read uploads: {0}")]
    Query(#[from] DbError),

    #[error("failed to encode CSV: {0}")]
    Encoding(#[from] csv::Error),

    #[error("failed to store report: {0}")]
    Storage(#[from] StorageError),
}
