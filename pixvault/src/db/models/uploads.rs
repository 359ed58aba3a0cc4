use crate::types::UploadId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Database request for recording a stored upload
#[derive(Debug, Clone)]
pub struct UploadCreateDBRequest {
    /// Original file name as sent by the client
    pub name: String,
    /// Object key returned by the storage backend; unique across the table
    pub storage_key: String,
    /// Public URL of the stored object
    pub remote_url: String,
}

/// Database response for an upload row
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct UploadDBResponse {
    pub id: UploadId,
    pub name: String,
    pub storage_key: String,
    pub remote_url: String,
    pub created_at: DateTime<Utc>,
}

/// Projection read by the export cursor
#[derive(Debug, Clone, PartialEq, sqlx::FromRow)]
pub struct UploadExportRow {
    pub id: UploadId,
    pub name: String,
    pub remote_url: String,
    pub created_at: DateTime<Utc>,
}

impl From<UploadDBResponse> for UploadExportRow {
    fn from(upload: UploadDBResponse) -> Self {
        Self {
            id: upload.id,
            name: upload.name,
            remote_url: upload.remote_url,
            created_at: upload.created_at,
        }
    }
}
