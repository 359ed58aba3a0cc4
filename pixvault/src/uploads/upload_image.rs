use super::{IMAGES_FOLDER, UploadImageError};
use crate::config::UploadsConfig;
use crate::db::{models::uploads::UploadCreateDBRequest, store::UploadStore};
use crate::storage::{ContentStream, ContentStreamError, FileStorage, UploadRequest};
use crate::types::UploadId;
use futures::StreamExt;
use tracing::{info, instrument, warn};
use url::Url;

pub struct UploadImageInput<'a> {
    pub file_name: String,
    pub content_type: String,
    pub content: ContentStream<'a>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct UploadImageOutput {
    pub id: UploadId,
    pub url: Url,
}

/// Store an uploaded image and record it in the catalog.
///
/// The content type is checked before the stream is touched, so a rejected upload has no side
/// effects. The object write and the record insert are not atomic: when the insert fails the
/// stored object is left in place.
#[instrument(skip_all, fields(file_name = %input.file_name, content_type = %input.content_type))]
pub async fn upload_image(
    store: &dyn UploadStore,
    storage: &dyn FileStorage,
    limits: &UploadsConfig,
    input: UploadImageInput<'_>,
) -> Result<UploadImageOutput, UploadImageError> {
    let result = store_and_record(store, storage, limits, input).await;

    let outcome = match &result {
        Ok(_) => "stored",
        Err(UploadImageError::InvalidFileFormat) => "invalid_format",
        Err(UploadImageError::FileSizeLimitReached { .. }) => "too_large",
        Err(_) => "failed",
    };
    metrics::counter!("pixvault_uploads_total", "outcome" => outcome).increment(1);

    result
}

async fn store_and_record(
    store: &dyn UploadStore,
    storage: &dyn FileStorage,
    limits: &UploadsConfig,
    input: UploadImageInput<'_>,
) -> Result<UploadImageOutput, UploadImageError> {
    if !limits.is_allowed(&input.content_type) {
        return Err(UploadImageError::InvalidFileFormat);
    }

    let stored = storage
        .upload(UploadRequest {
            folder: IMAGES_FOLDER,
            file_name: &input.file_name,
            content_type: &input.content_type,
            content: limit_content_size(input.content, limits.max_file_size),
        })
        .await?;

    let record = store
        .insert(&UploadCreateDBRequest {
            name: input.file_name.clone(),
            storage_key: stored.key.clone(),
            remote_url: stored.url.to_string(),
        })
        .await
        .inspect_err(|e| warn!(upload_key = %stored.key, error = %e, "Stored object has no catalog record"))?;

    info!(upload_id = %record.id, upload_key = %stored.key, size_bytes = stored.size_bytes, "Image uploaded");
    Ok(UploadImageOutput {
        id: record.id,
        url: stored.url,
    })
}

/// Fail the stream with [`ContentStreamError::SizeLimitExceeded`] once more than `limit` bytes
/// have passed through.
pub fn limit_content_size(content: ContentStream<'_>, limit: u64) -> ContentStream<'_> {
    let mut total = 0u64;
    content
        .map(move |chunk| {
            let chunk = chunk?;
            total += chunk.len() as u64;
            if total > limit {
                Err(ContentStreamError::SizeLimitExceeded { limit })
            } else {
                Ok(chunk)
            }
        })
        .boxed()
}
