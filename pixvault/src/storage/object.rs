use super::{FileStorage, StorageError, StoredObject, UploadRequest};
use async_trait::async_trait;
use bytes::Bytes;
use futures::StreamExt;
use object_store::{
    Attribute, Attributes, ObjectStore, PutMultipartOptions, PutOptions, PutPayload, WriteMultipart, path::Path,
};
use std::sync::Arc;
use tracing::{debug, instrument, warn};
use url::Url;
use uuid::Uuid;

/// Parts allowed in flight before a write waits for the backend
const MAX_CONCURRENT_PARTS: usize = 4;

/// [`FileStorage`] over any `object_store` backend
pub struct ObjectStoreFileStorage {
    store: Arc<dyn ObjectStore>,
    public_url: Url,
    content_type_metadata: bool,
}

impl ObjectStoreFileStorage {
    /// `public_url` is the base the object keys are resolved against.
    pub fn new(store: Arc<dyn ObjectStore>, mut public_url: Url) -> Self {
        if !public_url.path().ends_with('/') {
            let path = format!("{}/", public_url.path());
            public_url.set_path(&path);
        }
        Self {
            store,
            public_url,
            content_type_metadata: true,
        }
    }

    /// Skip the content-type attribute for backends that cannot store it
    pub fn without_content_type_metadata(mut self) -> Self {
        self.content_type_metadata = false;
        self
    }

    fn attributes(&self, content_type: &str) -> Attributes {
        let mut attributes = Attributes::new();
        if self.content_type_metadata {
            attributes.insert(Attribute::ContentType, content_type.to_string().into());
        }
        attributes
    }

    fn parse_key(key: &str) -> Result<Path, StorageError> {
        Path::parse(key).map_err(|e| StorageError::InvalidKey(e.to_string()))
    }
}

/// Object key for a new object: `folder/<uuid>-<sanitized file name>`
pub(crate) fn object_key(folder: &str, file_name: &str) -> String {
    let sanitized: String = file_name
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_' | ':') {
                c
            } else {
                '_'
            }
        })
        .collect();
    let sanitized = sanitized.trim_start_matches('.');
    let sanitized = if sanitized.is_empty() { "file" } else { sanitized };

    format!("{folder}/{}-{sanitized}", Uuid::new_v4())
}

#[async_trait]
impl FileStorage for ObjectStoreFileStorage {
    #[instrument(skip_all, fields(folder = request.folder, file_name = request.file_name), err)]
    async fn upload(&self, request: UploadRequest<'_>) -> Result<StoredObject, StorageError> {
        let key = object_key(request.folder, request.file_name);
        let path = Self::parse_key(&key)?;
        let url = self.public_url.join(&key)?;
        let attributes = self.attributes(request.content_type);

        let upload = self
            .store
            .put_multipart_opts(
                &path,
                PutMultipartOptions {
                    attributes: attributes.clone(),
                    ..Default::default()
                },
            )
            .await?;
        let mut writer = WriteMultipart::new(upload);

        let mut content = request.content;
        let mut size_bytes = 0u64;
        while let Some(chunk) = content.next().await {
            let chunk = match chunk {
                Ok(chunk) => chunk,
                Err(e) => {
                    debug!(key = %key, error = %e, "Content stream failed, aborting upload");
                    if let Err(abort_err) = writer.abort().await {
                        warn!(key = %key, error = %abort_err, "Failed to abort multipart upload");
                    }
                    return Err(e.into());
                }
            };

            if let Err(e) = writer.wait_for_capacity(MAX_CONCURRENT_PARTS).await {
                if let Err(abort_err) = writer.abort().await {
                    warn!(key = %key, error = %abort_err, "Failed to abort multipart upload");
                }
                return Err(e.into());
            }
            size_bytes += chunk.len() as u64;
            writer.write(&chunk);
        }

        if size_bytes == 0 {
            // Multipart completion needs at least one part on S3
            writer.abort().await?;
            self.store
                .put_opts(
                    &path,
                    PutPayload::new(),
                    PutOptions {
                        attributes,
                        ..Default::default()
                    },
                )
                .await?;
        } else {
            writer.finish().await?;
        }

        debug!(key = %key, size_bytes, "Stored object");
        Ok(StoredObject { key, url, size_bytes })
    }

    async fn retrieve(&self, key: &str) -> Result<Bytes, StorageError> {
        let path = Self::parse_key(key)?;
        let bytes = self.store.get(&path).await?.bytes().await?;
        Ok(bytes)
    }
}
