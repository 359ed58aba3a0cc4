//! Object storage for uploaded images and generated reports.
//!
//! Content is written as a stream: callers hand over a [`ContentStream`] and the backend
//! forwards chunks as they arrive, so neither an upload nor a report is ever buffered whole.
//! An error item in the stream aborts the write and no object becomes visible.
//!
//! Backends are built on `object_store`:
//!
//! - **S3** (`s3`): any S3-compatible service, including Cloudflare R2
//! - **Local** (`local`): a directory on disk, served under `/files` by the HTTP layer
//! - **Memory** (`memory`): process-local, for development and tests

mod object;

pub use object::ObjectStoreFileStorage;

use crate::config::StorageConfig;
use async_trait::async_trait;
use bytes::Bytes;
use futures::stream::BoxStream;
use object_store::{aws::AmazonS3Builder, local::LocalFileSystem, memory::InMemory};
use std::sync::Arc;
use thiserror::Error;
use tracing::info;
use url::Url;

/// Byte stream handed to [`FileStorage::upload`]
pub type ContentStream<'a> = BoxStream<'a, Result<Bytes, ContentStreamError>>;

/// Failure reported by the producer of a [`ContentStream`]
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ContentStreamError {
    #[error("content exceeds the size limit of {limit} bytes")]
    SizeLimitExceeded { limit: u64 },

    #[error("failed to read content: {0}")]
    Read(String),

    /// An upstream stage failed and the content is incomplete
    #[error("content producer failed: {0}")]
    Aborted(String),
}

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("invalid object key: {0}")]
    InvalidKey(String),

    #[error(transparent)]
    Content(#[from] ContentStreamError),

    #[error("object storage error: {0}")]
    Backend(#[from] object_store::Error),

    #[error("failed to build public URL: {0}")]
    Url(#[from] url::ParseError),
}

/// A write request for [`FileStorage::upload`]
pub struct UploadRequest<'a> {
    /// Top-level folder, e.g. `images` or `downloads`
    pub folder: &'a str,
    /// Client-facing file name; sanitized into the object key
    pub file_name: &'a str,
    pub content_type: &'a str,
    pub content: ContentStream<'a>,
}

/// Location of a stored object
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredObject {
    /// Object key, `folder/<uuid>-<sanitized file name>`
    pub key: String,
    /// Public URL of the object
    pub url: Url,
    pub size_bytes: u64,
}

#[async_trait]
pub trait FileStorage: Send + Sync {
    /// Stream `request.content` into a new object
    async fn upload(&self, request: UploadRequest<'_>) -> Result<StoredObject, StorageError>;

    /// Read a stored object back in full
    async fn retrieve(&self, key: &str) -> Result<Bytes, StorageError>;
}

/// Build the configured storage backend
pub fn create_file_storage(config: &StorageConfig) -> anyhow::Result<Arc<dyn FileStorage>> {
    let public_url = config.public_base_url()?;

    let storage = match config {
        StorageConfig::S3 {
            bucket,
            region,
            endpoint,
            allow_http,
            ..
        } => {
            // Credentials and any other AWS_* settings come from the environment
            let mut builder = AmazonS3Builder::from_env().with_bucket_name(bucket).with_allow_http(*allow_http);
            if let Some(region) = region {
                builder = builder.with_region(region);
            }
            if let Some(endpoint) = endpoint {
                builder = builder.with_endpoint(endpoint);
            }
            info!(bucket = %bucket, "Using S3-compatible object storage");
            ObjectStoreFileStorage::new(Arc::new(builder.build()?), public_url)
        }
        StorageConfig::Local { path, .. } => {
            std::fs::create_dir_all(path)?;
            info!(path = %path.display(), "Using local filesystem object storage");
            // LocalFileSystem cannot persist object attributes
            ObjectStoreFileStorage::new(Arc::new(LocalFileSystem::new_with_prefix(path)?), public_url).without_content_type_metadata()
        }
        StorageConfig::Memory { .. } => {
            info!("Using in-memory object storage, objects are lost on shutdown");
            ObjectStoreFileStorage::new(Arc::new(InMemory::new()), public_url)
        }
    };

    Ok(Arc::new(storage))
}
