//! The record store the use cases depend on.
//!
//! [`UploadStore`] is the seam between the use cases and PostgreSQL, injected through
//! [`crate::AppState`]. [`PostgresUploadStore`] is the production implementation.

use crate::db::{
    errors::Result,
    handlers::{ExportCursor, Repository, UploadFilter, Uploads},
    models::uploads::{UploadCreateDBRequest, UploadDBResponse, UploadExportRow},
};
use async_trait::async_trait;
use sqlx::PgPool;

/// Batched, forward-only read over the catalog
#[async_trait]
pub trait UploadCursor: Send {
    /// Next batch of rows in cursor order; `None` when drained
    async fn next_batch(&mut self) -> Result<Option<Vec<UploadExportRow>>>;

    /// Release the cursor after a complete read
    async fn close(self: Box<Self>) -> Result<()>;
}

#[async_trait]
pub trait UploadStore: Send + Sync {
    /// Insert one upload record
    async fn insert(&self, request: &UploadCreateDBRequest) -> Result<UploadDBResponse>;

    /// Open a cursor over the records matching `filter`, fetching `batch_size` rows at a time
    async fn open_export_cursor(&self, filter: &UploadFilter, batch_size: u32) -> Result<Box<dyn UploadCursor>>;
}

#[derive(Clone)]
pub struct PostgresUploadStore {
    pool: PgPool,
}

impl PostgresUploadStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl UploadStore for PostgresUploadStore {
    async fn insert(&self, request: &UploadCreateDBRequest) -> Result<UploadDBResponse> {
        let mut conn = self.pool.acquire().await?;
        Uploads::new(&mut conn).create(request).await
    }

    async fn open_export_cursor(&self, filter: &UploadFilter, batch_size: u32) -> Result<Box<dyn UploadCursor>> {
        let cursor = ExportCursor::open(&self.pool, filter, batch_size).await?;
        Ok(Box::new(cursor))
    }
}

#[async_trait]
impl UploadCursor for ExportCursor {
    async fn next_batch(&mut self) -> Result<Option<Vec<UploadExportRow>>> {
        ExportCursor::next_batch(self).await
    }

    async fn close(self: Box<Self>) -> Result<()> {
        ExportCursor::close(*self).await
    }
}
