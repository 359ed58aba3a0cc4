//! Test doubles and application fixtures.
//!
//! [`InMemoryUploadStore`] stands in for PostgreSQL and `object_store`'s `InMemory` for object
//! storage, so use-case and HTTP tests run without external services.

use crate::{
    AppState, build_router,
    config::{Config, StorageConfig},
    db::{
        errors::{DbError, Result},
        handlers::UploadFilter,
        models::uploads::{UploadCreateDBRequest, UploadDBResponse, UploadExportRow},
        store::{UploadCursor, UploadStore},
    },
    storage::{FileStorage, ObjectStoreFileStorage, StorageError, StoredObject, UploadRequest},
};
use async_trait::async_trait;
use bytes::Bytes;
use chrono::{Duration, Utc};
use futures::StreamExt;
use object_store::{ObjectStore, memory::InMemory};
use std::collections::VecDeque;
use std::sync::{
    Arc, Mutex,
    atomic::{AtomicBool, AtomicUsize, Ordering},
};
use url::Url;
use uuid::Uuid;

pub const TEST_PUBLIC_URL: &str = "https://cdn.example.com/pixvault/";

/// `UploadStore` backed by a vector, with optional failure injection.
#[derive(Default)]
pub struct InMemoryUploadStore {
    records: Mutex<Vec<UploadDBResponse>>,
    fail_inserts: AtomicBool,
    cursor_failure_after: Option<usize>,
    open_cursors: Arc<AtomicUsize>,
}

impl InMemoryUploadStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every insert fails with a database error
    pub fn with_failing_inserts(self) -> Self {
        self.fail_inserts.store(true, Ordering::SeqCst);
        self
    }

    /// Cursors fail after serving `batches` batches
    pub fn with_cursor_failure_after(mut self, batches: usize) -> Self {
        self.cursor_failure_after = Some(batches);
        self
    }

    pub fn records(&self) -> Vec<UploadDBResponse> {
        self.records.lock().unwrap().clone()
    }

    /// Insert a record directly, as if it had been uploaded earlier
    pub fn seed(&self, name: &str) -> UploadDBResponse {
        let mut records = self.records.lock().unwrap();
        let key = format!("images/{}-{name}", Uuid::new_v4());
        let record = UploadDBResponse {
            id: Uuid::new_v4(),
            name: name.to_string(),
            remote_url: format!("{TEST_PUBLIC_URL}{key}"),
            storage_key: key,
            // Distinct, increasing timestamps keep insertion order visible
            created_at: Utc::now() + Duration::milliseconds(records.len() as i64),
        };
        records.push(record.clone());
        record
    }

    /// No cursor is open (all were closed or dropped)
    pub fn cursor_released(&self) -> bool {
        self.open_cursors.load(Ordering::SeqCst) == 0
    }
}

fn matches_filter(filter: &UploadFilter, name: &str) -> bool {
    filter
        .search_query
        .as_deref()
        .filter(|q| !q.is_empty())
        .is_none_or(|q| name.to_lowercase().contains(&q.to_lowercase()))
}

#[async_trait]
impl UploadStore for InMemoryUploadStore {
    async fn insert(&self, request: &UploadCreateDBRequest) -> Result<UploadDBResponse> {
        if self.fail_inserts.load(Ordering::SeqCst) {
            return Err(DbError::Other(anyhow::anyhow!("connection refused")));
        }

        let mut records = self.records.lock().unwrap();
        if records.iter().any(|r| r.storage_key == request.storage_key) {
            return Err(DbError::UniqueViolation {
                constraint: Some("uploads_storage_key_unique".to_string()),
                table: Some("uploads".to_string()),
                message: "duplicate key value violates unique constraint".to_string(),
            });
        }

        let record = UploadDBResponse {
            id: Uuid::new_v4(),
            name: request.name.clone(),
            storage_key: request.storage_key.clone(),
            remote_url: request.remote_url.clone(),
            created_at: Utc::now(),
        };
        records.push(record.clone());
        Ok(record)
    }

    async fn open_export_cursor(&self, filter: &UploadFilter, batch_size: u32) -> Result<Box<dyn UploadCursor>> {
        let rows: Vec<UploadExportRow> = self
            .records()
            .into_iter()
            .filter(|r| matches_filter(filter, &r.name))
            .map(UploadExportRow::from)
            .collect();
        let batches = rows.chunks(batch_size.max(1) as usize).map(<[_]>::to_vec).collect();

        self.open_cursors.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(InMemoryCursor {
            batches,
            served: 0,
            fail_after: self.cursor_failure_after,
            open_cursors: self.open_cursors.clone(),
        }))
    }
}

struct InMemoryCursor {
    batches: VecDeque<Vec<UploadExportRow>>,
    served: usize,
    fail_after: Option<usize>,
    open_cursors: Arc<AtomicUsize>,
}

impl Drop for InMemoryCursor {
    fn drop(&mut self) {
        self.open_cursors.fetch_sub(1, Ordering::SeqCst);
    }
}

#[async_trait]
impl UploadCursor for InMemoryCursor {
    async fn next_batch(&mut self) -> Result<Option<Vec<UploadExportRow>>> {
        if self.fail_after == Some(self.served) {
            return Err(DbError::Other(anyhow::anyhow!("server closed the connection unexpectedly")));
        }
        self.served += 1;
        Ok(self.batches.pop_front())
    }

    async fn close(self: Box<Self>) -> Result<()> {
        Ok(())
    }
}

/// `FileStorage` that accepts a few chunks and then fails like an unreachable backend
pub struct FailingFileStorage {
    chunks_before_failure: usize,
}

impl FailingFileStorage {
    pub fn after_chunks(chunks_before_failure: usize) -> Self {
        Self { chunks_before_failure }
    }
}

#[async_trait]
impl FileStorage for FailingFileStorage {
    async fn upload(&self, mut request: UploadRequest<'_>) -> std::result::Result<StoredObject, StorageError> {
        for _ in 0..self.chunks_before_failure {
            match request.content.next().await {
                Some(Ok(_)) => {}
                Some(Err(e)) => return Err(e.into()),
                None => break,
            }
        }
        Err(StorageError::Backend(object_store::Error::Generic {
            store: "failing",
            source: "connection reset by peer".into(),
        }))
    }

    async fn retrieve(&self, key: &str) -> std::result::Result<Bytes, StorageError> {
        Err(StorageError::Backend(object_store::Error::NotFound {
            path: key.to_string(),
            source: "nothing is ever stored".into(),
        }))
    }
}

/// In-memory object storage and the `FileStorage` on top of it
pub fn memory_storage() -> (Arc<InMemory>, Arc<ObjectStoreFileStorage>) {
    let memory = Arc::new(InMemory::new());
    let public_url = Url::parse(TEST_PUBLIC_URL).unwrap();
    let storage = Arc::new(ObjectStoreFileStorage::new(memory.clone(), public_url));
    (memory, storage)
}

/// Keys of every object currently stored, sorted
pub async fn stored_objects(memory: &InMemory) -> Vec<String> {
    let mut keys: Vec<String> = memory
        .list(None)
        .map(|meta| meta.unwrap().location.to_string())
        .collect()
        .await;
    keys.sort();
    keys
}

pub fn create_test_config() -> Config {
    let mut config = Config::default();
    config.database.url = "postgres://localhost/pixvault_test".to_string();
    config.storage = StorageConfig::Memory {
        public_url: TEST_PUBLIC_URL.to_string(),
    };
    config
}

/// Application state over in-memory backends
pub fn create_test_state(config: Config) -> (AppState, Arc<InMemoryUploadStore>, Arc<InMemory>) {
    let uploads = Arc::new(InMemoryUploadStore::new());
    let (memory, storage) = memory_storage();
    let state = AppState::builder()
        .config(config)
        .uploads(uploads.clone())
        .storage(storage)
        .build();
    (state, uploads, memory)
}

/// Test server over the full router, plus handles on the backing stores
pub fn create_test_app(config: Config) -> (axum_test::TestServer, Arc<InMemoryUploadStore>, Arc<InMemory>) {
    let (state, uploads, memory) = create_test_state(config);
    let router = build_router(state).expect("Failed to build router");
    let server = axum_test::TestServer::new(router).expect("Failed to create test server");
    (server, uploads, memory)
}
