//! Streamed CSV export of the upload catalog.
//!
//! Three stages run concurrently, connected by bounded channels:
//!
//! ```text
//! cursor reader ──batches──▶ CSV encoder ──bytes──▶ storage writer
//! ```
//!
//! A full channel suspends the stage feeding it, so the cursor is read no faster than storage
//! accepts bytes. A stage that fails sends an error item downstream, which makes the storage
//! writer abort the upload instead of completing a truncated report. A stage that stops
//! receiving drops its channel, which ends the stages upstream of it at their next send.

use super::{DOWNLOADS_FOLDER, ExportUploadsError, report::CsvEncoder};
use crate::config::ExportsConfig;
use crate::db::{
    errors::DbError,
    handlers::UploadFilter,
    models::uploads::UploadExportRow,
    store::{UploadCursor, UploadStore},
};
use crate::storage::{ContentStreamError, FileStorage, UploadRequest};
use bytes::Bytes;
use chrono::{DateTime, SecondsFormat, Utc};
use futures::StreamExt;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tracing::{debug, info, instrument};
use url::Url;

const REPORT_CONTENT_TYPE: &str = "text/csv";

type BatchSender = mpsc::Sender<Result<Vec<UploadExportRow>, ContentStreamError>>;
type BatchReceiver = mpsc::Receiver<Result<Vec<UploadExportRow>, ContentStreamError>>;
type ChunkSender = mpsc::Sender<Result<Bytes, ContentStreamError>>;

#[derive(Debug, Clone, Default)]
pub struct ExportUploadsInput {
    /// Case-insensitive substring of the upload name
    pub search_query: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ExportUploadsOutput {
    pub report_url: Url,
    /// Storage key of the report
    pub report_key: String,
    /// Data rows written, excluding the header
    pub rows: u64,
}

/// Export the catalog as CSV into the `downloads` folder and return the report URL.
///
/// Returns only after the report is fully stored; on any failure no report is left behind.
#[instrument(skip_all, fields(search_query = ?input.search_query))]
pub async fn export_uploads(
    store: &dyn UploadStore,
    storage: &dyn FileStorage,
    settings: &ExportsConfig,
    input: ExportUploadsInput,
) -> Result<ExportUploadsOutput, ExportUploadsError> {
    let result = run_pipeline(store, storage, settings, input).await;

    match &result {
        Ok(output) => {
            metrics::counter!("pixvault_exports_total", "outcome" => "stored").increment(1);
            metrics::counter!("pixvault_export_rows_total").increment(output.rows);
        }
        Err(_) => metrics::counter!("pixvault_exports_total", "outcome" => "failed").increment(1),
    }

    result
}

async fn run_pipeline(
    store: &dyn UploadStore,
    storage: &dyn FileStorage,
    settings: &ExportsConfig,
    input: ExportUploadsInput,
) -> Result<ExportUploadsOutput, ExportUploadsError> {
    let filter = UploadFilter {
        search_query: input.search_query,
    };
    let cursor = store.open_export_cursor(&filter, settings.batch_size).await?;

    let capacity = settings.channel_capacity.max(1);
    let (batch_tx, batch_rx) = mpsc::channel(capacity);
    let (chunk_tx, chunk_rx) = mpsc::channel(capacity);
    let file_name = report_file_name(Utc::now());

    let (read, encoded, stored) = tokio::join!(
        read_batches(cursor, batch_tx),
        encode_batches(batch_rx, chunk_tx),
        storage.upload(UploadRequest {
            folder: DOWNLOADS_FOLDER,
            file_name: &file_name,
            content_type: REPORT_CONTENT_TYPE,
            content: ReceiverStream::new(chunk_rx).boxed(),
        }),
    );

    // Report the root cause in pipeline order
    read?;
    let rows = encoded?;
    let stored = stored?;

    info!(rows, report_key = %stored.key, size_bytes = stored.size_bytes, "Uploads exported");
    Ok(ExportUploadsOutput {
        report_url: stored.url,
        report_key: stored.key,
        rows,
    })
}

/// `<ISO-8601 timestamp>-uploads.csv`
pub fn report_file_name(now: DateTime<Utc>) -> String {
    format!("{}-uploads.csv", now.to_rfc3339_opts(SecondsFormat::Millis, true))
}

/// Cursor stage: forward batches until the cursor is drained.
async fn read_batches(cursor: Box<dyn UploadCursor>, tx: BatchSender) -> Result<(), ExportUploadsError> {
    if let Err(e) = forward_batches(cursor, &tx).await {
        let _ = tx.send(Err(ContentStreamError::Aborted(format!("reading uploads failed: {e}")))).await;
        return Err(e.into());
    }
    Ok(())
}

async fn forward_batches(mut cursor: Box<dyn UploadCursor>, tx: &BatchSender) -> Result<(), DbError> {
    let mut batches = 0u64;
    while let Some(batch) = cursor.next_batch().await? {
        batches += 1;
        if tx.send(Ok(batch)).await.is_err() {
            // Downstream stopped and reports its own failure; dropping the cursor releases it
            debug!(batches, "Export consumer stopped, abandoning cursor");
            return Ok(());
        }
    }
    cursor.close().await?;
    debug!(batches, "Export cursor drained");
    Ok(())
}

/// Encoder stage: header first, then one CSV chunk per batch. Returns the number of rows encoded.
async fn encode_batches(mut rx: BatchReceiver, tx: ChunkSender) -> Result<u64, ExportUploadsError> {
    let mut encoder = CsvEncoder::new();
    let mut rows = 0u64;

    let header = match encoder.header() {
        Ok(header) => header,
        Err(e) => return Err(abort_encoding(&tx, e).await),
    };
    if tx.send(Ok(header)).await.is_err() {
        return Ok(rows);
    }

    while let Some(item) = rx.recv().await {
        let batch = match item {
            Ok(batch) => batch,
            Err(upstream) => {
                let _ = tx.send(Err(upstream)).await;
                return Ok(rows);
            }
        };

        let chunk = match encoder.encode_batch(&batch) {
            Ok(chunk) => chunk,
            Err(e) => return Err(abort_encoding(&tx, e).await),
        };
        rows += batch.len() as u64;

        if tx.send(Ok(chunk)).await.is_err() {
            return Ok(rows);
        }
    }

    Ok(rows)
}

async fn abort_encoding(tx: &ChunkSender, err: csv::Error) -> ExportUploadsError {
    let _ = tx.send(Err(ContentStreamError::Aborted(format!("CSV encoding failed: {err}")))).await;
    ExportUploadsError::Encoding(err)
}
