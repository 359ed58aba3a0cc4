//! Forward-only server-side cursor over the `uploads` catalog.
//!
//! The cursor is declared inside its own transaction and read with `FETCH FORWARD n`, so only
//! one batch of rows is held in memory at a time regardless of the table size.

use crate::db::{errors::Result, handlers::uploads::UploadFilter, models::uploads::UploadExportRow};
use sqlx::{PgPool, Postgres, Transaction};
use tracing::{debug, instrument};

const CURSOR_NAME: &str = "uploads_export";
const SEARCH_SETTING: &str = "pixvault.export_name_pattern";

pub struct ExportCursor {
    tx: Transaction<'static, Postgres>,
    batch_size: u32,
    exhausted: bool,
    batches: u64,
}

impl ExportCursor {
    /// Open the cursor for rows matching `filter`.
    #[instrument(skip(pool), err)]
    pub async fn open(pool: &PgPool, filter: &UploadFilter, batch_size: u32) -> Result<Self> {
        let mut tx = pool.begin().await?;

        let mut declare = format!("DECLARE {CURSOR_NAME} NO SCROLL CURSOR FOR SELECT id, name, remote_url, created_at FROM uploads");

        // DECLARE takes no bind parameters; the pattern travels through a transaction-local setting.
        if let Some(pattern) = filter.name_pattern() {
            sqlx::query("SELECT set_config($1, $2, true)")
                .bind(SEARCH_SETTING)
                .bind(pattern)
                .execute(&mut *tx)
                .await?;
            declare.push_str(&format!(" WHERE name ILIKE current_setting('{SEARCH_SETTING}')"));
        }

        sqlx::query(&declare).persistent(false).execute(&mut *tx).await?;
        debug!(batch_size, "Declared export cursor");

        Ok(Self {
            tx,
            batch_size: batch_size.max(1),
            exhausted: false,
            batches: 0,
        })
    }

    /// Fetch the next batch; `None` once the cursor is drained.
    pub async fn next_batch(&mut self) -> Result<Option<Vec<UploadExportRow>>> {
        if self.exhausted {
            return Ok(None);
        }

        let fetch = format!("FETCH FORWARD {} FROM {CURSOR_NAME}", self.batch_size);
        let rows = sqlx::query_as::<_, UploadExportRow>(&fetch)
            .persistent(false)
            .fetch_all(&mut *self.tx)
            .await?;

        if rows.len() < self.batch_size as usize {
            self.exhausted = true;
        }
        if rows.is_empty() {
            return Ok(None);
        }

        self.batches += 1;
        Ok(Some(rows))
    }

    /// Close the cursor and commit its transaction.
    ///
    /// Dropping an `ExportCursor` instead rolls the transaction back.
    pub async fn close(mut self) -> Result<()> {
        sqlx::query(&format!("CLOSE {CURSOR_NAME}"))
            .persistent(false)
            .execute(&mut *self.tx)
            .await?;
        self.tx.commit().await?;
        debug!(batches = self.batches, "Closed export cursor");
        Ok(())
    }
}
