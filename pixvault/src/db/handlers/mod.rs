//! Repository implementations for database access.
//!
//! # Available Repositories
//!
//! - [`Uploads`]: the `uploads` catalog (insert and lookup)
//! - [`ExportCursor`]: forward-only server-side cursor over the catalog, read in batches
//!
//! # Common Pattern
//!
//! ```ignore
//! use pixvault::db::handlers::{Repository, Uploads};
//!
//! async fn example(pool: &sqlx::PgPool, request: UploadCreateDBRequest) -> anyhow::Result<()> {
//!     let mut conn = pool.acquire().await?;
//!     let mut repo = Uploads::new(&mut conn);
//!     let upload = repo.create(&request).await?;
//!     Ok(())
//! }
//! ```

pub mod export_cursor;
pub mod repository;
pub mod uploads;

pub use export_cursor::ExportCursor;
pub use repository::Repository;
pub use uploads::{UploadFilter, Uploads};
