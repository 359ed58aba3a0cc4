//! Database layer for the upload catalog.
//!
//! This module implements the data access layer using SQLx with PostgreSQL.
//! It follows the Repository pattern to provide clean abstractions over database operations.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────┐
//! │  Use cases   │  (uploads::upload_image, uploads::export_uploads)
//! └──────┬───────┘
//!        │
//!        ↓
//! ┌──────────────┐
//! │ UploadStore  │  (db::store - seam injected through AppState)
//! └──────┬───────┘
//!        │
//!        ↓
//! ┌──────────────┐
//! │ Repositories │  (db::handlers - queries and the export cursor)
//! └──────┬───────┘
//!        │
//!        ↓
//! ┌──────────────┐
//! │  PostgreSQL  │
//! └──────────────┘
//! ```
//!
//! # Modules
//!
//! - [`handlers`]: Repository implementation for `uploads` and the server-side export cursor
//! - [`models`]: Database record structures matching the table schema
//! - [`store`]: The [`store::UploadStore`] trait the use cases depend on
//! - [`errors`]: Database-specific error types
//!
//! # Transactions
//!
//! Single-row inserts run on a pooled connection in autocommit mode. The export cursor owns a
//! transaction for its whole lifetime: `DECLARE ... CURSOR` is only valid inside one, and
//! dropping the cursor without closing it rolls the transaction back, which also releases the
//! cursor on the server.
//!
//! # Migrations
//!
//! Schema migrations live in `migrations/` and are embedded with `sqlx::migrate!`; they run on
//! application start-up (see [`crate::migrator`]).

pub mod errors;
pub mod handlers;
pub mod models;
pub mod store;
