//! Common type definitions.
//!
//! Entity identifiers are UUIDs wrapped in type aliases so signatures say what they hold:
//!
//! - [`UploadId`]: identifier of a row in the `uploads` catalog

use uuid::Uuid;

pub type UploadId = Uuid;
