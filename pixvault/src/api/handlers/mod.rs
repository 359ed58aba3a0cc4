//! Axum route handlers.
//!
//! - [`uploads`]: image upload and catalog export

pub mod uploads;
