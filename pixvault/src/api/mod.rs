//! HTTP layer: route handlers and their request/response models.
//!
//! - **[`handlers`]**: Axum route handlers, the only place use case errors become status codes
//! - **[`models`]**: Query parameters and JSON bodies of the upload endpoints
//!
//! Both endpoints are documented with `utoipa`; the document is served at `/openapi.json` and
//! rendered at `/docs`.

pub mod handlers;
pub mod models;
