//! Database record models matching table schemas.
//!
//! Models derive `sqlx::FromRow` for query results and stay separate from the API models in
//! [`crate::api::models`] so storage and wire representations can change independently.

pub mod uploads;
