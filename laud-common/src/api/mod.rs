//! Shared HTTP API types
//!
//! Framework-free response bodies used by every Laudiolin service. Each
//! service wraps these with its own axum `IntoResponse` impls.

pub mod types;

pub use types::{ErrorResponse, HealthResponse};
