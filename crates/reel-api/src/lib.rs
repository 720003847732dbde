//! Axum HTTP boundary for the reel transform service.
//!
//! This crate provides:
//! - Multipart upload endpoints for each transform, answering with the output file
//! - A server-sent events progress stream per job
//! - Per-IP rate limiting on uploads
//! - Prometheus metrics

pub mod config;
pub mod error;
pub mod handlers;
pub mod metrics;
pub mod middleware;
pub mod routes;
pub mod state;

pub use config::ApiConfig;
pub use error::{ApiError, ApiResult};
pub use routes::create_router;
pub use state::AppState;
