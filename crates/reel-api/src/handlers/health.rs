//! Health check handlers.

use axum::extract::State;
use axum::Json;
use chrono::Utc;
use serde::Serialize;

use reel_media::resolve_binary;

use crate::state::AppState;

/// Health response.
#[derive(Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub timestamp: String,
    /// Whether the configured ffmpeg binary resolves
    pub ffmpeg: bool,
    /// Jobs currently tracked in the registry
    pub active_jobs: usize,
}

/// Health check endpoint (liveness probe).
///
/// Stays `200` without ffmpeg so the process isn't restarted in a loop; the
/// `ffmpeg` flag tells operators why transforms fail.
pub async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        timestamp: Utc::now().to_rfc3339(),
        ffmpeg: resolve_binary(&state.executor.config().ffmpeg_path).is_ok(),
        active_jobs: state.registry.len().await,
    })
}
