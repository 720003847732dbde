//! Server-sent progress stream.

use std::convert::Infallible;

use axum::extract::{Query, State};
use axum::response::sse::{Event, KeepAlive, Sse};
use futures_util::{Stream, StreamExt};
use serde::Deserialize;
use tracing::debug;

use reel_models::JobId;

use crate::error::{ApiError, ApiResult};
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct ProgressQuery {
    #[serde(rename = "jobId")]
    pub job_id: Option<String>,
}

/// `GET /api/progress?jobId=…`
///
/// Each event's data is `{"progress": n, "status": "..."}`. The stream ends
/// after the 100% event, when the job disappears, or when its lifetime runs out.
pub async fn progress(
    State(state): State<AppState>,
    Query(query): Query<ProgressQuery>,
) -> ApiResult<Sse<impl Stream<Item = Result<Event, Infallible>>>> {
    let raw = query
        .job_id
        .filter(|id| !id.trim().is_empty())
        .ok_or_else(|| ApiError::bad_request("Missing jobId"))?;
    let job_id = JobId::parse(&raw)?;

    debug!(job_id = %job_id, "Progress subscriber connected");

    let events = state.publisher.subscribe(job_id).filter_map(|payload| async move {
        Event::default().json_data(payload).ok().map(Ok)
    });

    Ok(Sse::new(events).keep_alive(KeepAlive::default()))
}
