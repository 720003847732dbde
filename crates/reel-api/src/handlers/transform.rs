//! Transform submission handlers.
//!
//! Every endpoint follows the same shape: stream the multipart upload into a
//! per-job workspace, validate it into a [`TransformRequest`], run the engine
//! in a detached task that feeds the job registry, then stream the output
//! file back. The workspace travels with the response body and is removed
//! once the body is dropped.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use axum::body::Body;
use axum::extract::multipart::Field;
use axum::extract::{Multipart, State};
use axum::http::{header, StatusCode};
use axum::response::Response;
use futures_util::StreamExt;
use tokio::fs::File;
use tokio::io::AsyncWriteExt;
use tokio::task::JoinHandle;
use tokio_util::io::ReaderStream;
use tracing::{debug, info, warn};

use reel_jobs::{progress_channel, spawn_updater};
use reel_media::{delivery_file_name, JobWorkspace, MediaResult};
use reel_models::{
    JobId, Operation, OperationKind, RemoveBackgroundForm, TransformRequest, ValidationError,
};

use crate::error::{ApiError, ApiResult};
use crate::metrics;
use crate::middleware::JOB_ID_HEADER;
use crate::state::AppState;

/// Upper bound on files accepted by one merge submission.
pub const MAX_MERGE_INPUTS: usize = 20;

const UPLOADING_STATUS: &str = "Uploading file(s)...";
const PROCESSING_STATUS: &str = "Processing video...";
const PROCESSING_PROGRESS: u8 = 5;

/// What one multipart submission left on disk.
struct Submission {
    workspace: JobWorkspace,
    job_id: Option<JobId>,
    inputs: Vec<PathBuf>,
    first_name: Option<String>,
    background_image: Option<PathBuf>,
    fields: HashMap<String, String>,
}

/// `POST /api/clean-audio`
pub async fn clean_audio(
    State(state): State<AppState>,
    multipart: Multipart,
) -> ApiResult<Response> {
    let submission = receive(&state, OperationKind::CleanAudio, multipart).await?;
    run(state, submission, Operation::CleanAudio).await
}

/// `POST /api/merge-videos`
pub async fn merge_videos(
    State(state): State<AppState>,
    multipart: Multipart,
) -> ApiResult<Response> {
    let submission = receive(&state, OperationKind::Merge, multipart).await?;
    run(state, submission, Operation::merge()).await
}

/// `POST /api/enhance`
pub async fn enhance(State(state): State<AppState>, multipart: Multipart) -> ApiResult<Response> {
    let submission = receive(&state, OperationKind::Enhance, multipart).await?;
    run(state, submission, Operation::Enhance).await
}

/// `POST /api/remove-background`
///
/// Text fields override the defaults of [`RemoveBackgroundForm`]; an optional
/// `backgroundImage` upload is used when `backgroundType=image`.
pub async fn remove_background(
    State(state): State<AppState>,
    multipart: Multipart,
) -> ApiResult<Response> {
    let submission = receive(&state, OperationKind::RemoveBackground, multipart).await?;
    let form = remove_background_form(&submission.fields)?;
    let operation = form.into_operation(submission.background_image.clone())?;
    run(state, submission, operation).await
}

/// Build the remove-background form from submitted text fields.
fn remove_background_form(fields: &HashMap<String, String>) -> ApiResult<RemoveBackgroundForm> {
    let mut form = RemoveBackgroundForm::default();
    let text = |name: &str| {
        fields
            .get(name)
            .map(|v| v.trim())
            .filter(|v| !v.is_empty())
            .map(str::to_string)
    };

    if let Some(v) = text("backgroundType") {
        form.background_type = v;
    }
    if let Some(v) = text("backgroundColor") {
        form.background_color = v;
    }
    if let Some(v) = text("chromaKeyColor") {
        form.chroma_key_color = v;
    }
    if let Some(v) = text("mode") {
        form.mode = v;
    }
    if let Some(v) = text("similarity") {
        form.similarity = parse_number("similarity", &v)?;
    }
    if let Some(v) = text("blend") {
        form.blend = parse_number("blend", &v)?;
    }

    Ok(form)
}

fn parse_number(field: &'static str, raw: &str) -> ApiResult<f64> {
    raw.parse::<f64>()
        .ok()
        .filter(|v| v.is_finite())
        .ok_or_else(|| {
            ApiError::from(ValidationError::invalid_option(
                field,
                format!("`{raw}` is not a number"),
            ))
        })
}

/// Stream every multipart field into a fresh workspace.
async fn receive(
    state: &AppState,
    kind: OperationKind,
    mut multipart: Multipart,
) -> ApiResult<Submission> {
    let workspace = JobWorkspace::create(state.executor.config().work_root.as_deref(), kind)
        .map_err(|e| ApiError::internal(format!("failed to create job workspace: {e}")))?;

    let file_field = match kind {
        OperationKind::Merge => "files",
        _ => "file",
    };
    let max_inputs = kind.input_bounds().1.unwrap_or(MAX_MERGE_INPUTS);

    let mut submission = Submission {
        workspace,
        job_id: None,
        inputs: Vec::new(),
        first_name: None,
        background_image: None,
        fields: HashMap::new(),
    };

    while let Some(field) = multipart.next_field().await? {
        let name = field.name().unwrap_or_default().to_string();

        if name == file_field {
            if submission.inputs.len() >= max_inputs {
                return Err(ApiError::bad_request(format!(
                    "At most {max_inputs} file(s) accepted for {}",
                    kind.as_str()
                )));
            }
            let original = field.file_name().unwrap_or_default().to_string();
            let path = submission
                .workspace
                .input_path(submission.inputs.len(), &original);
            if save_field(field, &path).await? == 0 {
                warn!(field = %name, file = %original, "Skipping empty upload");
                continue;
            }
            submission.first_name.get_or_insert(original);
            submission.inputs.push(path);
        } else if name == "backgroundImage" && kind == OperationKind::RemoveBackground {
            let original = field.file_name().unwrap_or_default().to_string();
            let path = submission.workspace.asset_path("background", &original);
            if save_field(field, &path).await? > 0 {
                submission.background_image = Some(path);
            }
        } else if name == "jobId" {
            let raw = field.text().await?;
            if !raw.trim().is_empty() {
                submission.job_id = Some(JobId::parse(raw.trim())?);
            }
        } else if field.file_name().is_none() {
            let value = field.text().await?;
            submission.fields.insert(name, value);
        } else {
            debug!(field = %name, "Ignoring unexpected file field");
        }
    }

    Ok(submission)
}

/// Write one upload to `path`, returning the number of bytes written.
/// Empty uploads leave nothing behind.
async fn save_field(mut field: Field<'_>, path: &Path) -> ApiResult<u64> {
    let mut file = File::create(path).await?;
    let mut written = 0u64;

    while let Some(chunk) = field.chunk().await? {
        file.write_all(&chunk).await?;
        written += chunk.len() as u64;
    }
    file.flush().await?;

    if written == 0 {
        drop(file);
        let _ = tokio::fs::remove_file(path).await;
    }
    Ok(written)
}

/// Validate, run and deliver one submission.
async fn run(state: AppState, submission: Submission, operation: Operation) -> ApiResult<Response> {
    let kind = operation.kind();
    let Submission {
        workspace,
        job_id,
        inputs,
        first_name,
        ..
    } = submission;

    let request = TransformRequest::new(operation, inputs)?;
    let job_id = job_id.unwrap_or_else(|| JobId::generate(kind));
    let file_name = delivery_file_name(kind, first_name.as_deref().unwrap_or_default());

    info!(
        job_id = %job_id,
        operation = kind.as_str(),
        inputs = request.inputs().len(),
        "Transform submitted"
    );

    state.registry.set(&job_id, 0, UPLOADING_STATUS).await;
    if kind == OperationKind::RemoveBackground {
        state
            .registry
            .set(&job_id, PROCESSING_PROGRESS, PROCESSING_STATUS)
            .await;
    }

    let (result, workspace) = spawn_job(&state, job_id.clone(), request, workspace)
        .await
        .map_err(|e| ApiError::internal(format!("transform task failed: {e}")))?;
    let output = result.map_err(|e| ApiError::media(failure_context(kind), e))?;

    deliver(&job_id, &output, &file_name, workspace).await
}

/// Run the engine detached from the request so a client disconnect doesn't
/// kill it mid-run. The workspace comes back with the result.
fn spawn_job(
    state: &AppState,
    job_id: JobId,
    request: TransformRequest,
    workspace: JobWorkspace,
) -> JoinHandle<(MediaResult<PathBuf>, JobWorkspace)> {
    let executor = state.executor.clone();
    let registry = state.registry.clone();
    let grace = state.jobs.clear_grace;

    tokio::spawn(async move {
        let kind = request.operation().kind();
        let output = workspace.output_path(kind);
        let (tx, rx) = progress_channel();
        let updater = spawn_updater(registry.clone(), job_id.clone(), rx);

        metrics::record_job_started(kind.as_str());
        let result = executor.execute(&job_id, request, &output, tx).await;

        // Every event must be in the registry before it is cleared.
        if let Err(e) = updater.await {
            warn!(job_id = %job_id, "Progress updater ended abnormally: {}", e);
        }

        match &result {
            Ok(_) => {
                metrics::record_job_succeeded(kind.as_str());
                registry.clear_after(job_id, grace);
            }
            Err(_) => {
                metrics::record_job_failed(kind.as_str());
                registry.clear(&job_id).await;
            }
        }

        (result, workspace)
    })
}

/// Stream the output file back as an attachment.
async fn deliver(
    job_id: &JobId,
    output: &Path,
    file_name: &str,
    workspace: JobWorkspace,
) -> ApiResult<Response> {
    let file = File::open(output).await?;
    let len = file.metadata().await?.len();

    let stream = ReaderStream::new(file).map(move |chunk| {
        // The workspace lives as long as the body.
        let _workspace = &workspace;
        chunk
    });

    Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, "video/mp4")
        .header(header::CONTENT_LENGTH, len)
        .header(
            header::CONTENT_DISPOSITION,
            format!("attachment; filename=\"{file_name}\""),
        )
        .header(JOB_ID_HEADER, job_id.as_str())
        .body(Body::from_stream(stream))
        .map_err(|e| ApiError::internal(format!("failed to build response: {e}")))
}

fn failure_context(kind: OperationKind) -> &'static str {
    match kind {
        OperationKind::CleanAudio => "Audio cleaning",
        OperationKind::Merge => "Merging",
        OperationKind::Enhance => "Enhancement",
        OperationKind::RemoveBackground => "Background removal",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fields(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_form_defaults_when_fields_are_blank() {
        let form = remove_background_form(&fields(&[("similarity", " "), ("mode", "")])).unwrap();
        let defaults = RemoveBackgroundForm::default();
        assert_eq!(form.mode, defaults.mode);
        assert!((form.similarity - defaults.similarity).abs() < f64::EPSILON);
    }

    #[test]
    fn test_form_overrides() {
        let form = remove_background_form(&fields(&[
            ("backgroundType", "image"),
            ("backgroundColor", "#000"),
            ("chromaKeyColor", "blue"),
            ("similarity", "0.3"),
            ("blend", "0.1"),
            ("mode", "auto"),
        ]))
        .unwrap();
        assert_eq!(form.background_type, "image");
        assert_eq!(form.background_color, "#000");
        assert_eq!(form.chroma_key_color, "blue");
        assert!((form.similarity - 0.3).abs() < f64::EPSILON);
        assert!((form.blend - 0.1).abs() < f64::EPSILON);
        assert_eq!(form.mode, "auto");
    }

    #[test]
    fn test_non_numeric_similarity_is_validation_error() {
        let err = remove_background_form(&fields(&[("similarity", "lots")])).unwrap_err();
        assert_eq!(err.status_code(), StatusCode::BAD_REQUEST);
        assert!(matches!(
            err,
            ApiError::Validation(ValidationError::InvalidOption {
                field: "similarity",
                ..
            })
        ));

        assert!(remove_background_form(&fields(&[("blend", "NaN")])).is_err());
    }

    #[test]
    fn test_failure_contexts() {
        assert_eq!(failure_context(OperationKind::Merge), "Merging");
        assert_eq!(
            failure_context(OperationKind::RemoveBackground),
            "Background removal"
        );
    }
}
