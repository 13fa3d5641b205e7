//! Handlers for the `/animations` resource.
//!
//! Submission only records the job and queues it; generation and rendering
//! happen on the execution backend. Clients poll the status endpoint and
//! download the artifact exactly once.

use animgen_core::error::CoreError;
use animgen_core::job::{FailureKind, JobRecord, JobState};
use animgen_core::types::{JobId, Timestamp};
use axum::body::Body;
use axum::extract::{Path, Query, State};
use axum::http::header;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use futures::StreamExt;
use serde::{Deserialize, Serialize};
use tokio_util::io::ReaderStream;

use crate::error::{AppError, AppResult};
use crate::response::DataResponse;
use crate::state::AppState;

// ---------------------------------------------------------------------------
// Request / response types
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
pub struct SubmitAnimation {
    pub prompt: String,
}

/// Returned by a successful submission.
#[derive(Debug, Serialize)]
pub struct SubmitAccepted {
    pub job_id: JobId,
    pub state: JobState,
    pub message: &'static str,
    pub status_url: String,
}

#[derive(Debug, Default, Deserialize)]
pub struct StatusQuery {
    /// Include the generated scene source in the response.
    #[serde(default)]
    pub include_source: bool,
}

/// Status view of a single job.
#[derive(Debug, Serialize)]
pub struct AnimationStatus {
    pub job_id: JobId,
    pub state: JobState,
    pub message: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_detail: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failure_kind: Option<FailureKind>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub download_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub generated_source: Option<String>,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

impl AnimationStatus {
    fn from_record(record: &JobRecord, include_source: bool) -> Self {
        let download_url = (record.state() == JobState::Completed && !record.is_served())
            .then(|| download_path(record.id()));

        Self {
            job_id: record.id(),
            state: record.state(),
            message: record.state().message(),
            error_detail: record.error_detail(),
            failure_kind: record.failure().map(|f| f.kind()),
            download_url,
            generated_source: include_source
                .then(|| record.generated_source().map(str::to_string))
                .flatten(),
            created_at: record.created_at(),
            updated_at: record.updated_at(),
        }
    }
}

/// Parse a job id from the path. Anything that is not a UUID was never
/// issued, so it answers like any other unknown job.
fn parse_job_id(raw: &str) -> AppResult<JobId> {
    raw.parse().map_err(|_| AppError::UnknownJob(raw.to_string()))
}

fn status_path(id: JobId) -> String {
    format!("/api/v1/animations/{id}")
}

fn download_path(id: JobId) -> String {
    format!("/api/v1/animations/{id}/download")
}

// ---------------------------------------------------------------------------
// Submit
// ---------------------------------------------------------------------------

/// POST /api/v1/animations
///
/// Record a new job and queue it. Returns 202 with the job id; the job
/// starts in `pending`.
pub async fn submit_animation(
    State(state): State<AppState>,
    Json(input): Json<SubmitAnimation>,
) -> AppResult<impl IntoResponse> {
    let prompt = input.prompt.trim();
    if prompt.is_empty() {
        return Err(AppError::BadRequest("prompt must not be empty".into()));
    }

    let record = state.store.create(prompt).await;
    let id = record.id();

    if let Err(e) = state.backend.submit(id) {
        state.store.delete(id).await;
        return Err(e.into());
    }

    tracing::info!(job_id = %id, prompt_chars = prompt.chars().count(), "Animation submitted");

    Ok((
        StatusCode::ACCEPTED,
        Json(DataResponse {
            data: SubmitAccepted {
                job_id: id,
                state: record.state(),
                message: record.state().message(),
                status_url: status_path(id),
            },
        }),
    ))
}

// ---------------------------------------------------------------------------
// List
// ---------------------------------------------------------------------------

/// GET /api/v1/animations
///
/// Summaries of every tracked job, oldest first.
pub async fn list_animations(State(state): State<AppState>) -> AppResult<impl IntoResponse> {
    let jobs = state.store.list().await;
    Ok(Json(DataResponse { data: jobs }))
}

// ---------------------------------------------------------------------------
// Status
// ---------------------------------------------------------------------------

/// GET /api/v1/animations/{id}
///
/// Always succeeds for a known job, including failed ones.
/// `?include_source=true` adds the generated scene source.
pub async fn get_animation(
    State(state): State<AppState>,
    Path(raw_id): Path<String>,
    Query(query): Query<StatusQuery>,
) -> AppResult<impl IntoResponse> {
    let id = parse_job_id(&raw_id)?;
    let record = state.store.get(id).await?;
    Ok(Json(DataResponse {
        data: AnimationStatus::from_record(&record, query.include_source),
    }))
}

// ---------------------------------------------------------------------------
// Download
// ---------------------------------------------------------------------------

/// GET /api/v1/animations/{id}/download
///
/// Streams the artifact as a `video/mp4` attachment. Only the first request
/// succeeds; the file and the job are removed once the body is finished or
/// abandoned.
pub async fn download_animation(
    State(state): State<AppState>,
    Path(raw_id): Path<String>,
) -> AppResult<Response> {
    let id = parse_job_id(&raw_id)?;
    let mut lease = state.artifacts.fetch_for_download(id).await?;
    let file = lease
        .take_file()
        .ok_or_else(|| CoreError::Internal(format!("artifact handle for job {id} already taken")))?;

    let size = lease.size();
    let disposition = format!("attachment; filename=\"{}\"", lease.file_name());

    // The lease rides along with the stream and is dropped with the body.
    let stream = ReaderStream::new(file).map(move |chunk| {
        let _lease = &lease;
        chunk
    });

    Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, "video/mp4")
        .header(header::CONTENT_LENGTH, size.to_string())
        .header(header::CONTENT_DISPOSITION, disposition)
        .body(Body::from_stream(stream))
        .map_err(|e| AppError::InternalError(e.to_string()))
}

// ---------------------------------------------------------------------------
// Delete
// ---------------------------------------------------------------------------

/// DELETE /api/v1/animations/{id}
///
/// Remove a job and its artifact, whatever its state. Returns 204.
pub async fn delete_animation(
    State(state): State<AppState>,
    Path(raw_id): Path<String>,
) -> AppResult<StatusCode> {
    let id = parse_job_id(&raw_id)?;
    state.artifacts.delete(id).await?;
    Ok(StatusCode::NO_CONTENT)
}
