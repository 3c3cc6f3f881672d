//! Axum route handlers for the video analysis API.

use axum::{
    body::Body,
    extract::{multipart::Field, Multipart, Path, Query, Request, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use tower::ServiceExt;
use tower_http::services::ServeFile;
use tracing::info;
use uuid::Uuid;

use crate::analysis::pipeline::{analyze_video, final_phase};
use crate::analysis::session::SessionSnapshot;
use crate::analysis::storage::VideoStorage;
use crate::errors::AppError;
use crate::models::video::{FileState, StoredVideo, VideoFormat};
use crate::state::AppState;

/// Multipart field carrying the video file.
const VIDEO_FIELD: &str = "video";

// ────────────────────────────────────────────────────────────────────────────
// Request / Response types
// ────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct UploadQuery {
    pub session_id: Option<Uuid>,
}

#[derive(Debug, Serialize)]
pub struct UploadResponse {
    pub session_id: Uuid,
    pub file_name: String,
    pub format: VideoFormat,
    pub size_bytes: u64,
    pub preview_url: String,
}

#[derive(Debug, Serialize)]
pub struct AnalyzeResponse {
    pub session_id: Uuid,
    pub remote_file: String,
    pub state: FileState,
    pub polls: u32,
    pub feedback: String,
}

// ────────────────────────────────────────────────────────────────────────────
// Handlers
// ────────────────────────────────────────────────────────────────────────────

/// POST /api/v1/videos
///
/// Streams the uploaded video to disk for the given session (or a new one),
/// replacing whatever that session uploaded before. The session only changes
/// once the whole file is stored.
pub async fn handle_upload(
    State(state): State<AppState>,
    Query(query): Query<UploadQuery>,
    mut multipart: Multipart,
) -> Result<(StatusCode, Json<UploadResponse>), AppError> {
    let mut field = loop {
        match multipart.next_field().await? {
            Some(field) if field.name() == Some(VIDEO_FIELD) => break field,
            Some(_) => continue,
            None => {
                return Err(AppError::Validation(format!(
                    "Missing multipart field '{VIDEO_FIELD}'"
                )))
            }
        }
    };
    let file_name = field
        .file_name()
        .map(str::to_string)
        .ok_or_else(|| AppError::Validation("The video field must be a file".to_string()))?;

    let format = VideoFormat::from_file_name(&file_name).ok_or_else(|| {
        AppError::UnsupportedMediaType(format!(
            "'{file_name}' is not an mp4, mov or avi video"
        ))
    })?;

    let video = match query.session_id {
        Some(session_id) => {
            let slot = state.sessions.begin_upload(session_id)?;
            let video = receive_video(
                &state.storage,
                &mut field,
                session_id,
                &file_name,
                format,
                Some(slot.previous()),
            )
            .await?;
            if let Err(e) = slot.finish(video.clone()) {
                state.storage.remove(&video).await?;
                return Err(e);
            }
            video
        }
        None => {
            let session_id = Uuid::new_v4();
            let video =
                receive_video(&state.storage, &mut field, session_id, &file_name, format, None)
                    .await?;
            state.sessions.open(session_id, video.clone());
            video
        }
    };

    let session_id = video.session_id;
    Ok((
        StatusCode::CREATED,
        Json(UploadResponse {
            session_id,
            file_name: video.file_name,
            format: video.format,
            size_bytes: video.size_bytes,
            preview_url: format!("/api/v1/videos/{session_id}/file"),
        }),
    ))
}

/// GET /api/v1/videos/:session_id/file
///
/// Streams the stored video back for the preview player. Range requests are honoured.
pub async fn handle_preview(
    State(state): State<AppState>,
    Path(session_id): Path<Uuid>,
    request: Request,
) -> Result<Response, AppError> {
    let video = state.sessions.video(session_id)?;
    let response = ServeFile::new(&video.local_path)
        .oneshot(request)
        .await
        .unwrap_or_else(|never| match never {});
    Ok(response.map(Body::new).into_response())
}

/// POST /api/v1/videos/:session_id/analyze
///
/// Submits the session's video, waits for remote processing and returns the
/// model's feedback verbatim. The analysis runs in its own task so the session
/// phase is settled even if the client goes away.
pub async fn handle_analyze(
    State(state): State<AppState>,
    Path(session_id): Path<Uuid>,
) -> Result<Json<AnalyzeResponse>, AppError> {
    let (video, cancel) = state.sessions.begin_analysis(session_id)?;
    info!("Analysis started for session {session_id}");

    let sessions = state.sessions.clone();
    let model = state.model.clone();
    let poll_interval = state.config.poll_interval;

    let task = tokio::spawn(async move {
        let result = analyze_video(model.as_ref(), &video, poll_interval, &cancel, |phase| {
            sessions.set_phase(session_id, phase)
        })
        .await;
        sessions.set_phase(session_id, final_phase(&result));
        result
    });

    let outcome = task
        .await
        .map_err(|e| AppError::Internal(anyhow::anyhow!("analysis task aborted: {e}")))??;
    info!("Analysis completed for session {session_id}");

    Ok(Json(AnalyzeResponse {
        session_id,
        remote_file: outcome.remote_file.name,
        state: outcome.remote_file.state,
        polls: outcome.polls,
        feedback: outcome.feedback,
    }))
}

/// GET /api/v1/videos/:session_id/status
pub async fn handle_status(
    State(state): State<AppState>,
    Path(session_id): Path<Uuid>,
) -> Result<Json<SessionSnapshot>, AppError> {
    Ok(Json(state.sessions.snapshot(session_id)?))
}

/// POST /api/v1/videos/:session_id/cancel
pub async fn handle_cancel(
    State(state): State<AppState>,
    Path(session_id): Path<Uuid>,
) -> Result<StatusCode, AppError> {
    state.sessions.cancel(session_id)?;
    info!("Cancellation requested for session {session_id}");
    Ok(StatusCode::NO_CONTENT)
}

/// DELETE /api/v1/videos/:session_id
///
/// Ends the session: stops any running analysis and deletes the stored video.
pub async fn handle_delete(
    State(state): State<AppState>,
    Path(session_id): Path<Uuid>,
) -> Result<StatusCode, AppError> {
    let video = state.sessions.remove(session_id)?;
    state.storage.remove(&video).await?;
    info!("Session {session_id} closed");
    Ok(StatusCode::NO_CONTENT)
}

/// Copies the field to storage chunk by chunk. On any error the partial file is
/// discarded and nothing at the session's path changes.
async fn receive_video(
    storage: &VideoStorage,
    field: &mut Field<'_>,
    session_id: Uuid,
    file_name: &str,
    format: VideoFormat,
    previous: Option<&StoredVideo>,
) -> Result<StoredVideo, AppError> {
    let mut upload = storage.begin(session_id, file_name, format).await?;
    while let Some(chunk) = field.chunk().await? {
        upload.write(&chunk).await?;
    }
    Ok(upload.commit(previous).await?)
}
