use axum::Json;
use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, State};
use axum::http::{StatusCode, header};
use axum::response::{IntoResponse, Response};
use courier_core::service::SessionDetails;
use courier_core::session::{SessionKey, SessionStatus, SessionSummary};
use courier_core::submission::{Submission, SubmissionPreview};
use courier_core::validation::SessionRequest;
use serde::{Deserialize, Serialize};

use super::AppState;
use crate::error::ApiError;

#[derive(Debug, Serialize, Deserialize)]
pub struct CreateSessionResponse {
    pub key: SessionKey,
    pub status: SessionStatus,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ListSessionsResponse {
    pub sessions: Vec<SessionSummary>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ControlRequest {
    pub action: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ControlResponse {
    pub key: String,
    pub status: SessionStatus,
}

pub async fn livez() -> (StatusCode, &'static str) {
    (StatusCode::OK, "ok")
}

/// POST /api/v1/sessions
pub async fn create_session(
    State(state): State<AppState>,
    payload: Result<Json<SessionRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<CreateSessionResponse>), ApiError> {
    let Json(request) = payload?;
    let key = state.service.create_session(request)?;
    let status = state
        .service
        .registry()
        .get(key)
        .map_or(SessionStatus::Starting, |session| session.status());

    tracing::info!(session_key = %key, "Session created over HTTP");
    Ok((StatusCode::CREATED, Json(CreateSessionResponse { key, status })))
}

/// GET /api/v1/sessions
pub async fn list_sessions(
    State(state): State<AppState>,
) -> Result<Json<ListSessionsResponse>, ApiError> {
    let sessions = state.service.list_sessions()?;
    Ok(Json(ListSessionsResponse { sessions }))
}

/// GET /api/v1/sessions/{key}
pub async fn get_session(
    State(state): State<AppState>,
    Path(key): Path<String>,
) -> Result<Json<SessionDetails>, ApiError> {
    Ok(Json(state.service.get_session_summary(&key)?.redacted()))
}

/// POST /api/v1/sessions/{key}/control
pub async fn control_session(
    State(state): State<AppState>,
    Path(key): Path<String>,
    payload: Result<Json<ControlRequest>, JsonRejection>,
) -> Result<Json<ControlResponse>, ApiError> {
    let Json(request) = payload?;
    let status = state.service.control_session(&key, &request.action)?;

    tracing::info!(
        session_key = %key,
        action = %request.action,
        %status,
        "Session control applied"
    );
    Ok(Json(ControlResponse { key, status }))
}

/// GET /api/v1/sessions/{key}/logs
pub async fn download_logs(
    State(state): State<AppState>,
    Path(key): Path<String>,
) -> Result<Response, ApiError> {
    let body = state.service.download_logs(&key)?;
    let disposition = format!("attachment; filename=\"session_{}_logs.txt\"", key.trim());

    Ok((
        [
            (header::CONTENT_TYPE, "text/plain; charset=utf-8".to_string()),
            (header::CONTENT_DISPOSITION, disposition),
        ],
        body,
    )
        .into_response())
}

/// DELETE /api/v1/sessions/{key}
pub async fn delete_session(
    State(state): State<AppState>,
    Path(key): Path<String>,
) -> Result<StatusCode, ApiError> {
    state.service.remove_session(&key)?;
    Ok(StatusCode::NO_CONTENT)
}

/// POST /api/v1/submissions
pub async fn create_submission(
    State(state): State<AppState>,
    payload: Result<Json<Submission>, JsonRejection>,
) -> Result<(StatusCode, Json<SubmissionPreview>), ApiError> {
    let Json(submission) = payload?;
    let preview = state.submissions.save(&submission)?;
    Ok((StatusCode::CREATED, Json(preview)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn livez_reports_ok() {
        let (status, body) = livez().await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, "ok");
    }
}
