//! Session API endpoints
//!
//! Administrators open, inspect and close sessions and can trigger a sweep
//! pass by hand. Any logged-in user can list the sessions that are open.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use chrono::Utc;

use crate::api::middleware::{ApiError, AppState, AuthenticatedUser};
use crate::api::responses::{AttendanceResponse, SessionAttendanceResponse, SessionResponse};
use crate::models::CreateSessionInput;
use crate::services::SweepReport;

/// Build admin session routes
pub fn admin_router() -> Router<AppState> {
    Router::new()
        .route("/admin/sessions", post(create_session).get(list_sessions))
        .route("/admin/sessions/{id}", get(get_session))
        .route("/admin/sessions/{id}/close", post(close_session))
        .route("/admin/sessions/{id}/attendance", get(session_attendance))
        .route("/admin/sweep", post(run_sweep))
}

/// Build session routes for any authenticated user
pub fn protected_router() -> Router<AppState> {
    Router::new().route("/sessions/active", get(active_sessions))
}

/// POST /api/v1/admin/sessions
async fn create_session(
    State(state): State<AppState>,
    AuthenticatedUser(admin): AuthenticatedUser,
    Json(input): Json<CreateSessionInput>,
) -> Result<impl IntoResponse, ApiError> {
    let session = state.session_service.create_session(input, &admin).await?;
    Ok((StatusCode::CREATED, Json(SessionResponse::from(session))))
}

/// GET /api/v1/admin/sessions
async fn list_sessions(
    State(state): State<AppState>,
) -> Result<Json<Vec<SessionResponse>>, ApiError> {
    let sessions = state.session_service.list_sessions().await?;
    Ok(Json(sessions.into_iter().map(SessionResponse::from).collect()))
}

/// GET /api/v1/admin/sessions/{id}
async fn get_session(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<Json<SessionResponse>, ApiError> {
    let session = state.session_service.get_session(id).await?;
    Ok(Json(session.into()))
}

/// POST /api/v1/admin/sessions/{id}/close
async fn close_session(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<Json<SessionResponse>, ApiError> {
    let session = state.session_service.close_session(id).await?;
    Ok(Json(session.into()))
}

/// GET /api/v1/admin/sessions/{id}/attendance
async fn session_attendance(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<Json<SessionAttendanceResponse>, ApiError> {
    let view = state.attendance_service.session_attendance(id).await?;
    Ok(Json(SessionAttendanceResponse {
        session: view.session.into(),
        records: view.records.into_iter().map(AttendanceResponse::from).collect(),
        summary: view.summary,
    }))
}

/// POST /api/v1/admin/sweep
///
/// Runs one pass synchronously. Unlike the background task, a storage
/// failure is reported to the caller.
async fn run_sweep(State(state): State<AppState>) -> Result<Json<SweepReport>, ApiError> {
    let report = state
        .sweeper
        .run_once(Utc::now())
        .await
        .map_err(|e| ApiError::internal(&anyhow::Error::new(e)))?;

    Ok(Json(report))
}

/// GET /api/v1/sessions/active
async fn active_sessions(
    State(state): State<AppState>,
) -> Result<Json<Vec<SessionResponse>>, ApiError> {
    let sessions = state.session_service.active_sessions().await?;
    Ok(Json(
        sessions
            .into_iter()
            .map(SessionResponse::without_payload)
            .collect(),
    ))
}
