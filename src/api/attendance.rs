//! Attendance API endpoints
//!
//! - POST /api/v1/attendance/scan - Student check-in by QR payload
//! - GET  /api/v1/attendance/me - Own attendance history
//! - PUT  /api/v1/admin/attendance/{id} - Correct a record's status

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post, put},
    Json, Router,
};
use serde::Deserialize;

use crate::api::middleware::{ApiError, AppState, AuthenticatedUser};
use crate::api::responses::AttendanceResponse;
use crate::models::AttendanceStatus;

#[derive(Debug, Deserialize)]
pub struct ScanRequest {
    pub qr_payload: String,
}

#[derive(Debug, Deserialize)]
pub struct UpdateAttendanceRequest {
    pub status: AttendanceStatus,
}

pub fn protected_router() -> Router<AppState> {
    Router::new()
        .route("/attendance/scan", post(scan))
        .route("/attendance/me", get(my_attendance))
}

pub fn admin_router() -> Router<AppState> {
    Router::new().route("/admin/attendance/{id}", put(update_attendance))
}

/// POST /api/v1/attendance/scan
async fn scan(
    State(state): State<AppState>,
    AuthenticatedUser(user): AuthenticatedUser,
    Json(body): Json<ScanRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let record = state
        .attendance_service
        .check_in(&user, &body.qr_payload)
        .await?;

    Ok((StatusCode::CREATED, Json(AttendanceResponse::from(record))))
}

/// GET /api/v1/attendance/me
async fn my_attendance(
    State(state): State<AppState>,
    AuthenticatedUser(user): AuthenticatedUser,
) -> Result<Json<Vec<AttendanceResponse>>, ApiError> {
    let records = state.attendance_service.user_attendance(user.id).await?;
    Ok(Json(records.into_iter().map(AttendanceResponse::from).collect()))
}

/// PUT /api/v1/admin/attendance/{id}
async fn update_attendance(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    Json(body): Json<UpdateAttendanceRequest>,
) -> Result<Json<AttendanceResponse>, ApiError> {
    let record = state
        .attendance_service
        .update_status(id, body.status)
        .await?;

    Ok(Json(record.into()))
}
