//! User administration API endpoints
//!
//! - GET  /api/v1/admin/users - List accounts (filter by role, paginated)
//! - POST /api/v1/admin/users - Create an account
//! - POST /api/v1/admin/users/import - Bulk-create students
//! - PUT  /api/v1/admin/users/{id}/status - Activate or deactivate

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post, put},
    Json, Router,
};
use serde::{Deserialize, Serialize};

use crate::api::common::{total_pages, UserListQuery};
use crate::api::middleware::{ApiError, AppState};
use crate::api::responses::{PaginatedUsersResponse, UserResponse};
use crate::models::{CreateUserInput, UserStatus};
use crate::services::SkippedRow;

#[derive(Debug, Deserialize)]
pub struct ImportRequest {
    pub students: Vec<CreateUserInput>,
}

#[derive(Debug, Serialize)]
pub struct ImportResponse {
    pub created: Vec<UserResponse>,
    pub skipped: Vec<SkippedRow>,
}

#[derive(Debug, Deserialize)]
pub struct UpdateStatusRequest {
    pub status: UserStatus,
}

pub fn admin_router() -> Router<AppState> {
    Router::new()
        .route("/admin/users", get(list_users).post(create_user))
        .route("/admin/users/import", post(import_students))
        .route("/admin/users/{id}/status", put(update_status))
}

/// GET /api/v1/admin/users
async fn list_users(
    State(state): State<AppState>,
    Query(query): Query<UserListQuery>,
) -> Result<Json<PaginatedUsersResponse>, ApiError> {
    let page = query.page.max(1);
    let per_page = query.per_page.clamp(1, 100);

    let (users, total) = state
        .user_service
        .list_users(query.role, page, per_page)
        .await?;

    Ok(Json(PaginatedUsersResponse {
        users: users.into_iter().map(UserResponse::from).collect(),
        total,
        page,
        per_page,
        total_pages: total_pages(total, per_page),
    }))
}

/// POST /api/v1/admin/users
async fn create_user(
    State(state): State<AppState>,
    Json(input): Json<CreateUserInput>,
) -> Result<impl IntoResponse, ApiError> {
    let user = state.user_service.create_user(input).await?;
    tracing::info!(user_id = user.id, role = %user.role, "User created");

    Ok((StatusCode::CREATED, Json(UserResponse::from(user))))
}

/// POST /api/v1/admin/users/import
///
/// Invalid or duplicate rows are reported back, not treated as failures.
async fn import_students(
    State(state): State<AppState>,
    Json(body): Json<ImportRequest>,
) -> Result<Json<ImportResponse>, ApiError> {
    let report = state.user_service.import_students(body.students).await?;

    Ok(Json(ImportResponse {
        created: report.created.into_iter().map(UserResponse::from).collect(),
        skipped: report.skipped,
    }))
}

/// PUT /api/v1/admin/users/{id}/status
async fn update_status(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    Json(body): Json<UpdateStatusRequest>,
) -> Result<Json<UserResponse>, ApiError> {
    let user = state.user_service.update_status(id, body.status).await?;
    tracing::info!(user_id = id, status = %user.status, "User status changed");

    Ok(Json(user.into()))
}

#[cfg(test)]
mod tests {
    use crate::api::testing::{json_request, request, TestApp};
    use axum::http::StatusCode;
    use serde_json::json;

    #[tokio::test]
    async fn test_create_and_list_users() {
        let app = TestApp::new().await;
        let (_, admin) = app.admin().await;

        let (status, created) = app
            .send(json_request(
                "POST",
                "/api/v1/admin/users",
                Some(&admin),
                &json!({
                    "username": "s001",
                    "name": "Grace Hopper",
                    "email": "s001@example.edu",
                    "password": "password123"
                }),
            ))
            .await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(created["role"], "student");

        let (status, body) = app
            .send(request("GET", "/api/v1/admin/users?role=student", Some(&admin)))
            .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["total"], 1);
        assert_eq!(body["users"][0]["username"], "s001");

        let (_, body) = app
            .send(request("GET", "/api/v1/admin/users?page=1&per_page=1", Some(&admin)))
            .await;
        assert_eq!(body["total"], 2);
        assert_eq!(body["total_pages"], 2);
        assert_eq!(body["users"].as_array().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_huge_page_number_returns_empty_page() {
        let app = TestApp::new().await;
        let (_, admin) = app.admin().await;

        let (status, body) = app
            .send(request(
                "GET",
                "/api/v1/admin/users?page=9223372036854775807",
                Some(&admin),
            ))
            .await;
        assert_eq!(status, StatusCode::OK);
        assert!(body["users"].as_array().unwrap().is_empty());
        assert_eq!(body["total"], 1);
    }

    #[tokio::test]
    async fn test_import_reports_skipped_rows() {
        let app = TestApp::new().await;
        let (_, admin) = app.admin().await;

        let (status, body) = app
            .send(json_request(
                "POST",
                "/api/v1/admin/users/import",
                Some(&admin),
                &json!({"students": [
                    {"username": "s001", "name": "A", "email": "a@example.edu", "password": "pw"},
                    {"username": "s001", "name": "B", "email": "b@example.edu", "password": "pw"},
                    {"username": "s002", "name": "C", "email": "not-an-email", "password": "pw"}
                ]}),
            ))
            .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["created"].as_array().unwrap().len(), 1);
        let skipped = body["skipped"].as_array().unwrap();
        assert_eq!(skipped.len(), 2);
        assert_eq!(skipped[0]["row"], 1);
        assert_eq!(skipped[1]["username"], "s002");
    }

    #[tokio::test]
    async fn test_deactivated_user_loses_access() {
        let app = TestApp::new().await;
        let (_, admin) = app.admin().await;
        let (student, token) = app.student("s001", "password123").await;

        let uri = format!("/api/v1/admin/users/{}/status", student.id);
        let (status, body) = app
            .send(json_request("PUT", &uri, Some(&admin), &json!({"status": "inactive"})))
            .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "inactive");

        let (status, _) = app.send(request("GET", "/api/v1/auth/me", Some(&token))).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);

        let (status, _) = app
            .send(json_request(
                "PUT",
                "/api/v1/admin/users/999/status",
                Some(&admin),
                &json!({"status": "active"}),
            ))
            .await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }
}
