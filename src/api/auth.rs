//! Authentication API endpoints
//!
//! - GET  /api/v1/auth/setup - Whether the first administrator still has to be created
//! - POST /api/v1/auth/setup - Create the first administrator
//! - POST /api/v1/auth/login - Log in
//! - POST /api/v1/auth/logout - Log out
//! - GET  /api/v1/auth/me - Current user

use axum::{
    extract::State,
    http::{header, HeaderMap, HeaderValue, StatusCode},
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};

use crate::api::middleware::{extract_session_token, ApiError, AppState, AuthenticatedUser};
use crate::api::responses::{AuthResponse, UserResponse};
use crate::models::{AuthSession, CreateUserInput};
use crate::services::LoginInput;

/// Request body for first-run setup
#[derive(Debug, Deserialize)]
pub struct SetupRequest {
    pub username: String,
    pub name: String,
    pub email: String,
    pub password: String,
}

/// Request body for user login
#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub username_or_email: String,
    pub password: String,
}

#[derive(Debug, Serialize)]
pub struct SetupStatusResponse {
    pub needs_setup: bool,
}

/// Build public auth routes (no auth required)
pub fn public_router() -> Router<AppState> {
    Router::new()
        .route("/auth/setup", get(setup_status).post(setup))
        .route("/auth/login", post(login))
}

/// Build protected auth routes (requires auth middleware)
pub fn protected_router() -> Router<AppState> {
    Router::new()
        .route("/auth/logout", post(logout))
        .route("/auth/me", get(get_current_user))
}

/// GET /api/v1/auth/setup
async fn setup_status(
    State(state): State<AppState>,
) -> Result<Json<SetupStatusResponse>, ApiError> {
    let needs_setup = state.user_service.needs_setup().await?;
    Ok(Json(SetupStatusResponse { needs_setup }))
}

/// POST /api/v1/auth/setup
///
/// Only succeeds while no account exists; the new account is an admin.
async fn setup(
    State(state): State<AppState>,
    Json(body): Json<SetupRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let input = CreateUserInput {
        username: body.username,
        name: body.name,
        email: body.email,
        password: body.password,
        role: None,
    };

    let (user, session) = state.user_service.setup(input).await?;
    let headers = session_cookie_headers(&session, state.session_expiration_days)?;

    Ok((
        StatusCode::CREATED,
        headers,
        Json(AuthResponse {
            user: user.into(),
            token: session.id,
        }),
    ))
}

/// POST /api/v1/auth/login
async fn login(
    State(state): State<AppState>,
    Json(body): Json<LoginRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let input = LoginInput::new(body.username_or_email, body.password);
    let (user, session) = state.user_service.login(input).await?;

    tracing::info!(user_id = user.id, "User logged in");
    let headers = session_cookie_headers(&session, state.session_expiration_days)?;

    Ok((
        headers,
        Json(AuthResponse {
            user: user.into(),
            token: session.id,
        }),
    ))
}

/// POST /api/v1/auth/logout
async fn logout(
    State(state): State<AppState>,
    _user: AuthenticatedUser,
    headers: HeaderMap,
) -> Result<impl IntoResponse, ApiError> {
    let token = extract_session_token(&headers)
        .ok_or_else(|| ApiError::unauthorized("Missing authentication token"))?;

    state.user_service.logout(&token).await?;

    let mut response_headers = HeaderMap::new();
    response_headers.insert(
        header::SET_COOKIE,
        HeaderValue::from_static("session=; Path=/; HttpOnly; SameSite=Lax; Max-Age=0"),
    );

    Ok((StatusCode::NO_CONTENT, response_headers))
}

/// GET /api/v1/auth/me
async fn get_current_user(user: AuthenticatedUser) -> Json<UserResponse> {
    Json(user.0.into())
}

fn session_cookie_headers(session: &AuthSession, days: i64) -> Result<HeaderMap, ApiError> {
    let cookie = format!(
        "session={}; Path=/; HttpOnly; SameSite=Lax; Max-Age={}",
        session.id,
        days * 24 * 60 * 60
    );
    let value = HeaderValue::from_str(&cookie)
        .map_err(|e| ApiError::internal(&anyhow::anyhow!("Invalid session cookie: {}", e)))?;

    let mut headers = HeaderMap::new();
    headers.insert(header::SET_COOKIE, value);
    Ok(headers)
}

#[cfg(test)]
mod tests {
    use crate::api::testing::{body_json, json_request, request, TestApp};
    use axum::http::{header, StatusCode};
    use serde_json::json;

    #[tokio::test]
    async fn test_setup_creates_admin_once() {
        let app = TestApp::new().await;

        let (status, body) = app.send(request("GET", "/api/v1/auth/setup", None)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["needs_setup"], true);

        let setup = json!({
            "username": "admin",
            "name": "Ada Admin",
            "email": "admin@example.edu",
            "password": "password123"
        });
        let response = app
            .raw(json_request("POST", "/api/v1/auth/setup", None, &setup))
            .await;
        assert_eq!(response.status(), StatusCode::CREATED);
        let cookie = response.headers()[header::SET_COOKIE].to_str().unwrap().to_string();
        assert!(cookie.starts_with("session="));
        assert!(cookie.contains("HttpOnly"));
        let body = body_json(response).await;
        assert_eq!(body["user"]["role"], "admin");
        assert!(body["token"].as_str().is_some());

        let (status, _) = app
            .send(json_request("POST", "/api/v1/auth/setup", None, &setup))
            .await;
        assert_eq!(status, StatusCode::CONFLICT);

        let (_, body) = app.send(request("GET", "/api/v1/auth/setup", None)).await;
        assert_eq!(body["needs_setup"], false);
    }

    #[tokio::test]
    async fn test_login_me_logout() {
        let app = TestApp::new().await;
        app.student("s001", "password123").await;

        let (status, body) = app
            .send(json_request(
                "POST",
                "/api/v1/auth/login",
                None,
                &json!({"username_or_email": "s001", "password": "password123"}),
            ))
            .await;
        assert_eq!(status, StatusCode::OK);
        let token = body["token"].as_str().unwrap().to_string();

        let (status, me) = app.send(request("GET", "/api/v1/auth/me", Some(&token))).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(me["username"], "s001");
        assert!(me.get("password_hash").is_none());

        let (status, _) = app
            .send(request("POST", "/api/v1/auth/logout", Some(&token)))
            .await;
        assert_eq!(status, StatusCode::NO_CONTENT);

        let (status, body) = app.send(request("GET", "/api/v1/auth/me", Some(&token))).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body["error"]["code"], "UNAUTHORIZED");
    }

    #[tokio::test]
    async fn test_login_with_wrong_password() {
        let app = TestApp::new().await;
        app.student("s001", "password123").await;

        let (status, body) = app
            .send(json_request(
                "POST",
                "/api/v1/auth/login",
                None,
                &json!({"username_or_email": "s001", "password": "wrong"}),
            ))
            .await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body["error"]["code"], "UNAUTHORIZED");
    }
}
