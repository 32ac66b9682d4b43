//! Auth API Handlers
//!
//! Request/response types mirror the browser client's existing contract:
//! every auth endpoint answers `{success, message, ...}` on the happy
//! path and `{detail}` with a 4xx status on failure.

use axum::extract::State;
use axum::http::{header, HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::{Deserialize, Serialize};

use super::ApiState;
use crate::auth::{RegisterRequest, UserView};
use crate::errors::AuthError;

/// Login payload.
#[derive(Clone, Debug, Deserialize)]
pub struct LoginRequest {
    /// Login name.
    pub username: String,
    /// Login password.
    pub password: String,
}

/// Uniform auth endpoint response.
#[derive(Clone, Debug, Serialize)]
pub struct AuthResponse {
    /// Whether the operation succeeded.
    pub success: bool,
    /// Human-readable outcome.
    pub message: String,
    /// Session token, present after login only.
    pub session_id: Option<String>,
    /// Authenticated user, present after login only.
    pub user: Option<UserView>,
}

/// Handler-level error: auth failures plus the missing-header case,
/// which gets its own message to match the existing client.
pub(crate) enum ApiError {
    Auth(AuthError),
    MissingSession,
}

impl From<AuthError> for ApiError {
    fn from(err: AuthError) -> Self {
        Self::Auth(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        match self {
            Self::Auth(err) => err.into_response(),
            Self::MissingSession => (
                StatusCode::UNAUTHORIZED,
                Json(serde_json::json!({ "detail": "No session provided" })),
            )
                .into_response(),
        }
    }
}

/// `POST /register`
pub async fn register(
    State(state): State<ApiState>,
    Json(request): Json<RegisterRequest>,
) -> Result<Json<AuthResponse>, ApiError> {
    // Password hashing is deliberately slow; keep it off the async threads.
    let auth = state.auth.clone();
    run_blocking(move || auth.register(&request)).await?;

    Ok(Json(AuthResponse {
        success: true,
        message: "User registered successfully".to_string(),
        session_id: None,
        user: None,
    }))
}

/// `POST /login`
pub async fn login(
    State(state): State<ApiState>,
    Json(request): Json<LoginRequest>,
) -> Result<Json<AuthResponse>, ApiError> {
    let auth = state.auth.clone();
    let success =
        run_blocking(move || auth.login(&request.username, &request.password)).await?;

    Ok(Json(AuthResponse {
        success: true,
        message: "Login successful".to_string(),
        session_id: Some(success.session_id),
        user: Some(success.user),
    }))
}

/// `POST /logout` — idempotent; an unknown token still answers 200.
pub async fn logout(
    State(state): State<ApiState>,
    headers: HeaderMap,
) -> Result<Json<AuthResponse>, ApiError> {
    let token = bearer_token(&headers).ok_or(ApiError::MissingSession)?;
    state.auth.logout(&token)?;

    Ok(Json(AuthResponse {
        success: true,
        message: "Logged out successfully".to_string(),
        session_id: None,
        user: None,
    }))
}

/// `GET /me`
pub async fn me(
    State(state): State<ApiState>,
    headers: HeaderMap,
) -> Result<Json<serde_json::Value>, ApiError> {
    let token = bearer_token(&headers).ok_or(ApiError::MissingSession)?;
    let user = state.auth.validate(&token)?;

    Ok(Json(serde_json::json!({ "success": true, "user": user })))
}

/// `GET /health`
pub async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({ "status": "healthy", "service": "auth" }))
}

/// Extract the bearer session token from the Authorization header.
/// A raw token without the `Bearer ` prefix is accepted too, matching
/// the existing browser client.
fn bearer_token(headers: &HeaderMap) -> Option<String> {
    let value = headers.get(header::AUTHORIZATION)?.to_str().ok()?;
    let token = value.strip_prefix("Bearer ").unwrap_or(value).trim();
    if token.is_empty() {
        return None;
    }
    Some(token.to_string())
}

/// Run a store/hash operation on the blocking pool.
async fn run_blocking<T, F>(op: F) -> Result<T, ApiError>
where
    T: Send + 'static,
    F: FnOnce() -> Result<T, AuthError> + Send + 'static,
{
    match tokio::task::spawn_blocking(op).await {
        Ok(result) => result.map_err(ApiError::from),
        Err(e) => Err(ApiError::Auth(AuthError::Io(std::io::Error::other(e)))),
    }
}
