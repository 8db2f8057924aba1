/**
 * Authentication Routes
 * Session login, logout, and session introspection for the single admin.
 */
use axum::extract::State;
use axum::http::{header::SET_COOKIE, HeaderMap, StatusCode};
use axum::response::{AppendHeaders, IntoResponse};
use axum::Json;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::auth::credentials;
use crate::auth::session::{SESSION_COOKIE, SESSION_TTL_HOURS};
use crate::routes::{session_token, ErrorResponse, SuccessResponse};
use crate::AppState;

#[derive(Debug, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionInfo {
    pub authenticated: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<DateTime<Utc>>,
}

fn session_cookie(token: &str) -> String {
    format!(
        "{}={}; HttpOnly; SameSite=Lax; Path=/; Max-Age={}",
        SESSION_COOKIE,
        token,
        SESSION_TTL_HOURS * 3600
    )
}

fn clear_session_cookie() -> String {
    format!("{}=; HttpOnly; SameSite=Lax; Path=/; Max-Age=0", SESSION_COOKIE)
}

/// POST /api/auth/login
/// Verify credentials and issue the session cookie. The session is stored
/// before the response leaves, so a client following an immediate redirect
/// is already authenticated.
pub async fn login(
    State(state): State<AppState>,
    Json(payload): Json<LoginRequest>,
) -> impl IntoResponse {
    if payload.username.is_empty() || payload.password.is_empty() {
        return (
            StatusCode::BAD_REQUEST,
            Json(ErrorResponse::new("Username and password are required")),
        )
            .into_response();
    }

    if !credentials::verify_password(&state.pool, &payload.username, &payload.password).await {
        tracing::warn!("Failed login attempt for: {}", payload.username);
        return (
            StatusCode::UNAUTHORIZED,
            Json(ErrorResponse::new("Invalid credentials")),
        )
            .into_response();
    }

    let token = state.sessions.issue(&payload.username).await;
    tracing::info!("Successful login for: {}", payload.username);

    (
        StatusCode::OK,
        AppendHeaders([(SET_COOKIE, session_cookie(&token))]),
        Json(SuccessResponse { success: true }),
    )
        .into_response()
}

/// POST /api/auth/logout
/// Destroy the session unconditionally; always succeeds.
pub async fn logout(State(state): State<AppState>, headers: HeaderMap) -> impl IntoResponse {
    if let Some(token) = session_token(&headers) {
        state.sessions.revoke(&token).await;
    }

    (
        StatusCode::OK,
        AppendHeaders([(SET_COOKIE, clear_session_cookie())]),
        Json(SuccessResponse { success: true }),
    )
}

/// GET /api/auth/session
/// Report whether the caller holds a live session.
pub async fn session_info(State(state): State<AppState>, headers: HeaderMap) -> impl IntoResponse {
    let session = match session_token(&headers) {
        Some(token) => state.sessions.validate(&token).await,
        None => None,
    };

    match session {
        Some(session) => Json(SessionInfo {
            authenticated: true,
            username: Some(session.username),
            expires_at: Some(session.expires_at),
        }),
        None => Json(SessionInfo {
            authenticated: false,
            username: None,
            expires_at: None,
        }),
    }
}
