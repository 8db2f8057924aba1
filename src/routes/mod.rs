/**
 * Routes Module
 * API route handlers
 */
pub mod auth;
pub mod blog;
pub mod galleries;
pub mod health;
pub mod recovery;

use axum::http::{HeaderMap, StatusCode};
use axum::Json;
use serde::Serialize;

use crate::auth::session::{Session, SESSION_COOKIE};
use crate::content::ContentError;
use crate::AppState;

/// Error response
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl ErrorResponse {
    pub fn new(error: impl Into<String>) -> Self {
        Self {
            error: error.into(),
            message: None,
        }
    }
}

/// Success response (for delete/logout)
#[derive(Debug, Serialize)]
pub struct SuccessResponse {
    pub success: bool,
}

/// Pull the session token out of the Cookie header.
pub(crate) fn session_token(headers: &HeaderMap) -> Option<String> {
    headers
        .get(axum::http::header::COOKIE)
        .and_then(|v| v.to_str().ok())?
        .split(';')
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(name, _)| *name == SESSION_COOKIE)
        .map(|(_, value)| value.to_string())
}

/// Gate for protected handlers. Denial is a normal outcome: the caller gets
/// 401 with a JSON body, never a panic.
pub(crate) async fn require_session(
    state: &AppState,
    headers: &HeaderMap,
) -> Result<Session, (StatusCode, Json<ErrorResponse>)> {
    let token = session_token(headers).ok_or((
        StatusCode::UNAUTHORIZED,
        Json(ErrorResponse::new("Authentication required")),
    ))?;

    state.sessions.validate(&token).await.ok_or((
        StatusCode::UNAUTHORIZED,
        Json(ErrorResponse::new("Invalid or expired session")),
    ))
}

/// Map content-store failures onto the HTTP surface.
pub(crate) fn content_error(e: ContentError) -> (StatusCode, Json<ErrorResponse>) {
    match e {
        ContentError::NotFound => (StatusCode::NOT_FOUND, Json(ErrorResponse::new("Not found"))),
        ContentError::DuplicateSlug => (
            StatusCode::CONFLICT,
            Json(ErrorResponse::new("Slug already exists")),
        ),
        ContentError::Database(e) => {
            tracing::error!("Database error: {}", e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(ErrorResponse::new("Database error")),
            )
        }
    }
}
