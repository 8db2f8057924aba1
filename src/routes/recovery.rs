/**
 * Recovery Routes
 * Two-phase password reset: recovery code -> reset token -> rotation.
 */
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use serde::{Deserialize, Serialize};

use crate::auth::recovery::{self, RecoveryState};
use crate::routes::ErrorResponse;
use crate::AppState;

#[derive(Debug, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VerifyCodeRequest {
    pub code: String,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VerifyCodeResponse {
    pub state: RecoveryState,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reset_token: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ResetPasswordRequest {
    pub reset_token: String,
    pub new_password: String,
    pub confirm_password: String,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResetPasswordResponse {
    pub state: RecoveryState,
    /// Displayed exactly once; only hashes are persisted.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub recovery_code1: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub recovery_code2: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// POST /api/recovery/verify-code
/// Phase one: trade a recovery code for a short-lived reset token.
pub async fn verify_code(
    State(state): State<AppState>,
    Json(payload): Json<VerifyCodeRequest>,
) -> impl IntoResponse {
    match recovery::begin(&state.pool, &state.reset_tokens, payload.code.trim()).await {
        Ok(reset_token) => (
            StatusCode::OK,
            Json(VerifyCodeResponse {
                state: RecoveryState::AwaitingNewPassword,
                reset_token: Some(reset_token),
                error: None,
            }),
        ),
        Err(e) => (
            StatusCode::BAD_REQUEST,
            Json(VerifyCodeResponse {
                state: RecoveryState::AwaitingCode,
                reset_token: None,
                error: Some(e.to_string()),
            }),
        ),
    }
}

/// POST /api/recovery/reset-password
/// Phase two: rotate the password and both recovery codes.
pub async fn reset_password(
    State(state): State<AppState>,
    Json(payload): Json<ResetPasswordRequest>,
) -> impl IntoResponse {
    match recovery::complete(
        &state.pool,
        &state.reset_tokens,
        &payload.reset_token,
        &payload.new_password,
        &payload.confirm_password,
    )
    .await
    {
        Ok(codes) => (
            StatusCode::OK,
            Json(ResetPasswordResponse {
                state: RecoveryState::Rotated,
                recovery_code1: Some(codes.recovery_code1),
                recovery_code2: Some(codes.recovery_code2),
                error: None,
            }),
        )
            .into_response(),
        Err(e) if e.is_validation() => (
            StatusCode::BAD_REQUEST,
            Json(ResetPasswordResponse {
                state: RecoveryState::AwaitingNewPassword,
                recovery_code1: None,
                recovery_code2: None,
                error: Some(e.to_string()),
            }),
        )
            .into_response(),
        Err(e) => {
            tracing::error!("Credential rotation failed: {}", e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(ErrorResponse::new("Failed to rotate credentials")),
            )
                .into_response()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::credentials::{bootstrap_admin, verify_password, DEFAULT_USERNAME};
    use crate::test_support::{router_for, test_state};
    use axum::body::Body;
    use axum::http::Request;
    use tower::ServiceExt;

    async fn post_json<T: serde::de::DeserializeOwned>(
        app: axum::Router,
        uri: &str,
        json: &impl serde::Serialize,
    ) -> (StatusCode, T) {
        let req = Request::post(uri)
            .header("content-type", "application/json")
            .body(Body::from(serde_json::to_vec(json).unwrap()))
            .unwrap();
        let res = app.oneshot(req).await.unwrap();
        let status = res.status();
        let bytes = axum::body::to_bytes(res.into_body(), usize::MAX).await.unwrap();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    #[tokio::test]
    async fn test_invalid_code_stays_in_phase_one() {
        let state = test_state().await;
        bootstrap_admin(&state.pool).await.unwrap();

        let (status, body): (_, VerifyCodeResponse) = post_json(
            router_for(state),
            "/api/recovery/verify-code",
            &VerifyCodeRequest {
                code: "AAAA-BBBB-CCCC-DDDD".to_string(),
            },
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body.state, RecoveryState::AwaitingCode);
        assert!(body.reset_token.is_none());
    }

    #[tokio::test]
    async fn test_full_recovery_over_http() {
        let state = test_state().await;
        let creds = bootstrap_admin(&state.pool).await.unwrap().unwrap();
        let pool = state.pool.clone();
        let app = router_for(state);

        let (status, phase1): (_, VerifyCodeResponse) = post_json(
            app.clone(),
            "/api/recovery/verify-code",
            &VerifyCodeRequest {
                code: creds.recovery_code1.clone(),
            },
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(phase1.state, RecoveryState::AwaitingNewPassword);
        let reset_token = phase1.reset_token.unwrap();

        let (status, phase2): (_, ResetPasswordResponse) = post_json(
            app,
            "/api/recovery/reset-password",
            &ResetPasswordRequest {
                reset_token,
                new_password: "a-much-better-pw".to_string(),
                confirm_password: "a-much-better-pw".to_string(),
            },
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(phase2.state, RecoveryState::Rotated);
        assert_eq!(phase2.recovery_code1.unwrap().len(), 19);

        assert!(verify_password(&pool, DEFAULT_USERNAME, "a-much-better-pw").await);
    }

    #[tokio::test]
    async fn test_mismatched_confirmation_stays_in_phase_two() {
        let state = test_state().await;
        let creds = bootstrap_admin(&state.pool).await.unwrap().unwrap();
        let app = router_for(state);

        let (_, phase1): (_, VerifyCodeResponse) = post_json(
            app.clone(),
            "/api/recovery/verify-code",
            &VerifyCodeRequest {
                code: creds.recovery_code2.clone(),
            },
        )
        .await;

        let (status, body): (_, ResetPasswordResponse) = post_json(
            app,
            "/api/recovery/reset-password",
            &ResetPasswordRequest {
                reset_token: phase1.reset_token.unwrap(),
                new_password: "a-much-better-pw".to_string(),
                confirm_password: "something-else".to_string(),
            },
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body.state, RecoveryState::AwaitingNewPassword);
    }
}
