//! Two-phase password recovery.
//!
//! Phase one trades a valid recovery code for a short-lived single-use reset
//! token; phase two trades that token plus a new password for a full
//! credential rotation. The raw recovery code is never resubmitted, so a
//! captured phase-one request cannot be replayed once the token expires or
//! is consumed.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use rand::distr::{Alphanumeric, SampleString};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use sqlx::SqlitePool;
use tokio::sync::RwLock;

use super::credentials::{self, CredentialError};

pub const RESET_TOKEN_TTL_MINUTES: i64 = 15;
pub const MIN_PASSWORD_LEN: usize = 8;

/// Where a caller is in the recovery flow; echoed in responses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum RecoveryState {
    AwaitingCode,
    AwaitingNewPassword,
    Rotated,
}

#[derive(Debug, thiserror::Error)]
pub enum RecoveryError {
    #[error("invalid recovery code")]
    InvalidCode,
    #[error("invalid or expired reset token")]
    InvalidResetToken,
    #[error("password confirmation does not match")]
    PasswordMismatch,
    #[error("password must be at least {MIN_PASSWORD_LEN} characters long")]
    PasswordTooShort,
    #[error(transparent)]
    Credential(#[from] CredentialError),
}

impl RecoveryError {
    /// Validation errors keep the caller in the same state; anything else is
    /// a server failure.
    pub fn is_validation(&self) -> bool {
        !matches!(self, RecoveryError::Credential(_))
    }
}

/// New recovery codes handed back exactly once after a rotation.
#[derive(Debug, Clone)]
pub struct RotatedCodes {
    pub recovery_code1: String,
    pub recovery_code2: String,
}

fn hash_token(token: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(token.as_bytes());
    format!("{:x}", hasher.finalize())
}

/// In-memory store of outstanding reset tokens (hash -> expiry), injected
/// through application state.
#[derive(Debug, Clone, Default)]
pub struct ResetTokenStore {
    tokens: Arc<RwLock<HashMap<String, DateTime<Utc>>>>,
}

impl ResetTokenStore {
    pub fn new() -> Self {
        Self::default()
    }

    async fn issue(&self) -> String {
        let token = Alphanumeric.sample_string(&mut rand::rng(), 48);
        let now = Utc::now();
        let mut tokens = self.tokens.write().await;
        tokens.retain(|_, expires_at| *expires_at > now);
        tokens.insert(
            hash_token(&token),
            now + Duration::minutes(RESET_TOKEN_TTL_MINUTES),
        );
        token
    }

    async fn is_valid(&self, token: &str) -> bool {
        let tokens = self.tokens.read().await;
        tokens
            .get(&hash_token(token))
            .is_some_and(|expires_at| *expires_at > Utc::now())
    }

    async fn consume(&self, token: &str) {
        let mut tokens = self.tokens.write().await;
        tokens.remove(&hash_token(token));
    }
}

/// Phase one: `AwaitingCode -> AwaitingNewPassword`. Returns a reset token
/// iff the supplied code matches either stored slot.
pub async fn begin(
    pool: &SqlitePool,
    reset_tokens: &ResetTokenStore,
    code: &str,
) -> Result<String, RecoveryError> {
    if !credentials::verify_recovery_code(pool, code).await {
        return Err(RecoveryError::InvalidCode);
    }
    Ok(reset_tokens.issue().await)
}

/// Phase two: `AwaitingNewPassword -> Rotated`. Validates the reset token
/// and the new password, then rotates the password and both recovery codes
/// atomically. Validation failures leave the token usable and nothing
/// mutated.
pub async fn complete(
    pool: &SqlitePool,
    reset_tokens: &ResetTokenStore,
    reset_token: &str,
    new_password: &str,
    confirmation: &str,
) -> Result<RotatedCodes, RecoveryError> {
    if !reset_tokens.is_valid(reset_token).await {
        return Err(RecoveryError::InvalidResetToken);
    }
    if new_password != confirmation {
        return Err(RecoveryError::PasswordMismatch);
    }
    if new_password.len() < MIN_PASSWORD_LEN {
        return Err(RecoveryError::PasswordTooShort);
    }

    let codes = RotatedCodes {
        recovery_code1: credentials::generate_recovery_code(),
        recovery_code2: credentials::generate_recovery_code(),
    };

    credentials::rotate_credentials(pool, new_password, &codes.recovery_code1, &codes.recovery_code2)
        .await?;

    // Consumed only after the rotation landed; a DB failure above leaves the
    // token valid so the operator can retry phase two.
    reset_tokens.consume(reset_token).await;

    Ok(codes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::credentials::{bootstrap_admin, verify_password, DEFAULT_USERNAME};
    use crate::db::test_pool;

    #[tokio::test]
    async fn test_begin_rejects_invalid_code() {
        let pool = test_pool().await;
        bootstrap_admin(&pool).await.unwrap();
        let store = ResetTokenStore::new();

        let result = begin(&pool, &store, "AAAA-BBBB-CCCC-DDDD").await;
        assert!(matches!(result, Err(RecoveryError::InvalidCode)));
    }

    #[tokio::test]
    async fn test_full_flow_rotates_everything() {
        let pool = test_pool().await;
        let creds = bootstrap_admin(&pool).await.unwrap().unwrap();
        let store = ResetTokenStore::new();

        let reset_token = begin(&pool, &store, &creds.recovery_code1).await.unwrap();
        let rotated = complete(&pool, &store, &reset_token, "brand-new-pw", "brand-new-pw")
            .await
            .unwrap();

        assert!(verify_password(&pool, DEFAULT_USERNAME, "brand-new-pw").await);
        assert!(!verify_password(&pool, DEFAULT_USERNAME, &creds.password).await);
        assert!(!credentials::verify_recovery_code(&pool, &creds.recovery_code1).await);
        assert!(!credentials::verify_recovery_code(&pool, &creds.recovery_code2).await);
        assert!(credentials::verify_recovery_code(&pool, &rotated.recovery_code1).await);
        assert!(credentials::verify_recovery_code(&pool, &rotated.recovery_code2).await);
    }

    #[tokio::test]
    async fn test_reset_token_is_single_use() {
        let pool = test_pool().await;
        let creds = bootstrap_admin(&pool).await.unwrap().unwrap();
        let store = ResetTokenStore::new();

        let reset_token = begin(&pool, &store, &creds.recovery_code2).await.unwrap();
        complete(&pool, &store, &reset_token, "brand-new-pw", "brand-new-pw")
            .await
            .unwrap();

        let replay = complete(&pool, &store, &reset_token, "another-pw-12", "another-pw-12").await;
        assert!(matches!(replay, Err(RecoveryError::InvalidResetToken)));
    }

    #[tokio::test]
    async fn test_validation_failures_keep_token_usable() {
        let pool = test_pool().await;
        let creds = bootstrap_admin(&pool).await.unwrap().unwrap();
        let store = ResetTokenStore::new();

        let reset_token = begin(&pool, &store, &creds.recovery_code1).await.unwrap();

        let mismatch = complete(&pool, &store, &reset_token, "brand-new-pw", "different").await;
        assert!(matches!(mismatch, Err(RecoveryError::PasswordMismatch)));

        let short = complete(&pool, &store, &reset_token, "short", "short").await;
        assert!(matches!(short, Err(RecoveryError::PasswordTooShort)));

        // Old password untouched, token still good.
        assert!(verify_password(&pool, DEFAULT_USERNAME, &creds.password).await);
        complete(&pool, &store, &reset_token, "brand-new-pw", "brand-new-pw")
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_expired_reset_token_is_rejected() {
        let pool = test_pool().await;
        let creds = bootstrap_admin(&pool).await.unwrap().unwrap();
        let store = ResetTokenStore::new();

        let reset_token = begin(&pool, &store, &creds.recovery_code1).await.unwrap();
        {
            let mut tokens = store.tokens.write().await;
            for expires_at in tokens.values_mut() {
                *expires_at = Utc::now() - Duration::minutes(1);
            }
        }

        let result = complete(&pool, &store, &reset_token, "brand-new-pw", "brand-new-pw").await;
        assert!(matches!(result, Err(RecoveryError::InvalidResetToken)));
    }
}
