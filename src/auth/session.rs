//! Session guard: opaque server-side sessions with a fixed TTL.
//!
//! A session token is 64 random alphanumeric characters handed to the client
//! in an HttpOnly cookie; the server keeps only a SHA-256 hash of it, mapped
//! to an explicit session value object.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use rand::distr::{Alphanumeric, SampleString};
use sha2::{Digest, Sha256};
use tokio::sync::RwLock;

/// Absolute session lifetime; no sliding renewal.
pub const SESSION_TTL_HOURS: i64 = 24;

pub const SESSION_COOKIE: &str = "session";

/// Authenticated session state.
#[derive(Debug, Clone)]
pub struct Session {
    pub username: String,
    pub issued_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl Session {
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at <= now
    }
}

fn generate_token() -> String {
    Alphanumeric.sample_string(&mut rand::rng(), 64)
}

/// Tokens are stored hashed so a leaked session map cannot be replayed.
fn hash_token(token: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(token.as_bytes());
    format!("{:x}", hasher.finalize())
}

/// In-memory session store, injected through application state.
#[derive(Debug, Clone, Default)]
pub struct SessionStore {
    sessions: Arc<RwLock<HashMap<String, Session>>>,
}

impl SessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Issue a session for the admin. The session is durable in the store
    /// before the token is returned, so a client following an immediate
    /// redirect always finds it.
    pub async fn issue(&self, username: &str) -> String {
        let token = generate_token();
        let now = Utc::now();
        let session = Session {
            username: username.to_string(),
            issued_at: now,
            expires_at: now + Duration::hours(SESSION_TTL_HOURS),
        };

        let mut sessions = self.sessions.write().await;
        // Evict expired sessions on every issue so the map stays bounded.
        sessions.retain(|_, s| !s.is_expired(now));
        sessions.insert(hash_token(&token), session);

        token
    }

    /// Look up a token. Denial (None) is a normal control-flow outcome for
    /// unknown, expired, or revoked tokens.
    pub async fn validate(&self, token: &str) -> Option<Session> {
        let sessions = self.sessions.read().await;
        let session = sessions.get(&hash_token(token))?;
        if session.is_expired(Utc::now()) {
            return None;
        }
        Some(session.clone())
    }

    /// Destroy session state unconditionally; idempotent.
    pub async fn revoke(&self, token: &str) {
        let mut sessions = self.sessions.write().await;
        sessions.remove(&hash_token(token));
    }
}
