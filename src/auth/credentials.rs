//! Credential store: the single admin identity, its bcrypt password hash and
//! two recovery-code hashes.

use bcrypt::{hash, verify, DEFAULT_COST};
use chrono::Utc;
use rand::distr::{Alphanumeric, SampleString};
use rand::Rng;
use sqlx::SqlitePool;

use crate::db::models::Admin;

pub const DEFAULT_USERNAME: &str = "admin";

/// Alphabet for recovery codes: uppercase letters and digits.
const CODE_ALPHABET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";
const CODE_LEN: usize = 16;
const CODE_GROUP: usize = 4;

#[derive(Debug, thiserror::Error)]
pub enum CredentialError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("hash error: {0}")]
    Hash(#[from] bcrypt::BcryptError),
    #[error("hashing task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
}

fn bcrypt_cost() -> u32 {
    // Minimum cost in tests so the suite stays fast; full cost otherwise.
    if cfg!(test) {
        4
    } else {
        DEFAULT_COST
    }
}

/// Plaintext credentials produced at first boot. Surfaced exactly once to
/// the operator; only the hashes are persisted.
#[derive(Debug, Clone)]
pub struct BootstrapCredentials {
    pub username: String,
    pub password: String,
    pub recovery_code1: String,
    pub recovery_code2: String,
}

/// Generate a recovery code: 16 characters from `A-Z0-9`, hyphen after every
/// 4th, e.g. `K3QP-07ZM-XA9D-41BN`.
pub fn generate_recovery_code() -> String {
    let mut rng = rand::rng();
    let mut code = String::with_capacity(CODE_LEN + CODE_LEN / CODE_GROUP - 1);
    for i in 0..CODE_LEN {
        if i > 0 && i % CODE_GROUP == 0 {
            code.push('-');
        }
        code.push(CODE_ALPHABET[rng.random_range(0..CODE_ALPHABET.len())] as char);
    }
    code
}

/// Generate a default admin password for first boot.
pub fn generate_password() -> String {
    Alphanumeric.sample_string(&mut rand::rng(), 16)
}

async fn fetch_admin(pool: &SqlitePool, username: &str) -> Result<Option<Admin>, sqlx::Error> {
    sqlx::query_as::<_, Admin>(
        r#"
        SELECT id, username, password, recovery_code1, recovery_code2, last_recovery_date
        FROM admin
        WHERE username = ?
        "#,
    )
    .bind(username)
    .fetch_optional(pool)
    .await
}

async fn fetch_sole_admin(pool: &SqlitePool) -> Result<Option<Admin>, sqlx::Error> {
    sqlx::query_as::<_, Admin>(
        r#"
        SELECT id, username, password, recovery_code1, recovery_code2, last_recovery_date
        FROM admin
        LIMIT 1
        "#,
    )
    .fetch_optional(pool)
    .await
}

/// bcrypt verify is CPU-bound; keep the async executor free.
async fn verify_blocking(plaintext: String, hashed: String) -> bool {
    tokio::task::spawn_blocking(move || verify(&plaintext, &hashed).unwrap_or(false))
        .await
        .unwrap_or(false)
}

/// Compare a plaintext password against the stored hash. Fails closed: a
/// lookup miss and a hash mismatch are indistinguishable to the caller.
pub async fn verify_password(pool: &SqlitePool, username: &str, plaintext: &str) -> bool {
    let admin = match fetch_admin(pool, username).await {
        Ok(Some(admin)) => admin,
        Ok(None) => return false,
        Err(e) => {
            tracing::error!("Database error during password verification: {}", e);
            return false;
        }
    };

    verify_blocking(plaintext.to_string(), admin.password).await
}

/// Compare a recovery code against both stored slots; either match succeeds.
pub async fn verify_recovery_code(pool: &SqlitePool, code: &str) -> bool {
    let admin = match fetch_sole_admin(pool).await {
        Ok(Some(admin)) => admin,
        Ok(None) => return false,
        Err(e) => {
            tracing::error!("Database error during recovery-code verification: {}", e);
            return false;
        }
    };

    if verify_blocking(code.to_string(), admin.recovery_code1).await {
        return true;
    }
    verify_blocking(code.to_string(), admin.recovery_code2).await
}

/// Overwrite the password and both recovery-code slots in one UPDATE, and
/// record the rotation timestamp. Either all three hashes land or none do.
pub async fn rotate_credentials(
    pool: &SqlitePool,
    new_password: &str,
    new_code1: &str,
    new_code2: &str,
) -> Result<(), CredentialError> {
    let (password, code1, code2) = (
        new_password.to_string(),
        new_code1.to_string(),
        new_code2.to_string(),
    );
    let cost = bcrypt_cost();
    let (password_hash, code1_hash, code2_hash) = tokio::task::spawn_blocking(
        move || -> Result<(String, String, String), bcrypt::BcryptError> {
            Ok((hash(&password, cost)?, hash(&code1, cost)?, hash(&code2, cost)?))
        },
    )
    .await??;

    sqlx::query(
        r#"
        UPDATE admin
        SET password = ?, recovery_code1 = ?, recovery_code2 = ?, last_recovery_date = ?
        "#,
    )
    .bind(&password_hash)
    .bind(&code1_hash)
    .bind(&code2_hash)
    .bind(Utc::now())
    .execute(pool)
    .await?;

    tracing::info!("Admin credentials rotated");
    Ok(())
}

/// First-boot setup: if no admin row exists, generate a default password and
/// two recovery codes, persist the hashes, and hand back the plaintext for
/// one-time display. Returns None when the admin row already exists.
pub async fn bootstrap_admin(
    pool: &SqlitePool,
) -> Result<Option<BootstrapCredentials>, CredentialError> {
    let existing: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM admin")
        .fetch_one(pool)
        .await?;
    if existing.0 > 0 {
        return Ok(None);
    }

    let credentials = BootstrapCredentials {
        username: DEFAULT_USERNAME.to_string(),
        password: generate_password(),
        recovery_code1: generate_recovery_code(),
        recovery_code2: generate_recovery_code(),
    };

    let (password, code1, code2) = (
        credentials.password.clone(),
        credentials.recovery_code1.clone(),
        credentials.recovery_code2.clone(),
    );
    let cost = bcrypt_cost();
    let (password_hash, code1_hash, code2_hash) = tokio::task::spawn_blocking(
        move || -> Result<(String, String, String), bcrypt::BcryptError> {
            Ok((hash(&password, cost)?, hash(&code1, cost)?, hash(&code2, cost)?))
        },
    )
    .await??;

    sqlx::query(
        r#"
        INSERT INTO admin (username, password, recovery_code1, recovery_code2)
        VALUES (?, ?, ?, ?)
        "#,
    )
    .bind(&credentials.username)
    .bind(&password_hash)
    .bind(&code1_hash)
    .bind(&code2_hash)
    .execute(pool)
    .await?;

    Ok(Some(credentials))
}
