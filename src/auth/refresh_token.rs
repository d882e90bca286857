/// Refresh Token Store
///
/// Server-side state for issued refresh tokens. Only the SHA-256 of a raw
/// token is ever stored, and lookup is always by that hash; the raw token is
/// the only credential the client holds. Records are never deleted here:
/// `revoked` flips false -> true exactly once (rotation or logout), and
/// expiry is derived from `expires_at` at read time. Rotated-out, revoked,
/// and expired are deliberately collapsed into that one boolean plus the
/// timestamp.

use chrono::{DateTime, Utc};
use sha2::{Digest, Sha256};
use sqlx::{PgPool, Postgres, Transaction};
use uuid::Uuid;

use crate::error::{AppError, AuthError};

/// Request context captured when a token is issued, kept for audit.
#[derive(Debug, Clone, Default)]
pub struct TokenMetadata {
    pub user_agent: Option<String>,
    pub ip: Option<String>,
}

/// One issued refresh token's server-side record.
#[derive(Debug, sqlx::FromRow)]
pub struct RefreshTokenRecord {
    pub id: Uuid,
    pub user_id: Uuid,
    pub token_hash: String,
    pub user_agent: Option<String>,
    pub ip: Option<String>,
    pub expires_at: DateTime<Utc>,
    pub revoked: bool,
    pub created_at: DateTime<Utc>,
}

impl RefreshTokenRecord {
    pub fn is_expired(&self) -> bool {
        self.expires_at < Utc::now()
    }
}

/// Hash a raw refresh token with SHA-256 (hex).
pub fn hash_token(token: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(token.as_bytes());
    format!("{:x}", hasher.finalize())
}

/// Insert a new active record for a freshly issued refresh token.
///
/// Generic over the executor so it can run inside the login and rotation
/// transactions.
pub async fn save_refresh_token<'e, E>(
    executor: E,
    user_id: Uuid,
    token: &str,
    ttl: chrono::Duration,
    metadata: &TokenMetadata,
) -> Result<(), AppError>
where
    E: sqlx::Executor<'e, Database = Postgres>,
{
    let token_hash = hash_token(token);
    let now = Utc::now();

    sqlx::query(
        r#"
        INSERT INTO refresh_tokens (id, user_id, token_hash, user_agent, ip, expires_at, revoked, created_at)
        VALUES ($1, $2, $3, $4, $5, $6, FALSE, $7)
        "#,
    )
    .bind(Uuid::new_v4())
    .bind(user_id)
    .bind(token_hash)
    .bind(&metadata.user_agent)
    .bind(&metadata.ip)
    .bind(now + ttl)
    .bind(now)
    .execute(executor)
    .await?;

    Ok(())
}

/// Look up a record by the hash of a presented token.
pub async fn find_by_hash(
    pool: &PgPool,
    token_hash: &str,
) -> Result<Option<RefreshTokenRecord>, AppError> {
    let record = sqlx::query_as::<_, RefreshTokenRecord>(
        r#"
        SELECT id, user_id, token_hash, user_agent, ip, expires_at, revoked, created_at
        FROM refresh_tokens
        WHERE token_hash = $1
        "#,
    )
    .bind(token_hash)
    .fetch_optional(pool)
    .await?;

    Ok(record)
}

/// Atomically consume a refresh token for rotation.
///
/// Locks the matching row so that two concurrent rotations of the same raw
/// token resolve to exactly one winner: the loser blocks on the lock, then
/// sees `revoked = true` and is rejected. Expired records are rejected
/// without flipping the flag; expiry is terminal on its own.
///
/// The caller inserts the successor record and commits.
pub async fn consume_refresh_token(
    tx: &mut Transaction<'_, Postgres>,
    token_hash: &str,
) -> Result<Uuid, AppError> {
    let row = sqlx::query_as::<_, (Uuid, DateTime<Utc>, bool)>(
        r#"
        SELECT user_id, expires_at, revoked
        FROM refresh_tokens
        WHERE token_hash = $1
        FOR UPDATE
        "#,
    )
    .bind(token_hash)
    .fetch_optional(&mut *tx)
    .await?;

    let (user_id, expires_at, revoked) = match row {
        None => {
            tracing::warn!("Refresh token not found in store");
            return Err(AuthError::TokenInvalid.into());
        }
        Some(row) => row,
    };

    if revoked {
        tracing::warn!(user_id = %user_id, "Attempt to reuse a revoked refresh token");
        return Err(AuthError::TokenInvalid.into());
    }

    if expires_at < Utc::now() {
        tracing::info!(user_id = %user_id, "Refresh token expired");
        return Err(AuthError::TokenExpired.into());
    }

    sqlx::query(
        r#"
        UPDATE refresh_tokens
        SET revoked = TRUE, revoked_at = $1
        WHERE token_hash = $2
        "#,
    )
    .bind(Utc::now())
    .bind(token_hash)
    .execute(&mut *tx)
    .await?;

    Ok(user_id)
}

/// Revoke the record matching a token hash. Idempotent: absent or
/// already-revoked records are left untouched without error.
pub async fn revoke_by_hash<'e, E>(executor: E, token_hash: &str) -> Result<(), AppError>
where
    E: sqlx::Executor<'e, Database = Postgres>,
{
    sqlx::query(
        r#"
        UPDATE refresh_tokens
        SET revoked = TRUE, revoked_at = $1
        WHERE token_hash = $2 AND revoked = FALSE
        "#,
    )
    .bind(Utc::now())
    .bind(token_hash)
    .execute(executor)
    .await?;

    Ok(())
}

/// Revoke every active refresh token owned by a user (logout-all-devices).
pub async fn revoke_all_user_tokens(pool: &PgPool, user_id: Uuid) -> Result<(), AppError> {
    sqlx::query(
        r#"
        UPDATE refresh_tokens
        SET revoked = TRUE, revoked_at = $1
        WHERE user_id = $2 AND revoked = FALSE
        "#,
    )
    .bind(Utc::now())
    .bind(user_id)
    .execute(pool)
    .await?;

    tracing::info!(user_id = %user_id, "All refresh tokens revoked for user");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hashing_is_deterministic() {
        let hash1 = hash_token("some-raw-refresh-token");
        let hash2 = hash_token("some-raw-refresh-token");

        assert_eq!(hash1, hash2);
        // SHA-256 hex
        assert_eq!(hash1.len(), 64);
    }

    #[test]
    fn hash_differs_from_token() {
        assert_ne!(hash_token("some-raw-refresh-token"), "some-raw-refresh-token");
    }

    #[test]
    fn different_tokens_different_hashes() {
        assert_ne!(hash_token("token-a"), hash_token("token-b"));
    }

    #[test]
    fn expiry_is_derived_from_timestamp() {
        let mut record = RefreshTokenRecord {
            id: Uuid::new_v4(),
            user_id: Uuid::new_v4(),
            token_hash: hash_token("token"),
            user_agent: None,
            ip: None,
            expires_at: Utc::now() + chrono::Duration::days(7),
            revoked: false,
            created_at: Utc::now(),
        };
        assert!(!record.is_expired());

        record.expires_at = Utc::now() - chrono::Duration::seconds(1);
        assert!(record.is_expired());
    }
}
