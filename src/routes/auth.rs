/// Authentication Routes
///
/// Registration, login, refresh-token rotation, and logout. These handlers
/// orchestrate the credential hasher, token codec, and refresh token store;
/// password hashing always happens before a database transaction is opened.

use actix_web::{web, HttpRequest, HttpResponse};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use uuid::Uuid;

use crate::auth::{
    consume_refresh_token, decode_token, find_by_hash, hash_password, hash_token,
    issue_access_token, issue_refresh_token, revoke_all_user_tokens, revoke_by_hash,
    save_refresh_token, verify_decoy, verify_password, TokenMetadata,
};
use crate::configuration::JwtSettings;
use crate::error::{AppError, AuthError, ValidationError};
use crate::middleware::{extract_identity, Identity};
use crate::validators::{is_valid_email, is_valid_username};

#[derive(Deserialize)]
pub struct RegisterRequest {
    pub email: String,
    pub username: Option<String>,
    pub password: String,
}

#[derive(Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(Deserialize)]
pub struct RefreshRequest {
    pub refresh_token: String,
}

/// Either a single token to revoke or a request to revoke every active
/// token of the authenticated user.
#[derive(Deserialize)]
pub struct LogoutRequest {
    pub refresh_token: Option<String>,
    #[serde(default)]
    pub revoke_all: bool,
}

/// Public identity returned on registration. Never includes the hash.
#[derive(Serialize)]
pub struct RegisterResponse {
    pub id: String,
    pub email: String,
}

#[derive(Serialize)]
pub struct AuthResponse {
    pub access_token: String,
    pub refresh_token: String,
    pub token_type: String,
    pub expires_in: i64,
}

#[derive(Serialize)]
pub struct UserResponse {
    pub id: String,
    pub email: String,
    pub username: Option<String>,
    pub created_at: String,
}

fn token_pair(user_id: Uuid, config: &JwtSettings) -> Result<(String, String), AppError> {
    let access_token = issue_access_token(user_id, config)?;
    let refresh_token = issue_refresh_token(user_id, config)?;
    Ok((access_token, refresh_token))
}

fn auth_response(access_token: String, refresh_token: String, config: &JwtSettings) -> AuthResponse {
    AuthResponse {
        access_token,
        refresh_token,
        token_type: "bearer".to_string(),
        expires_in: config.access_token_ttl().num_seconds(),
    }
}

/// Issuance context recorded with each refresh token for audit.
fn request_metadata(req: &HttpRequest) -> TokenMetadata {
    TokenMetadata {
        user_agent: req
            .headers()
            .get("User-Agent")
            .and_then(|h| h.to_str().ok())
            .map(String::from),
        ip: req
            .connection_info()
            .realip_remote_addr()
            .map(String::from),
    }
}

fn bearer_header(req: &HttpRequest) -> Option<&str> {
    req.headers()
        .get("Authorization")
        .and_then(|h| h.to_str().ok())
}

/// POST /auth/register
///
/// Creates a user and returns its public identity.
///
/// # Errors
/// - 400: invalid email/username/password
/// - 409: email already registered
pub async fn register(
    form: web::Json<RegisterRequest>,
    pool: web::Data<PgPool>,
) -> Result<HttpResponse, AppError> {
    let email = is_valid_email(&form.email)?;
    let username = match form.username.as_deref() {
        Some(name) => Some(is_valid_username(name)?),
        None => None,
    };
    let password_hash = hash_password(&form.password)?;

    let user_id = Uuid::new_v4();
    // The unique index on email is the conflict authority; a violation maps
    // to 409 via From<sqlx::Error>.
    sqlx::query(
        r#"
        INSERT INTO users (id, email, username, password_hash, is_active, is_admin, created_at)
        VALUES ($1, $2, $3, $4, TRUE, FALSE, $5)
        "#,
    )
    .bind(user_id)
    .bind(&email)
    .bind(&username)
    .bind(&password_hash)
    .bind(Utc::now())
    .execute(pool.get_ref())
    .await?;

    tracing::info!(user_id = %user_id, "User registered");

    Ok(HttpResponse::Created().json(RegisterResponse {
        id: user_id.to_string(),
        email,
    }))
}

/// POST /auth/login
///
/// Verifies credentials and issues an access/refresh token pair. The
/// refresh token's hash is persisted with request metadata; if the stored
/// password hash uses a deprecated scheme it is upgraded in the same
/// transaction.
///
/// # Errors
/// - 401: unknown email or wrong password (identical response either way;
///   a decoy verification keeps the timing identical too)
/// - 403: account inactive
pub async fn login(
    form: web::Json<LoginRequest>,
    pool: web::Data<PgPool>,
    jwt_config: web::Data<JwtSettings>,
    req: HttpRequest,
) -> Result<HttpResponse, AppError> {
    let email = is_valid_email(&form.email)?;

    let user = sqlx::query_as::<_, (Uuid, String, bool)>(
        "SELECT id, password_hash, is_active FROM users WHERE email = $1",
    )
    .bind(&email)
    .fetch_optional(pool.get_ref())
    .await?;

    let (user_id, password_hash, is_active) = match user {
        Some(user) => user,
        None => {
            verify_decoy(&form.password);
            return Err(AuthError::InvalidCredentials.into());
        }
    };

    let check = verify_password(&form.password, &password_hash);
    if !check.valid {
        return Err(AuthError::InvalidCredentials.into());
    }
    if !is_active {
        return Err(AuthError::AccountInactive.into());
    }

    // All hashing and signing happens before the transaction opens.
    let upgraded_hash = if check.rehash_needed {
        Some(hash_password(&form.password)?)
    } else {
        None
    };
    let (access_token, refresh_token) = token_pair(user_id, jwt_config.get_ref())?;
    let metadata = request_metadata(&req);

    let mut tx = pool.begin().await?;
    if let Some(new_hash) = upgraded_hash {
        sqlx::query("UPDATE users SET password_hash = $1, updated_at = $2 WHERE id = $3")
            .bind(&new_hash)
            .bind(Utc::now())
            .bind(user_id)
            .execute(&mut tx)
            .await?;
        tracing::info!(user_id = %user_id, "Password hash upgraded to preferred scheme");
    }
    save_refresh_token(
        &mut tx,
        user_id,
        &refresh_token,
        jwt_config.refresh_token_ttl(),
        &metadata,
    )
    .await?;
    tx.commit().await?;

    tracing::info!(user_id = %user_id, "User logged in");

    Ok(HttpResponse::Ok().json(auth_response(
        access_token,
        refresh_token,
        jwt_config.get_ref(),
    )))
}

/// POST /auth/refresh
///
/// Exchanges a refresh token for a new access/refresh pair, revoking the
/// presented token in the same transaction (rotation). A stolen refresh
/// token is therefore usable at most once; whichever of two concurrent
/// calls loses the row lock sees the revoked record and is rejected.
///
/// # Errors
/// - 401 TOKEN_INVALID: bad signature, wrong type, unmatched or revoked record
/// - 401 TOKEN_EXPIRED: record past its expiry
pub async fn refresh(
    form: web::Json<RefreshRequest>,
    pool: web::Data<PgPool>,
    jwt_config: web::Data<JwtSettings>,
    req: HttpRequest,
) -> Result<HttpResponse, AppError> {
    let claims =
        decode_token(&form.refresh_token, jwt_config.get_ref()).ok_or(AuthError::TokenInvalid)?;
    if !claims.is_refresh() {
        return Err(AuthError::TokenInvalid.into());
    }
    let subject = claims.user_id()?;

    let token_hash = hash_token(&form.refresh_token);
    let metadata = request_metadata(&req);

    let mut tx = pool.begin().await?;
    let user_id = consume_refresh_token(&mut tx, &token_hash).await?;
    if user_id != subject {
        // The store record is authoritative; a subject mismatch means the
        // token does not belong to the lineage it claims.
        tracing::warn!(user_id = %user_id, "Refresh token subject mismatch");
        return Err(AuthError::TokenInvalid.into());
    }

    let (access_token, new_refresh_token) = token_pair(user_id, jwt_config.get_ref())?;
    save_refresh_token(
        &mut tx,
        user_id,
        &new_refresh_token,
        jwt_config.refresh_token_ttl(),
        &metadata,
    )
    .await?;
    tx.commit().await?;

    tracing::info!(user_id = %user_id, "Refresh token rotated");

    Ok(HttpResponse::Ok().json(auth_response(
        access_token,
        new_refresh_token,
        jwt_config.get_ref(),
    )))
}

/// POST /auth/logout
///
/// Revokes the presented refresh token, or with `revoke_all: true` revokes
/// every active token of the bearer-authenticated user. Idempotent:
/// revoking an absent or already-revoked token still succeeds.
///
/// # Errors
/// - 400: neither a refresh token nor a revoke-all target was provided
/// - 401: undecodable token, or revoke_all without a valid access token
pub async fn logout(
    form: web::Json<LogoutRequest>,
    pool: web::Data<PgPool>,
    jwt_config: web::Data<JwtSettings>,
    req: HttpRequest,
) -> Result<HttpResponse, AppError> {
    if form.revoke_all {
        let identity = extract_identity(bearer_header(&req), jwt_config.get_ref())?;
        revoke_all_user_tokens(pool.get_ref(), identity.0).await?;
    } else if let Some(raw_token) = form.refresh_token.as_deref() {
        let claims =
            decode_token(raw_token, jwt_config.get_ref()).ok_or(AuthError::TokenInvalid)?;
        if !claims.is_refresh() {
            return Err(AuthError::TokenInvalid.into());
        }
        claims.user_id()?;

        let token_hash = hash_token(raw_token);
        if let Some(record) = find_by_hash(pool.get_ref(), &token_hash).await? {
            revoke_by_hash(pool.get_ref(), &record.token_hash).await?;
            tracing::info!(user_id = %record.user_id, "Refresh token revoked at logout");
        }
    } else {
        return Err(ValidationError::MissingField(
            "refresh_token or revoke_all".to_string(),
        )
        .into());
    }

    Ok(HttpResponse::Ok().json(serde_json::json!({ "ok": true })))
}

/// GET /auth/me
///
/// Returns the authenticated user's public profile. The `Identity` is
/// injected by `JwtMiddleware`.
pub async fn get_current_user(
    identity: web::ReqData<Identity>,
    pool: web::Data<PgPool>,
) -> Result<HttpResponse, AppError> {
    let user = sqlx::query_as::<_, (Uuid, String, Option<String>, chrono::DateTime<Utc>)>(
        "SELECT id, email, username, created_at FROM users WHERE id = $1 AND is_active = TRUE",
    )
    .bind(identity.0)
    .fetch_one(pool.get_ref())
    .await?;

    Ok(HttpResponse::Ok().json(UserResponse {
        id: user.0.to_string(),
        email: user.1,
        username: user.2,
        created_at: user.3.to_rfc3339(),
    }))
}
