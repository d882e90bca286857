/// Token Codec
///
/// Creates and validates signed, time-limited access and refresh tokens.
/// Decoding never errors past this boundary: any failure (bad signature,
/// malformed payload, expired) comes back as `None`.

use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use uuid::Uuid;

use crate::auth::claims::Claims;
use crate::configuration::JwtSettings;
use crate::error::AppError;

/// Issue a short-lived access token for a user.
pub fn issue_access_token(user_id: Uuid, config: &JwtSettings) -> Result<String, AppError> {
    sign(Claims::access(user_id, config.access_token_ttl()), config)
}

/// Issue a long-lived refresh token, tagged with the refresh type marker.
pub fn issue_refresh_token(user_id: Uuid, config: &JwtSettings) -> Result<String, AppError> {
    sign(Claims::refresh(user_id, config.refresh_token_ttl()), config)
}

fn sign(claims: Claims, config: &JwtSettings) -> Result<String, AppError> {
    let algorithm = config.signing_algorithm()?;
    encode(
        &Header::new(algorithm),
        &claims,
        &EncodingKey::from_secret(config.secret.as_bytes()),
    )
    .map_err(|e| AppError::Internal(format!("Token generation failed: {}", e)))
}

/// Verify signature and expiry; `None` on any failure.
pub fn decode_token(token: &str, config: &JwtSettings) -> Option<Claims> {
    let algorithm = match config.signing_algorithm() {
        Ok(algorithm) => algorithm,
        Err(e) => {
            tracing::error!(error = %e, "Token codec misconfigured");
            return None;
        }
    };

    let validation = Validation::new(algorithm);
    match decode::<Claims>(
        token,
        &DecodingKey::from_secret(config.secret.as_bytes()),
        &validation,
    ) {
        Ok(data) => Some(data.claims),
        Err(e) => {
            tracing::warn!("JWT validation error: {}", e);
            None
        }
    }
}
