/// Identity Extraction
///
/// Turns a raw `Authorization` header value into a verified user identity.
/// Pure function, no side effects: safe to call speculatively, e.g. to
/// distinguish anonymous from authenticated list views.

use uuid::Uuid;

use crate::auth::decode_token;
use crate::configuration::JwtSettings;
use crate::error::AuthError;

const BEARER_PREFIX: &str = "Bearer ";

/// Verified identity of the requesting user, injected into request
/// extensions by `JwtMiddleware`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Identity(pub Uuid);

/// Extract a verified user id from an `Authorization` header value.
///
/// Requires the `Bearer` scheme, a valid signature, an unexpired token, and
/// a UUID subject. Refresh tokens are rejected here: their type marker bars
/// them from being replayed as access credentials.
pub fn extract_identity(
    header: Option<&str>,
    config: &JwtSettings,
) -> Result<Identity, AuthError> {
    let header = header.ok_or(AuthError::MissingToken)?;
    let token = header
        .strip_prefix(BEARER_PREFIX)
        .filter(|t| !t.is_empty())
        .ok_or(AuthError::MissingToken)?;

    let claims = decode_token(token, config).ok_or(AuthError::TokenInvalid)?;

    if claims.is_refresh() {
        tracing::warn!("Refresh token presented as access credential");
        return Err(AuthError::TokenInvalid);
    }

    claims.user_id().map(Identity)
}

/// Speculative variant for handlers that serve both anonymous and
/// authenticated views. Never fails; any problem reads as anonymous.
pub fn maybe_identity(header: Option<&str>, config: &JwtSettings) -> Option<Identity> {
    extract_identity(header, config).ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::{issue_access_token, issue_refresh_token};

    fn test_config() -> JwtSettings {
        JwtSettings {
            secret: "test-secret-key-at-least-32-characters-long".to_string(),
            algorithm: "HS256".to_string(),
            access_token_expire_minutes: 15,
            refresh_token_expire_days: 7,
        }
    }

    #[test]
    fn valid_access_token_yields_identity() {
        let config = test_config();
        let user_id = Uuid::new_v4();
        let token = issue_access_token(user_id, &config).unwrap();
        let header = format!("Bearer {}", token);

        assert_eq!(
            extract_identity(Some(&header), &config).unwrap(),
            Identity(user_id)
        );
    }

    #[test]
    fn missing_header_is_unauthorized_not_a_panic() {
        let config = test_config();
        assert_eq!(
            extract_identity(None, &config).unwrap_err(),
            AuthError::MissingToken
        );
    }

    #[test]
    fn wrong_scheme_is_rejected() {
        let config = test_config();
        for header in ["Basic dXNlcjpwYXNz", "Bearer", "Bearer ", "BearerToken", ""] {
            assert!(
                extract_identity(Some(header), &config).is_err(),
                "should reject header: {:?}",
                header
            );
        }
    }

    #[test]
    fn refresh_token_is_rejected_as_access_credential() {
        let config = test_config();
        let token = issue_refresh_token(Uuid::new_v4(), &config).unwrap();
        let header = format!("Bearer {}", token);

        assert_eq!(
            extract_identity(Some(&header), &config).unwrap_err(),
            AuthError::TokenInvalid
        );
    }

    #[test]
    fn garbage_token_is_rejected() {
        let config = test_config();
        assert_eq!(
            extract_identity(Some("Bearer not.a.jwt"), &config).unwrap_err(),
            AuthError::TokenInvalid
        );
    }

    #[test]
    fn maybe_identity_reads_failures_as_anonymous() {
        let config = test_config();
        assert!(maybe_identity(None, &config).is_none());
        assert!(maybe_identity(Some("Bearer junk"), &config).is_none());

        let token = issue_access_token(Uuid::new_v4(), &config).unwrap();
        let header = format!("Bearer {}", token);
        assert!(maybe_identity(Some(&header), &config).is_some());
    }
}
