/// Password Hashing and Verification
///
/// Argon2id is the preferred scheme. Legacy bcrypt hashes (from accounts
/// created before the migration) still verify, and `PasswordCheck` reports
/// when a stored hash should be upgraded so the login path can re-hash
/// opportunistically. Verification itself never touches the database.

use argon2::{
    password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2, Params,
};
use bcrypt::verify as bcrypt_verify;
use lazy_static::lazy_static;
use rand::rngs::OsRng;

use crate::error::{AppError, ValidationError};

const MIN_PASSWORD_LENGTH: usize = 8;
const MAX_PASSWORD_LENGTH: usize = 128;

/// Modular-crypt prefix shared by all bcrypt variants ($2a$, $2b$, $2y$).
const BCRYPT_PREFIX: &str = "$2";

const ARGON2ID_IDENT: &str = "argon2id";

lazy_static! {
    // Verified against when login hits an unknown email, so that path costs
    // the same as a real mismatch and cannot be told apart by timing.
    static ref DECOY_HASH: String =
        hash_password("Decoy4Timing!").expect("failed to hash decoy password");
}

/// Outcome of a password verification.
///
/// `rehash_needed` is only meaningful when `valid` is true; the caller (not
/// this module) decides whether to persist an upgraded hash.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PasswordCheck {
    pub valid: bool,
    pub rehash_needed: bool,
}

/// Hash a password with the preferred scheme (Argon2id, salted PHC string).
///
/// # Errors
/// Returns error if the password fails length validation or hashing fails.
pub fn hash_password(password: &str) -> Result<String, AppError> {
    validate_password_length(password)?;

    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|e| AppError::Internal(format!("Password hashing failed: {}", e)))
}

/// Verify a password against a stored hash of either supported scheme.
///
/// Fails closed: a malformed or unrecognized stored hash yields
/// `valid: false` rather than an error.
pub fn verify_password(password: &str, stored_hash: &str) -> PasswordCheck {
    let valid = if stored_hash.starts_with(BCRYPT_PREFIX) {
        bcrypt_verify(password, stored_hash).unwrap_or(false)
    } else {
        match PasswordHash::new(stored_hash) {
            Ok(parsed) => Argon2::default()
                .verify_password(password.as_bytes(), &parsed)
                .is_ok(),
            Err(_) => false,
        }
    };

    PasswordCheck {
        valid,
        rehash_needed: valid && needs_rehash(stored_hash),
    }
}

/// True when the stored hash uses a deprecated scheme (bcrypt), carries
/// weaker-than-current Argon2 cost parameters, or cannot be recognized as a
/// current Argon2id hash.
pub fn needs_rehash(stored_hash: &str) -> bool {
    if stored_hash.starts_with(BCRYPT_PREFIX) {
        return true;
    }
    let parsed = match PasswordHash::new(stored_hash) {
        Ok(parsed) => parsed,
        Err(_) => return true,
    };
    if parsed.algorithm.as_str() != ARGON2ID_IDENT {
        return true;
    }
    match Params::try_from(&parsed) {
        Ok(params) => {
            params.m_cost() < Params::DEFAULT.m_cost()
                || params.t_cost() < Params::DEFAULT.t_cost()
                || params.p_cost() < Params::DEFAULT.p_cost()
        }
        Err(_) => true,
    }
}

/// Burn one verification's worth of work without a real account.
/// Keeps unknown-email and wrong-password logins indistinguishable.
pub fn verify_decoy(password: &str) {
    let _ = verify_password(password, &DECOY_HASH);
}

fn validate_password_length(password: &str) -> Result<(), AppError> {
    if password.len() < MIN_PASSWORD_LENGTH {
        return Err(AppError::Validation(ValidationError::TooShort(
            "password".to_string(),
            MIN_PASSWORD_LENGTH,
        )));
    }
    if password.len() > MAX_PASSWORD_LENGTH {
        return Err(AppError::Validation(ValidationError::TooLong(
            "password".to_string(),
            MAX_PASSWORD_LENGTH,
        )));
    }
    Ok(())
}
