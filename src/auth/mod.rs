/// Authentication module
///
/// Credential hashing (with legacy-scheme migration), the JWT token codec,
/// and the refresh token store.

mod claims;
mod jwt;
mod password;
mod refresh_token;

pub use claims::{Claims, REFRESH_TOKEN_TYPE};
pub use jwt::{decode_token, issue_access_token, issue_refresh_token};
pub use password::{hash_password, needs_rehash, verify_decoy, verify_password, PasswordCheck};
pub use refresh_token::{
    consume_refresh_token, find_by_hash, hash_token, revoke_all_user_tokens, revoke_by_hash,
    save_refresh_token, RefreshTokenRecord, TokenMetadata,
};
