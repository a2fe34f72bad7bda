//! Session token issuance and verification (HS256 JWT).
//!
//! Tokens are stateless: validity is decided by signature and `exp` alone,
//! nothing is persisted server-side, and they cannot be revoked before they
//! expire.

use chrono::{Duration, Utc};
use jsonwebtoken::{DecodingKey, EncodingKey, Header, Validation, decode, encode};

use super::AuthError;
use crate::models::auth::{SessionClaims, TokenClaims};

/// Session token lifetime: 7 days, non-renewing.
pub const SESSION_TOKEN_EXPIRY_SECS: i64 = 7 * 24 * 60 * 60;

/// Generate a signed session token for the given claims.
pub fn generate_session_token(claims: &SessionClaims, secret: &[u8]) -> Result<String, AuthError> {
    let now = Utc::now();
    let payload = TokenClaims {
        session: claims.clone(),
        exp: (now + Duration::seconds(SESSION_TOKEN_EXPIRY_SECS)).timestamp(),
        iat: now.timestamp(),
    };
    encode(
        &Header::default(),
        &payload,
        &EncodingKey::from_secret(secret),
    )
    .map_err(|e| AuthError::TokenError(format!("jwt encode: {e}")))
}

/// Verify a session token, returning the claims on success.
pub fn verify_session_token(token: &str, secret: &[u8]) -> Option<TokenClaims> {
    let key = DecodingKey::from_secret(secret);
    let mut validation = Validation::default();
    validation.validate_exp = true;
    decode::<TokenClaims>(token, &key, &validation)
        .ok()
        .map(|data| data.claims)
}
