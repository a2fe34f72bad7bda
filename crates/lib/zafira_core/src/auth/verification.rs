//! E-mail verification tokens.
//!
//! The raw token only ever travels in the verification link; the store keeps
//! its SHA-256 hash.

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use chrono::{DateTime, Duration, Utc};
use rand::RngCore;
use sha2::{Digest, Sha256};

/// Verification token lifetime: 24 hours.
pub const VERIFICATION_TOKEN_TTL_HOURS: i64 = 24;

/// Random bytes per token.
const TOKEN_BYTES: usize = 32;

/// Generate a fresh verification token (32 random bytes, base64url).
pub fn generate_verification_token() -> String {
    let mut bytes = [0u8; TOKEN_BYTES];
    rand::rng().fill_bytes(&mut bytes);
    URL_SAFE_NO_PAD.encode(bytes)
}

/// SHA-256 hash a token for storage and lookup.
pub fn hash_verification_token(token: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(token.as_bytes());
    format!("{:x}", hasher.finalize())
}

/// Whether `token` has the shape produced by [`generate_verification_token`].
pub fn is_well_formed(token: &str) -> bool {
    URL_SAFE_NO_PAD
        .decode(token.as_bytes())
        .is_ok_and(|bytes| bytes.len() == TOKEN_BYTES)
}

/// Expiry for a token issued at `now`.
pub fn expires_at(now: DateTime<Utc>) -> DateTime<Utc> {
    now + Duration::hours(VERIFICATION_TOKEN_TTL_HOURS)
}

/// Build the frontend verification link included in outbound emails.
pub fn build_verify_url(frontend_base_url: &str, token: &str) -> String {
    let base = frontend_base_url.trim_end_matches('/');
    format!("{base}/verify-email?token={token}")
}
