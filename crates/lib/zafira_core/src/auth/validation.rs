//! Input validation for credentials and profile fields.
//!
//! Everything here runs before the credential store is touched.

use std::sync::LazyLock;

use regex::Regex;

use super::AuthError;

/// Minimum password length.
pub const MIN_PASSWORD_LEN: usize = 8;

/// bcrypt silently ignores input past 72 bytes.
pub const MAX_PASSWORD_BYTES: usize = 72;

/// Longest accepted first/last name.
const MAX_NAME_LEN: usize = 100;

static EMAIL_RE: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").ok());

/// Trim an email and check its shape. Case is preserved as typed.
pub fn validate_email(email: &str) -> Result<String, AuthError> {
    let email = email.trim();
    if email.is_empty() {
        return Err(AuthError::ValidationError("Email is required".into()));
    }
    if !EMAIL_RE.as_ref().is_some_and(|re| re.is_match(email)) {
        return Err(AuthError::ValidationError("Email is not valid".into()));
    }
    Ok(email.to_string())
}

/// Password policy: 8–72 bytes with at least one letter and one digit.
pub fn validate_password(password: &str) -> Result<(), AuthError> {
    if password.chars().count() < MIN_PASSWORD_LEN {
        return Err(AuthError::ValidationError(format!(
            "Password must be at least {MIN_PASSWORD_LEN} characters"
        )));
    }
    if password.len() > MAX_PASSWORD_BYTES {
        return Err(AuthError::ValidationError(format!(
            "Password must be at most {MAX_PASSWORD_BYTES} bytes"
        )));
    }
    let has_letter = password.chars().any(char::is_alphabetic);
    let has_digit = password.chars().any(|c| c.is_ascii_digit());
    if !has_letter || !has_digit {
        return Err(AuthError::ValidationError(
            "Password must contain at least one letter and one digit".into(),
        ));
    }
    Ok(())
}

/// Trim an optional name; blank becomes `None`.
pub fn normalize_name(field: &str, name: Option<&str>) -> Result<Option<String>, AuthError> {
    let Some(name) = name.map(str::trim).filter(|n| !n.is_empty()) else {
        return Ok(None);
    };
    if name.chars().count() > MAX_NAME_LEN {
        return Err(AuthError::ValidationError(format!(
            "{field} must be at most {MAX_NAME_LEN} characters"
        )));
    }
    Ok(Some(name.to_string()))
}
