//! Authentication logic.
//!
//! Provides password hashing, session token management, verification
//! tokens, input validation and the credential store abstraction shared by
//! the HTTP layer.

pub mod jwt;
pub mod memory;
pub mod password;
pub mod queries;
pub mod store;
pub mod validation;
pub mod verification;

use thiserror::Error;

pub use memory::MemoryAccountStore;
pub use queries::PgAccountStore;
pub use store::AccountStore;

/// Authentication errors.
#[derive(Debug, Error)]
pub enum AuthError {
    #[error("Invalid credentials")]
    CredentialError,

    #[error("Email not verified")]
    Unverified,

    #[error("Token error: {0}")]
    TokenError(String),

    #[error("Invalid token: {0}")]
    InvalidToken(String),

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Database error: {0}")]
    DbError(#[from] sqlx::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}
