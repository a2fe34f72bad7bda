//! Credential store abstraction.
//!
//! The store owns email and provider-subject uniqueness: `create`, `update`
//! and `link_federated` must fail with [`AuthError::Conflict`] when another
//! account already holds the email or subject, including when two requests
//! race on it.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use super::AuthError;
use crate::models::auth::{
    Account, AccountUpdate, AccountWithPassword, NewAccount, VerificationTokenRecord,
};

#[async_trait]
pub trait AccountStore: Send + Sync {
    /// Exact (case-sensitive) email lookup, including the password hash.
    async fn find_by_email(&self, email: &str) -> Result<Option<AccountWithPassword>, AuthError>;

    async fn find_by_id(&self, id: &str) -> Result<Option<Account>, AuthError>;

    /// Account linked to a Google subject.
    async fn find_by_google_id(&self, provider_id: &str) -> Result<Option<Account>, AuthError>;

    /// All accounts, oldest first.
    async fn list(&self) -> Result<Vec<Account>, AuthError>;

    /// Insert an account. The first account of an empty store is an admin,
    /// every later one a member.
    async fn create(&self, account: NewAccount) -> Result<Account, AuthError>;

    /// Apply a partial update. `Ok(None)` when the id is unknown.
    ///
    /// A different email is stored as pending and the current one keeps
    /// working until [`mark_verified`](Self::mark_verified) promotes it.
    async fn update(&self, id: &str, update: AccountUpdate) -> Result<Option<Account>, AuthError>;

    /// Delete an account and its outstanding verification token.
    async fn delete(&self, id: &str) -> Result<bool, AuthError>;

    /// Flip the verification flag on, promoting a pending email if there is
    /// one. `Conflict` when that address was taken in the meantime.
    async fn mark_verified(&self, id: &str) -> Result<Option<Account>, AuthError>;

    /// Record the provider subject (when none is linked yet) and mark the
    /// account verified.
    ///
    /// With `reset_credentials` the password hash and any pending email are
    /// dropped and the subject replaces any previous one, in the same write.
    async fn link_federated(
        &self,
        id: &str,
        provider_id: &str,
        reset_credentials: bool,
    ) -> Result<Option<Account>, AuthError>;

    /// Store a verification token hash, replacing any previous token of the
    /// account.
    async fn replace_verification_token(
        &self,
        user_id: &str,
        token_hash: &str,
        expires_at: DateTime<Utc>,
    ) -> Result<(), AuthError>;

    async fn find_verification_token(
        &self,
        token_hash: &str,
    ) -> Result<Option<VerificationTokenRecord>, AuthError>;

    /// Mark a token consumed if it is still unconsumed and unexpired.
    /// Returns `false` when another redemption got there first.
    async fn consume_verification_token(&self, token_id: &str) -> Result<bool, AuthError>;

    /// Cheap reachability check for the health route.
    async fn ping(&self) -> Result<(), AuthError>;
}
