//! In-memory credential store.
//!
//! Backs the integration tests and local runs without PostgreSQL. All
//! mutations take the write lock, so the email uniqueness check and the
//! insert are atomic.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;

use super::AuthError;
use super::store::AccountStore;
use crate::models::auth::{
    Account, AccountUpdate, AccountWithPassword, NewAccount, Role, VerificationTokenRecord,
};
use crate::uuid::uuidv7;

#[derive(Debug, Clone)]
struct StoredToken {
    record: VerificationTokenRecord,
    token_hash: String,
}

#[derive(Debug, Default)]
struct Inner {
    accounts: HashMap<String, AccountWithPassword>,
    /// Keyed by user id: one outstanding token per account.
    tokens: HashMap<String, StoredToken>,
}

impl Inner {
    fn email_taken(&self, email: &str, except_id: Option<&str>) -> bool {
        self.accounts
            .values()
            .any(|a| a.account.email == email && Some(a.account.id.as_str()) != except_id)
    }

    fn subject_taken(&self, provider_id: &str, except_id: Option<&str>) -> bool {
        self.accounts.values().any(|a| {
            a.account.google_id.as_deref() == Some(provider_id)
                && Some(a.account.id.as_str()) != except_id
        })
    }
}

fn subject_conflict() -> AuthError {
    AuthError::Conflict("Google account already linked to another user".into())
}

/// Credential store kept in process memory.
#[derive(Debug, Default)]
pub struct MemoryAccountStore {
    inner: RwLock<Inner>,
}

impl MemoryAccountStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl AccountStore for MemoryAccountStore {
    async fn find_by_email(&self, email: &str) -> Result<Option<AccountWithPassword>, AuthError> {
        let inner = self.inner.read().await;
        Ok(inner
            .accounts
            .values()
            .find(|a| a.account.email == email)
            .cloned())
    }

    async fn find_by_id(&self, id: &str) -> Result<Option<Account>, AuthError> {
        let inner = self.inner.read().await;
        Ok(inner.accounts.get(id).map(|a| a.account.clone()))
    }

    async fn find_by_google_id(&self, provider_id: &str) -> Result<Option<Account>, AuthError> {
        let inner = self.inner.read().await;
        Ok(inner
            .accounts
            .values()
            .find(|a| a.account.google_id.as_deref() == Some(provider_id))
            .map(|a| a.account.clone()))
    }

    async fn list(&self) -> Result<Vec<Account>, AuthError> {
        let inner = self.inner.read().await;
        let mut accounts: Vec<Account> =
            inner.accounts.values().map(|a| a.account.clone()).collect();
        accounts.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
        Ok(accounts)
    }

    async fn create(&self, new: NewAccount) -> Result<Account, AuthError> {
        let mut inner = self.inner.write().await;
        if inner.email_taken(&new.email, None) {
            return Err(AuthError::Conflict("Email already registered".into()));
        }
        if let Some(provider_id) = new.google_id.as_deref()
            && inner.subject_taken(provider_id, None)
        {
            return Err(subject_conflict());
        }
        let role = if inner.accounts.is_empty() {
            Role::Admin
        } else {
            Role::Member
        };
        let now = Utc::now();
        let account = Account {
            id: uuidv7().to_string(),
            email: new.email,
            first_name: new.first_name,
            last_name: new.last_name,
            role,
            verified: new.verified,
            google_id: new.google_id,
            pending_email: None,
            created_at: now,
            updated_at: now,
        };
        inner.accounts.insert(
            account.id.clone(),
            AccountWithPassword {
                account: account.clone(),
                password_hash: new.password_hash,
            },
        );
        Ok(account)
    }

    async fn update(&self, id: &str, update: AccountUpdate) -> Result<Option<Account>, AuthError> {
        let mut inner = self.inner.write().await;
        if let Some(email) = update.pending_email.as_deref()
            && inner.email_taken(email, Some(id))
        {
            return Err(AuthError::Conflict("Email already registered".into()));
        }
        let Some(stored) = inner.accounts.get_mut(id) else {
            return Ok(None);
        };
        if let Some(email) = update.pending_email {
            stored.account.pending_email = (email != stored.account.email).then_some(email);
        }
        if let Some(first_name) = update.first_name {
            stored.account.first_name = Some(first_name);
        }
        if let Some(last_name) = update.last_name {
            stored.account.last_name = Some(last_name);
        }
        if let Some(hash) = update.password_hash {
            stored.password_hash = Some(hash);
        }
        stored.account.updated_at = Utc::now();
        Ok(Some(stored.account.clone()))
    }

    async fn delete(&self, id: &str) -> Result<bool, AuthError> {
        let mut inner = self.inner.write().await;
        inner.tokens.remove(id);
        Ok(inner.accounts.remove(id).is_some())
    }

    async fn mark_verified(&self, id: &str) -> Result<Option<Account>, AuthError> {
        let mut inner = self.inner.write().await;
        let pending = match inner.accounts.get(id) {
            Some(stored) => stored.account.pending_email.clone(),
            None => return Ok(None),
        };
        if let Some(email) = pending.as_deref()
            && inner.email_taken(email, Some(id))
        {
            return Err(AuthError::Conflict("Email already registered".into()));
        }
        Ok(inner.accounts.get_mut(id).map(|stored| {
            if let Some(email) = stored.account.pending_email.take() {
                stored.account.email = email;
            }
            stored.account.verified = true;
            stored.account.updated_at = Utc::now();
            stored.account.clone()
        }))
    }

    async fn link_federated(
        &self,
        id: &str,
        provider_id: &str,
        reset_credentials: bool,
    ) -> Result<Option<Account>, AuthError> {
        let mut inner = self.inner.write().await;
        if inner.subject_taken(provider_id, Some(id)) {
            return Err(subject_conflict());
        }
        Ok(inner.accounts.get_mut(id).map(|stored| {
            if reset_credentials {
                stored.password_hash = None;
                stored.account.pending_email = None;
                stored.account.google_id = Some(provider_id.to_string());
            } else if stored.account.google_id.is_none() {
                stored.account.google_id = Some(provider_id.to_string());
            }
            stored.account.verified = true;
            stored.account.updated_at = Utc::now();
            stored.account.clone()
        }))
    }

    async fn replace_verification_token(
        &self,
        user_id: &str,
        token_hash: &str,
        expires_at: DateTime<Utc>,
    ) -> Result<(), AuthError> {
        let mut inner = self.inner.write().await;
        if !inner.accounts.contains_key(user_id) {
            return Err(AuthError::NotFound("Account not found".into()));
        }
        inner.tokens.insert(
            user_id.to_string(),
            StoredToken {
                record: VerificationTokenRecord {
                    id: uuidv7().to_string(),
                    user_id: user_id.to_string(),
                    expires_at,
                    consumed_at: None,
                },
                token_hash: token_hash.to_string(),
            },
        );
        Ok(())
    }

    async fn find_verification_token(
        &self,
        token_hash: &str,
    ) -> Result<Option<VerificationTokenRecord>, AuthError> {
        let inner = self.inner.read().await;
        Ok(inner
            .tokens
            .values()
            .find(|t| t.token_hash == token_hash)
            .map(|t| t.record.clone()))
    }

    async fn consume_verification_token(&self, token_id: &str) -> Result<bool, AuthError> {
        let mut inner = self.inner.write().await;
        let now = Utc::now();
        let Some(token) = inner.tokens.values_mut().find(|t| t.record.id == token_id) else {
            return Ok(false);
        };
        if token.record.consumed_at.is_some() || token.record.expires_at <= now {
            return Ok(false);
        }
        token.record.consumed_at = Some(now);
        Ok(true)
    }

    async fn ping(&self) -> Result<(), AuthError> {
        Ok(())
    }
}
