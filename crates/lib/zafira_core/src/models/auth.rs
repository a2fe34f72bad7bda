//! Authentication domain models.
//!
//! These are internal domain models, distinct from the API request/response
//! types (which carry `#[serde(rename)]` for camelCase etc.).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Access level of an account, stored as lowercase text.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    #[default]
    Member,
    Admin,
}

impl Role {
    /// Database text representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Member => "member",
            Role::Admin => "admin",
        }
    }

    /// Parse the database text representation.
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "member" => Some(Role::Member),
            "admin" => Some(Role::Admin),
            _ => None,
        }
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Domain account.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Account {
    pub id: String,
    pub email: String,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub role: Role,
    pub verified: bool,
    /// Subject assigned by Google when the account was linked.
    pub google_id: Option<String>,
    /// Requested new address; replaces `email` once its link is redeemed.
    pub pending_email: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Account {
    /// Address the next verification link goes to.
    pub fn address_to_verify(&self) -> &str {
        self.pending_email.as_deref().unwrap_or(&self.email)
    }
}

/// Account with password hash (for internal auth flows).
///
/// `password_hash` is `None` for accounts created through federation only.
#[derive(Debug, Clone)]
pub struct AccountWithPassword {
    pub account: Account,
    pub password_hash: Option<String>,
}

/// Fields required to create an account.
#[derive(Debug, Clone)]
pub struct NewAccount {
    pub email: String,
    pub password_hash: Option<String>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub verified: bool,
    pub google_id: Option<String>,
}

/// Partial profile update; `None` leaves the column untouched.
///
/// A requested email is only recorded as pending; asking for the current
/// address withdraws any pending change.
#[derive(Debug, Clone, Default)]
pub struct AccountUpdate {
    pub pending_email: Option<String>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub password_hash: Option<String>,
}

impl AccountUpdate {
    pub fn is_empty(&self) -> bool {
        self.pending_email.is_none()
            && self.first_name.is_none()
            && self.last_name.is_none()
            && self.password_hash.is_none()
    }
}

/// Verification token row. The raw token is never stored, only its hash.
#[derive(Debug, Clone)]
pub struct VerificationTokenRecord {
    pub id: String,
    pub user_id: String,
    pub expires_at: DateTime<Utc>,
    pub consumed_at: Option<DateTime<Utc>>,
}

/// Identity claims carried by a session token.
///
/// Local and federated logins both build this through
/// [`SessionClaims::for_account`], so consumers never need to know which
/// path issued a token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionClaims {
    pub id: String,
    pub email: String,
    pub role: Role,
    #[serde(rename = "firstName")]
    pub first_name: String,
}

impl SessionClaims {
    pub fn for_account(account: &Account) -> Self {
        Self {
            id: account.id.clone(),
            email: account.email.clone(),
            role: account.role,
            first_name: account.first_name.clone().unwrap_or_default(),
        }
    }

    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin
    }
}

/// Full JWT payload: the identity claims plus the standard envelope.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenClaims {
    #[serde(flatten)]
    pub session: SessionClaims,
    /// Expiry (unix timestamp).
    pub exp: i64,
    /// Issued at (unix timestamp).
    pub iat: i64,
}

/// Identity asserted by an external provider after a successful OAuth flow.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FederatedIdentity {
    /// Provider-assigned subject.
    pub provider_id: String,
    pub email: String,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    /// Whether the provider vouches for ownership of `email`.
    pub email_verified: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn account() -> Account {
        Account {
            id: "0190a4a8-0000-7000-8000-000000000001".into(),
            email: "a@x.com".into(),
            first_name: None,
            last_name: Some("B".into()),
            role: Role::Admin,
            verified: true,
            google_id: None,
            pending_email: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn verification_targets_pending_address_first() {
        let mut a = account();
        assert_eq!(a.address_to_verify(), "a@x.com");
        a.pending_email = Some("new@x.com".into());
        assert_eq!(a.address_to_verify(), "new@x.com");
    }

    #[test]
    fn role_round_trips_through_text() {
        for role in [Role::Member, Role::Admin] {
            assert_eq!(Role::parse(role.as_str()), Some(role));
        }
        assert_eq!(Role::parse("ADMIN"), None);
    }

    #[test]
    fn session_claims_serialize_with_camel_case_first_name() {
        let claims = SessionClaims::for_account(&account());
        let json = serde_json::to_value(&claims).unwrap();
        assert_eq!(json["firstName"], "");
        assert_eq!(json["role"], "admin");
        assert!(claims.is_admin());
    }

    #[test]
    fn account_update_emptiness() {
        assert!(AccountUpdate::default().is_empty());
        let update = AccountUpdate {
            last_name: Some("C".into()),
            ..Default::default()
        };
        assert!(!update.is_empty());
    }
}
