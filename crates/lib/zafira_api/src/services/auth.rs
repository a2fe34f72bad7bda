//! Authentication service: registration, e-mail verification, local and
//! federated login, all delegating to `zafira_core::auth`.

use std::sync::Arc;

use chrono::Utc;
use tracing::{debug, info, warn};
use zafira_core::auth::jwt::generate_session_token;
use zafira_core::auth::password::{hash_password, verify_against_dummy, verify_password};
use zafira_core::auth::validation::{normalize_name, validate_email, validate_password};
use zafira_core::auth::verification::{
    build_verify_url, expires_at, generate_verification_token, hash_verification_token,
    is_well_formed,
};
use zafira_core::auth::{AccountStore, AuthError};
use zafira_core::email::{EmailSender, VerificationEmail};
use zafira_core::models::auth::{Account, FederatedIdentity, NewAccount, SessionClaims};

use crate::error::{AppError, AppResult};
use crate::models::RegisterRequest;

fn invalid_credentials() -> AppError {
    AppError::from(AuthError::CredentialError)
}

/// Sign a session token for an account.
///
/// Shared by local and federated login so both produce the same claims.
pub fn issue_session(account: &Account, jwt_secret: &[u8]) -> AppResult<String> {
    let claims = SessionClaims::for_account(account);
    Ok(generate_session_token(&claims, jwt_secret)?)
}

// ---------------------------------------------------------------------------
// Registration & verification
// ---------------------------------------------------------------------------

/// Create an unverified account and send its verification link.
pub async fn register(
    store: &dyn AccountStore,
    mailer: &Arc<dyn EmailSender>,
    frontend_url: &str,
    req: RegisterRequest,
) -> AppResult<Account> {
    let email = validate_email(&req.email)?;
    validate_password(&req.password)?;
    let first_name = normalize_name("firstName", req.first_name.as_deref())?;
    let last_name = normalize_name("lastName", req.last_name.as_deref())?;

    if store.find_by_email(&email).await?.is_some() {
        return Err(AppError::Conflict("Email already registered".into()));
    }

    let password_hash = hash_password(&req.password)?;

    // The store's unique constraint settles concurrent registrations.
    let account = store
        .create(NewAccount {
            email,
            password_hash: Some(password_hash),
            first_name,
            last_name,
            verified: false,
            google_id: None,
        })
        .await?;

    info!(user_id = %account.id, role = %account.role, "account registered");

    issue_verification(store, mailer, frontend_url, &account).await?;
    Ok(account)
}

/// Store a fresh verification token for `account` and mail the link.
pub(crate) async fn issue_verification(
    store: &dyn AccountStore,
    mailer: &Arc<dyn EmailSender>,
    frontend_url: &str,
    account: &Account,
) -> AppResult<()> {
    let token = generate_verification_token();
    store
        .replace_verification_token(
            &account.id,
            &hash_verification_token(&token),
            expires_at(Utc::now()),
        )
        .await?;

    dispatch_verification_email(
        Arc::clone(mailer),
        VerificationEmail {
            to: account.address_to_verify().to_string(),
            first_name: account.first_name.clone(),
            link: build_verify_url(frontend_url, &token),
        },
    );
    Ok(())
}

/// Hand the e-mail to the sender on a background task; delivery failures are
/// logged, never surfaced to the client.
fn dispatch_verification_email(mailer: Arc<dyn EmailSender>, email: VerificationEmail) {
    tokio::spawn(async move {
        match mailer.send_verification(&email).await {
            Ok(()) => debug!(to = %email.to, "verification email sent"),
            Err(e) => warn!(to = %email.to, error = %e, "verification email not delivered"),
        }
    });
}

/// Redeem a verification token and mark its account verified.
pub async fn verify_email(store: &dyn AccountStore, token: Option<&str>) -> AppResult<Account> {
    let token = token
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .ok_or_else(|| AppError::Validation("Verification token is required".into()))?;
    if !is_well_formed(token) {
        return Err(AppError::Validation("Malformed verification token".into()));
    }

    let record = store
        .find_verification_token(&hash_verification_token(token))
        .await?
        .ok_or_else(|| AppError::NotFound("Unknown verification token".into()))?;

    if record.consumed_at.is_some() {
        return Err(AppError::InvalidToken("Verification token already used".into()));
    }
    if record.expires_at <= Utc::now() {
        return Err(AppError::InvalidToken("Verification token expired".into()));
    }
    if !store.consume_verification_token(&record.id).await? {
        return Err(AppError::InvalidToken("Verification token already used".into()));
    }

    let account = store
        .mark_verified(&record.user_id)
        .await?
        .ok_or_else(|| AppError::NotFound("Account not found".into()))?;

    info!(user_id = %account.id, "email verified");
    Ok(account)
}

/// Re-issue a verification link to an unverified account, or to the pending
/// address of a verified one.
///
/// Silent for unknown or already verified addresses.
pub async fn resend_verification(
    store: &dyn AccountStore,
    mailer: &Arc<dyn EmailSender>,
    frontend_url: &str,
    email: &str,
) -> AppResult<()> {
    let email = validate_email(email)?;
    match store.find_by_email(&email).await? {
        Some(found) if !found.account.verified || found.account.pending_email.is_some() => {
            issue_verification(store, mailer, frontend_url, &found.account).await?;
            info!(user_id = %found.account.id, "verification email re-issued");
        }
        _ => debug!("resend requested for unknown or verified address"),
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Login
// ---------------------------------------------------------------------------

/// Authenticate with email + password. Returns the session token and the
/// account.
pub async fn login(
    store: &dyn AccountStore,
    jwt_secret: &[u8],
    email: &str,
    password: &str,
) -> AppResult<(String, Account)> {
    let Some(found) = store.find_by_email(email.trim()).await? else {
        verify_against_dummy(password);
        return Err(invalid_credentials());
    };

    // Federation-only accounts have no password.
    let Some(password_hash) = found.password_hash.as_deref() else {
        verify_against_dummy(password);
        return Err(invalid_credentials());
    };

    if !verify_password(password, password_hash)? {
        debug!(user_id = %found.account.id, "password mismatch");
        return Err(invalid_credentials());
    }

    if !found.account.verified {
        return Err(AuthError::Unverified.into());
    }

    let token = issue_session(&found.account, jwt_secret)?;
    info!(user_id = %found.account.id, "login");
    Ok((token, found.account))
}

/// Resolve an identity asserted by an external provider to a local account.
///
/// The provider subject is looked up first, so a linked account is found even
/// after its email changed. Failing that, an account with the same email is
/// adopted; if that account never proved its email, its password is dropped
/// so whoever chose it cannot sign in any more. Otherwise a verified,
/// password-less account is created.
pub async fn federated_login(
    store: &dyn AccountStore,
    identity: FederatedIdentity,
) -> AppResult<Account> {
    if !identity.email_verified {
        return Err(AppError::Unauthorized(
            "Google account email is not verified".into(),
        ));
    }
    let email = validate_email(&identity.email)?;

    if let Some(linked) = store.find_by_google_id(&identity.provider_id).await? {
        debug!(user_id = %linked.id, "google subject already linked");
        return Ok(linked);
    }
    if let Some(existing) = store.find_by_email(&email).await? {
        return link_existing(store, &existing.account, &identity.provider_id).await;
    }

    let created = store
        .create(NewAccount {
            email: email.clone(),
            password_hash: None,
            first_name: normalize_name("firstName", identity.first_name.as_deref())?,
            last_name: normalize_name("lastName", identity.last_name.as_deref())?,
            verified: true,
            google_id: Some(identity.provider_id.clone()),
        })
        .await;

    match created {
        Ok(account) => {
            info!(user_id = %account.id, "account created from google identity");
            Ok(account)
        }
        // Lost a race with a concurrent registration or sign-in.
        Err(AuthError::Conflict(msg)) => {
            if let Some(linked) = store.find_by_google_id(&identity.provider_id).await? {
                return Ok(linked);
            }
            match store.find_by_email(&email).await? {
                Some(existing) => {
                    link_existing(store, &existing.account, &identity.provider_id).await
                }
                None => Err(AppError::Conflict(msg)),
            }
        }
        Err(e) => Err(e.into()),
    }
}

async fn link_existing(
    store: &dyn AccountStore,
    account: &Account,
    provider_id: &str,
) -> AppResult<Account> {
    let reset_credentials = !account.verified;
    let linked = store
        .link_federated(&account.id, provider_id, reset_credentials)
        .await?
        .ok_or_else(|| AppError::NotFound("Account not found".into()))?;
    if reset_credentials {
        info!(user_id = %linked.id, "unverified account claimed through google, password cleared");
    }
    Ok(linked)
}

#[cfg(test)]
mod tests {
    use super::*;
    use zafira_core::auth::MemoryAccountStore;
    use zafira_core::auth::jwt::verify_session_token;
    use zafira_core::email::LogEmailSender;
    use zafira_core::models::auth::Role;

    const SECRET: &[u8] = b"unit-test-secret";
    const FRONTEND: &str = "http://localhost:3000";

    fn mailer() -> Arc<dyn EmailSender> {
        Arc::new(LogEmailSender)
    }

    fn register_req(email: &str) -> RegisterRequest {
        RegisterRequest {
            email: email.into(),
            password: "Passw0rd!".into(),
            first_name: Some("Ada".into()),
            last_name: None,
        }
    }

    fn identity(email: &str, verified: bool) -> FederatedIdentity {
        FederatedIdentity {
            provider_id: "google-sub-1".into(),
            email: email.into(),
            first_name: Some("Grace".into()),
            last_name: Some("Hopper".into()),
            email_verified: verified,
        }
    }

    #[tokio::test]
    async fn register_rejects_weak_password_before_store() {
        let store = MemoryAccountStore::new();
        let mut req = register_req("a@x.com");
        req.password = "short".into();
        let err = register(&store, &mailer(), FRONTEND, req).await.unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));
        assert!(store.list().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn register_then_duplicate_conflicts() {
        let store = MemoryAccountStore::new();
        let first = register(&store, &mailer(), FRONTEND, register_req("a@x.com"))
            .await
            .unwrap();
        assert!(!first.verified);
        assert_eq!(first.role, Role::Admin);

        let err = register(&store, &mailer(), FRONTEND, register_req(" a@x.com "))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Conflict(_)));
        assert_eq!(store.list().await.unwrap(), vec![first]);
    }

    #[tokio::test]
    async fn verify_email_requires_a_token() {
        let store = MemoryAccountStore::new();
        assert!(matches!(
            verify_email(&store, None).await,
            Err(AppError::Validation(_))
        ));
        assert!(matches!(
            verify_email(&store, Some("  ")).await,
            Err(AppError::Validation(_))
        ));
        assert!(matches!(
            verify_email(&store, Some("not base64 !")).await,
            Err(AppError::Validation(_))
        ));
        let unknown = generate_verification_token();
        assert!(matches!(
            verify_email(&store, Some(&unknown)).await,
            Err(AppError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn expired_token_is_invalid() {
        let store = MemoryAccountStore::new();
        let account = register(&store, &mailer(), FRONTEND, register_req("a@x.com"))
            .await
            .unwrap();
        let token = generate_verification_token();
        store
            .replace_verification_token(
                &account.id,
                &hash_verification_token(&token),
                Utc::now() - chrono::Duration::minutes(1),
            )
            .await
            .unwrap();
        let err = verify_email(&store, Some(&token)).await.unwrap_err();
        assert!(matches!(err, AppError::InvalidToken(m) if m.contains("expired")));
    }

    #[tokio::test]
    async fn login_paths() {
        let store = MemoryAccountStore::new();
        let account = register(&store, &mailer(), FRONTEND, register_req("a@x.com"))
            .await
            .unwrap();

        // Unknown email and wrong password look the same.
        let unknown = login(&store, SECRET, "b@x.com", "Passw0rd!").await.unwrap_err();
        let wrong = login(&store, SECRET, "a@x.com", "Wr0ngpass").await.unwrap_err();
        assert_eq!(unknown.to_string(), wrong.to_string());

        let err = login(&store, SECRET, "a@x.com", "Passw0rd!").await.unwrap_err();
        assert!(matches!(err, AppError::Unauthorized(m) if m == "Email not verified"));

        store.mark_verified(&account.id).await.unwrap();
        let (token, logged_in) = login(&store, SECRET, "a@x.com", "Passw0rd!").await.unwrap();
        assert_eq!(logged_in.id, account.id);
        let claims = verify_session_token(&token, SECRET).unwrap();
        assert_eq!(claims.session.id, account.id);
        assert_eq!(claims.session.first_name, "Ada");
    }

    #[tokio::test]
    async fn federated_login_creates_verified_account() {
        let store = MemoryAccountStore::new();
        let account = federated_login(&store, identity("g@x.com", true)).await.unwrap();
        assert!(account.verified);
        assert_eq!(account.google_id.as_deref(), Some("google-sub-1"));
        assert_eq!(account.first_name.as_deref(), Some("Grace"));

        // No password: local login is impossible.
        let err = login(&store, SECRET, "g@x.com", "anything1").await.unwrap_err();
        assert!(matches!(err, AppError::Unauthorized(m) if m == "Invalid credentials"));

        // Second login reuses the account.
        let again = federated_login(&store, identity("g@x.com", true)).await.unwrap();
        assert_eq!(again.id, account.id);
        assert_eq!(store.list().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn federated_login_refuses_unverified_provider_email() {
        let store = MemoryAccountStore::new();
        let err = federated_login(&store, identity("g@x.com", false))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Unauthorized(_)));
        assert!(store.list().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn federated_login_adopts_unverified_account_without_its_password() {
        let store = MemoryAccountStore::new();
        let local = register(&store, &mailer(), FRONTEND, register_req("a@x.com"))
            .await
            .unwrap();
        let merged = federated_login(&store, identity("a@x.com", true)).await.unwrap();
        assert_eq!(merged.id, local.id);
        assert!(merged.verified);
        assert_eq!(merged.google_id.as_deref(), Some("google-sub-1"));

        // The password chosen before anyone proved the address is gone.
        let err = login(&store, SECRET, "a@x.com", "Passw0rd!").await.unwrap_err();
        assert!(matches!(err, AppError::Unauthorized(m) if m == "Invalid credentials"));
        let stored = store.find_by_email("a@x.com").await.unwrap().unwrap();
        assert!(stored.password_hash.is_none());
    }

    #[tokio::test]
    async fn federated_login_keeps_password_of_verified_account() {
        let store = MemoryAccountStore::new();
        let local = register(&store, &mailer(), FRONTEND, register_req("a@x.com"))
            .await
            .unwrap();
        store.mark_verified(&local.id).await.unwrap();

        let merged = federated_login(&store, identity("a@x.com", true)).await.unwrap();
        assert_eq!(merged.id, local.id);
        assert_eq!(merged.google_id.as_deref(), Some("google-sub-1"));
        assert!(login(&store, SECRET, "a@x.com", "Passw0rd!").await.is_ok());
    }

    #[tokio::test]
    async fn federated_login_finds_linked_account_after_email_change() {
        let store = MemoryAccountStore::new();
        let account = federated_login(&store, identity("g@x.com", true)).await.unwrap();
        store
            .update(
                &account.id,
                zafira_core::models::auth::AccountUpdate {
                    pending_email: Some("moved@x.com".into()),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        store.mark_verified(&account.id).await.unwrap();

        // Google still reports the old address; the subject decides.
        let again = federated_login(&store, identity("g@x.com", true)).await.unwrap();
        assert_eq!(again.id, account.id);
        assert_eq!(again.email, "moved@x.com");
        assert_eq!(store.list().await.unwrap().len(), 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn concurrent_registrations_of_one_email_admit_one() {
        let store = MemoryAccountStore::new();
        let mailer = mailer();
        let (a, b) = tokio::join!(
            register(&store, &mailer, FRONTEND, register_req("race@x.com")),
            register(&store, &mailer, FRONTEND, register_req("race@x.com")),
        );
        let results = [a, b];
        assert_eq!(results.iter().filter(|r| r.is_ok()).count(), 1);
        assert_eq!(
            results
                .iter()
                .filter(|r| matches!(r, Err(AppError::Conflict(_))))
                .count(),
            1
        );
        assert_eq!(store.list().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn resend_is_silent_for_unknown_email() {
        let store = MemoryAccountStore::new();
        assert!(resend_verification(&store, &mailer(), FRONTEND, "nobody@x.com")
            .await
            .is_ok());
    }
}
