//! Account administration service.

use std::sync::Arc;

use tracing::info;
use zafira_core::auth::AccountStore;
use zafira_core::auth::password::hash_password;
use zafira_core::auth::validation::{normalize_name, validate_email, validate_password};
use zafira_core::email::EmailSender;
use zafira_core::models::auth::{Account, AccountUpdate, SessionClaims};

use crate::error::{AppError, AppResult};
use crate::models::UpdateAccountRequest;
use crate::services::auth::issue_verification;

fn account_not_found() -> AppError {
    AppError::NotFound("Account not found".into())
}

/// All accounts, oldest first.
pub async fn list(store: &dyn AccountStore) -> AppResult<Vec<Account>> {
    Ok(store.list().await?)
}

pub async fn get(store: &dyn AccountStore, id: &str) -> AppResult<Account> {
    store.find_by_id(id).await?.ok_or_else(account_not_found)
}

/// Update a profile. Members may only edit themselves; admins anyone.
///
/// A new email address is held as pending and gets its own verification
/// link; the current address stays in use until that link is redeemed.
pub async fn update(
    store: &dyn AccountStore,
    mailer: &Arc<dyn EmailSender>,
    frontend_url: &str,
    actor: &SessionClaims,
    id: &str,
    req: UpdateAccountRequest,
) -> AppResult<Account> {
    if actor.id != id && !actor.is_admin() {
        return Err(AppError::Forbidden(
            "You can only update your own account".into(),
        ));
    }

    let mut update = AccountUpdate {
        first_name: normalize_name("firstName", req.first_name.as_deref())?,
        last_name: normalize_name("lastName", req.last_name.as_deref())?,
        ..Default::default()
    };
    if let Some(email) = req.email.as_deref() {
        update.pending_email = Some(validate_email(email)?);
    }
    if let Some(password) = req.password.as_deref() {
        validate_password(password)?;
        update.password_hash = Some(hash_password(password)?);
    }
    if update.is_empty() {
        return Err(AppError::Validation("Nothing to update".into()));
    }

    let requested_email = update.pending_email.clone();
    let password_changed = update.password_hash.is_some();
    let account = store
        .update(id, update)
        .await?
        .ok_or_else(account_not_found)?;
    let email_pending = requested_email.is_some() && account.pending_email == requested_email;
    info!(
        user_id = %account.id,
        by = %actor.id,
        password_changed,
        email_pending,
        "account updated"
    );

    if email_pending {
        issue_verification(store, mailer, frontend_url, &account).await?;
    }
    Ok(account)
}

pub async fn delete(store: &dyn AccountStore, actor: &SessionClaims, id: &str) -> AppResult<()> {
    if !store.delete(id).await? {
        return Err(account_not_found());
    }
    info!(user_id = %id, by = %actor.id, "account deleted");
    Ok(())
}
