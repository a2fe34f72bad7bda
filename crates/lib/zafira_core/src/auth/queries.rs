//! PostgreSQL credential store.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;

use super::AuthError;
use super::store::AccountStore;
use crate::models::auth::{
    Account, AccountUpdate, AccountWithPassword, NewAccount, Role, VerificationTokenRecord,
};
use crate::uuid::{parse_id, uuidv7};

/// Serializes account creation so only one first account can become admin.
const FIRST_ADMIN_LOCK_ID: i64 = 7_202_501;

const GOOGLE_ID_CONSTRAINT: &str = "users_google_id_key";

const ACCOUNT_COLUMNS: &str = "id::text, email, password_hash, first_name, last_name, role, \
                               verified, google_id, pending_email, created_at, updated_at";

#[derive(sqlx::FromRow)]
struct AccountRow {
    id: String,
    email: String,
    password_hash: Option<String>,
    first_name: Option<String>,
    last_name: Option<String>,
    role: String,
    verified: bool,
    google_id: Option<String>,
    pending_email: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl AccountRow {
    fn into_account_with_password(self) -> Result<AccountWithPassword, AuthError> {
        let role = Role::parse(&self.role)
            .ok_or_else(|| AuthError::Internal(format!("unknown role '{}'", self.role)))?;
        Ok(AccountWithPassword {
            account: Account {
                id: self.id,
                email: self.email,
                first_name: self.first_name,
                last_name: self.last_name,
                role,
                verified: self.verified,
                google_id: self.google_id,
                pending_email: self.pending_email,
                created_at: self.created_at,
                updated_at: self.updated_at,
            },
            password_hash: self.password_hash,
        })
    }

    fn into_account(self) -> Result<Account, AuthError> {
        self.into_account_with_password().map(|a| a.account)
    }
}

/// Map a unique-violation (SQLSTATE 23505) to `Conflict`, naming the
/// Google subject when that constraint fired and the email otherwise.
fn conflict_on_unique(e: sqlx::Error) -> AuthError {
    if let sqlx::Error::Database(db) = &e
        && db.is_unique_violation()
    {
        if db.constraint() == Some(GOOGLE_ID_CONSTRAINT) {
            return AuthError::Conflict("Google account already linked to another user".into());
        }
        return AuthError::Conflict("Email already registered".into());
    }
    AuthError::DbError(e)
}

/// Credential store backed by the `users` and `email_verification_tokens`
/// tables.
#[derive(Clone)]
pub struct PgAccountStore {
    pool: PgPool,
}

impl PgAccountStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

#[async_trait]
impl AccountStore for PgAccountStore {
    async fn find_by_email(&self, email: &str) -> Result<Option<AccountWithPassword>, AuthError> {
        let row = sqlx::query_as::<_, AccountRow>(&format!(
            "SELECT {ACCOUNT_COLUMNS} FROM users WHERE email = $1"
        ))
        .bind(email)
        .fetch_optional(&self.pool)
        .await?;
        row.map(AccountRow::into_account_with_password).transpose()
    }

    async fn find_by_id(&self, id: &str) -> Result<Option<Account>, AuthError> {
        let Some(id) = parse_id(id) else {
            return Ok(None);
        };
        let row = sqlx::query_as::<_, AccountRow>(&format!(
            "SELECT {ACCOUNT_COLUMNS} FROM users WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        row.map(AccountRow::into_account).transpose()
    }

    async fn find_by_google_id(&self, provider_id: &str) -> Result<Option<Account>, AuthError> {
        let row = sqlx::query_as::<_, AccountRow>(&format!(
            "SELECT {ACCOUNT_COLUMNS} FROM users WHERE google_id = $1"
        ))
        .bind(provider_id)
        .fetch_optional(&self.pool)
        .await?;
        row.map(AccountRow::into_account).transpose()
    }

    async fn list(&self) -> Result<Vec<Account>, AuthError> {
        let rows = sqlx::query_as::<_, AccountRow>(&format!(
            "SELECT {ACCOUNT_COLUMNS} FROM users ORDER BY created_at, id"
        ))
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(AccountRow::into_account).collect()
    }

    async fn create(&self, new: NewAccount) -> Result<Account, AuthError> {
        let mut tx = self.pool.begin().await?;
        sqlx::query("SELECT pg_advisory_xact_lock($1)")
            .bind(FIRST_ADMIN_LOCK_ID)
            .execute(&mut *tx)
            .await?;

        // Under the lock the EXISTS check sees every committed account.
        let row = sqlx::query_as::<_, AccountRow>(&format!(
            "INSERT INTO users \
                 (id, email, password_hash, first_name, last_name, role, verified, google_id) \
             VALUES ($1, $2, $3, $4, $5, \
                 CASE WHEN EXISTS (SELECT 1 FROM users) THEN 'member' ELSE 'admin' END, \
                 $6, $7) \
             RETURNING {ACCOUNT_COLUMNS}"
        ))
        .bind(uuidv7())
        .bind(&new.email)
        .bind(&new.password_hash)
        .bind(&new.first_name)
        .bind(&new.last_name)
        .bind(new.verified)
        .bind(&new.google_id)
        .fetch_one(&mut *tx)
        .await
        .map_err(conflict_on_unique)?;
        tx.commit().await?;
        row.into_account()
    }

    async fn update(&self, id: &str, update: AccountUpdate) -> Result<Option<Account>, AuthError> {
        let Some(id) = parse_id(id) else {
            return Ok(None);
        };
        if let Some(email) = update.pending_email.as_deref() {
            let taken: bool = sqlx::query_scalar(
                "SELECT EXISTS (SELECT 1 FROM users WHERE email = $1 AND id <> $2)",
            )
            .bind(email)
            .bind(id)
            .fetch_one(&self.pool)
            .await?;
            if taken {
                return Err(AuthError::Conflict("Email already registered".into()));
            }
        }
        let row = sqlx::query_as::<_, AccountRow>(&format!(
            "UPDATE users SET \
                 pending_email = CASE \
                     WHEN $2::text IS NULL THEN pending_email \
                     WHEN $2 = email THEN NULL \
                     ELSE $2 END, \
                 first_name = COALESCE($3, first_name), \
                 last_name = COALESCE($4, last_name), \
                 password_hash = COALESCE($5, password_hash), \
                 updated_at = now() \
             WHERE id = $1 \
             RETURNING {ACCOUNT_COLUMNS}"
        ))
        .bind(id)
        .bind(&update.pending_email)
        .bind(&update.first_name)
        .bind(&update.last_name)
        .bind(&update.password_hash)
        .fetch_optional(&self.pool)
        .await?;
        row.map(AccountRow::into_account).transpose()
    }

    async fn delete(&self, id: &str) -> Result<bool, AuthError> {
        let Some(id) = parse_id(id) else {
            return Ok(false);
        };
        // Tokens go with the account (ON DELETE CASCADE).
        let result = sqlx::query("DELETE FROM users WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn mark_verified(&self, id: &str) -> Result<Option<Account>, AuthError> {
        let Some(id) = parse_id(id) else {
            return Ok(None);
        };
        let row = sqlx::query_as::<_, AccountRow>(&format!(
            "UPDATE users SET \
                 email = COALESCE(pending_email, email), \
                 pending_email = NULL, \
                 verified = TRUE, \
                 updated_at = now() \
             WHERE id = $1 RETURNING {ACCOUNT_COLUMNS}"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(conflict_on_unique)?;
        row.map(AccountRow::into_account).transpose()
    }

    async fn link_federated(
        &self,
        id: &str,
        provider_id: &str,
        reset_credentials: bool,
    ) -> Result<Option<Account>, AuthError> {
        let Some(id) = parse_id(id) else {
            return Ok(None);
        };
        let row = sqlx::query_as::<_, AccountRow>(&format!(
            "UPDATE users SET \
                 google_id = CASE WHEN $3 THEN $2 ELSE COALESCE(google_id, $2) END, \
                 password_hash = CASE WHEN $3 THEN NULL ELSE password_hash END, \
                 pending_email = CASE WHEN $3 THEN NULL ELSE pending_email END, \
                 verified = TRUE, \
                 updated_at = now() \
             WHERE id = $1 RETURNING {ACCOUNT_COLUMNS}"
        ))
        .bind(id)
        .bind(provider_id)
        .bind(reset_credentials)
        .fetch_optional(&self.pool)
        .await
        .map_err(conflict_on_unique)?;
        row.map(AccountRow::into_account).transpose()
    }

    async fn replace_verification_token(
        &self,
        user_id: &str,
        token_hash: &str,
        expires_at: DateTime<Utc>,
    ) -> Result<(), AuthError> {
        let user_id =
            parse_id(user_id).ok_or_else(|| AuthError::NotFound("Account not found".into()))?;
        sqlx::query(
            "INSERT INTO email_verification_tokens (id, user_id, token_hash, expires_at) \
             VALUES ($1, $2, $3, $4) \
             ON CONFLICT (user_id) DO UPDATE SET \
                 id = EXCLUDED.id, \
                 token_hash = EXCLUDED.token_hash, \
                 expires_at = EXCLUDED.expires_at, \
                 consumed_at = NULL, \
                 created_at = now()",
        )
        .bind(uuidv7())
        .bind(user_id)
        .bind(token_hash)
        .bind(expires_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn find_verification_token(
        &self,
        token_hash: &str,
    ) -> Result<Option<VerificationTokenRecord>, AuthError> {
        let row = sqlx::query_as::<_, (String, String, DateTime<Utc>, Option<DateTime<Utc>>)>(
            "SELECT id::text, user_id::text, expires_at, consumed_at \
             FROM email_verification_tokens WHERE token_hash = $1",
        )
        .bind(token_hash)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(
            |(id, user_id, expires_at, consumed_at)| VerificationTokenRecord {
                id,
                user_id,
                expires_at,
                consumed_at,
            },
        ))
    }

    async fn consume_verification_token(&self, token_id: &str) -> Result<bool, AuthError> {
        let Some(token_id) = parse_id(token_id) else {
            return Ok(false);
        };
        let result = sqlx::query(
            "UPDATE email_verification_tokens SET consumed_at = now() \
             WHERE id = $1 AND consumed_at IS NULL AND expires_at > now()",
        )
        .bind(token_id)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() == 1)
    }

    async fn ping(&self) -> Result<(), AuthError> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }
}
