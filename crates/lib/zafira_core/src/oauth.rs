//! Federated login via Google OAuth 2.0 / OpenID Connect.
//!
//! Provides the CSRF state store used between the redirect and the callback,
//! the [`IdentityProvider`] seam, and the Google implementation (code
//! exchange + userinfo lookup).

use std::time::{Duration, Instant};

use async_trait::async_trait;
use base64::Engine;
use dashmap::DashMap;
use rand::RngCore;
use serde::Deserialize;
use thiserror::Error;
use tracing::{debug, warn};
use url::Url;

use crate::models::auth::FederatedIdentity;

/// TTL for pending state entries (10 minutes).
const STATE_TTL: Duration = Duration::from_secs(600);

/// Upper bound on outstanding state entries.
pub const MAX_PENDING_STATES: usize = 10_000;

pub const GOOGLE_AUTH_URL: &str = "https://accounts.google.com/o/oauth2/v2/auth";
pub const GOOGLE_TOKEN_URL: &str = "https://oauth2.googleapis.com/token";
pub const GOOGLE_USERINFO_URL: &str = "https://openidconnect.googleapis.com/v1/userinfo";

/// OAuth errors.
#[derive(Debug, Error)]
pub enum OAuthError {
    #[error("Invalid or expired OAuth state")]
    InvalidState,

    #[error("Provider denied the request: {0}")]
    Denied(String),

    #[error("Token exchange failed: {0}")]
    Exchange(String),

    #[error("Profile lookup failed: {0}")]
    Profile(String),

    #[error("Invalid OAuth configuration: {0}")]
    Config(String),

    #[error("Too many sign-in attempts in progress")]
    TooManyPending,
}

// =============================================================================
// State (CSRF) handling
// =============================================================================

/// Generate a cryptographic state parameter (CSRF token).
pub fn generate_state() -> String {
    let mut bytes = [0u8; 24];
    rand::rng().fill_bytes(&mut bytes);
    base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(bytes)
}

/// In-memory store of issued state parameters, single use with a TTL and a
/// cap on how many may be outstanding.
pub struct OAuthStateStore {
    states: DashMap<String, Instant>,
    ttl: Duration,
    max_pending: usize,
}

impl OAuthStateStore {
    pub fn new() -> Self {
        Self::with_limits(STATE_TTL, MAX_PENDING_STATES)
    }

    pub fn with_ttl(ttl: Duration) -> Self {
        Self::with_limits(ttl, MAX_PENDING_STATES)
    }

    pub fn with_limits(ttl: Duration, max_pending: usize) -> Self {
        Self {
            states: DashMap::new(),
            ttl,
            max_pending,
        }
    }

    /// Remember a freshly issued state.
    ///
    /// When the store is full, expired entries are evicted first; if it is
    /// still full the state is refused.
    pub fn insert(&self, state: String) -> Result<(), OAuthError> {
        if self.states.len() >= self.max_pending {
            self.cleanup();
            if self.states.len() >= self.max_pending {
                warn!(max_pending = self.max_pending, "oauth state store full");
                return Err(OAuthError::TooManyPending);
            }
        }
        self.states.insert(state, Instant::now());
        Ok(())
    }

    /// Take (remove) a state. Returns `false` if unknown or expired.
    pub fn take(&self, state: &str) -> bool {
        match self.states.remove(state) {
            Some((_, issued_at)) => issued_at.elapsed() <= self.ttl,
            None => false,
        }
    }

    /// Evict expired entries.
    pub fn cleanup(&self) {
        let ttl = self.ttl;
        self.states.retain(|_, issued_at| issued_at.elapsed() <= ttl);
    }

    pub fn len(&self) -> usize {
        self.states.len()
    }

    pub fn is_empty(&self) -> bool {
        self.states.is_empty()
    }

    /// Spawn a periodic cleanup task.
    pub fn spawn_cleanup_task(self: &std::sync::Arc<Self>) -> tokio::task::JoinHandle<()> {
        let store = std::sync::Arc::clone(self);
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(Duration::from_secs(60));
            loop {
                interval.tick().await;
                store.cleanup();
            }
        })
    }
}

impl Default for OAuthStateStore {
    fn default() -> Self {
        Self::new()
    }
}

// =============================================================================
// Identity provider seam
// =============================================================================

/// An external identity provider trusted to have verified its users.
#[async_trait]
pub trait IdentityProvider: Send + Sync {
    /// URL the browser is redirected to, carrying `state`.
    fn authorize_url(&self, state: &str) -> Result<String, OAuthError>;

    /// Complete the flow for an authorization `code`.
    async fn fetch_identity(&self, code: &str) -> Result<FederatedIdentity, OAuthError>;
}

// =============================================================================
// Google
// =============================================================================

/// Google OAuth client settings.
#[derive(Debug, Clone)]
pub struct GoogleOAuthConfig {
    pub client_id: String,
    pub client_secret: String,
    /// Must match the redirect URI registered with Google.
    pub callback_url: String,
    pub auth_url: String,
    pub token_url: String,
    pub userinfo_url: String,
}

impl GoogleOAuthConfig {
    /// Settings pointing at Google's production endpoints.
    pub fn new(client_id: String, client_secret: String, callback_url: String) -> Self {
        Self {
            client_id,
            client_secret,
            callback_url,
            auth_url: GOOGLE_AUTH_URL.into(),
            token_url: GOOGLE_TOKEN_URL.into(),
            userinfo_url: GOOGLE_USERINFO_URL.into(),
        }
    }
}

/// Response from Google's token endpoint.
#[derive(Debug, Deserialize)]
struct GoogleTokenResponse {
    access_token: String,
}

/// OpenID Connect userinfo document.
#[derive(Debug, Deserialize)]
struct GoogleUserInfo {
    sub: String,
    email: Option<String>,
    #[serde(default)]
    email_verified: bool,
    given_name: Option<String>,
    family_name: Option<String>,
}

impl GoogleUserInfo {
    fn into_identity(self) -> Result<FederatedIdentity, OAuthError> {
        let email = self
            .email
            .filter(|e| !e.trim().is_empty())
            .ok_or_else(|| OAuthError::Profile("no email in Google profile".into()))?;
        Ok(FederatedIdentity {
            provider_id: self.sub,
            email,
            first_name: self.given_name,
            last_name: self.family_name,
            email_verified: self.email_verified,
        })
    }
}

pub struct GoogleIdentityProvider {
    config: GoogleOAuthConfig,
    client: reqwest::Client,
}

impl GoogleIdentityProvider {
    pub fn new(config: GoogleOAuthConfig) -> Self {
        Self {
            config,
            client: reqwest::Client::new(),
        }
    }

    /// Exchange an authorization code for an access token.
    async fn exchange_authorization_code(&self, code: &str) -> Result<String, OAuthError> {
        let params = [
            ("grant_type", "authorization_code"),
            ("code", code),
            ("client_id", self.config.client_id.as_str()),
            ("client_secret", self.config.client_secret.as_str()),
            ("redirect_uri", self.config.callback_url.as_str()),
        ];

        let resp = self
            .client
            .post(&self.config.token_url)
            .form(&params)
            .send()
            .await
            .map_err(|e| OAuthError::Exchange(e.to_string()))?;

        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            return Err(OAuthError::Exchange(format!("HTTP {status}: {body}")));
        }

        resp.json::<GoogleTokenResponse>()
            .await
            .map(|t| t.access_token)
            .map_err(|e| OAuthError::Exchange(format!("response parse error: {e}")))
    }

    async fn fetch_userinfo(&self, access_token: &str) -> Result<GoogleUserInfo, OAuthError> {
        let resp = self
            .client
            .get(&self.config.userinfo_url)
            .bearer_auth(access_token)
            .send()
            .await
            .map_err(|e| OAuthError::Profile(e.to_string()))?;

        if !resp.status().is_success() {
            let status = resp.status();
            return Err(OAuthError::Profile(format!("HTTP {status}")));
        }

        resp.json::<GoogleUserInfo>()
            .await
            .map_err(|e| OAuthError::Profile(format!("response parse error: {e}")))
    }
}

#[async_trait]
impl IdentityProvider for GoogleIdentityProvider {
    fn authorize_url(&self, state: &str) -> Result<String, OAuthError> {
        let url = Url::parse_with_params(
            &self.config.auth_url,
            &[
                ("client_id", self.config.client_id.as_str()),
                ("redirect_uri", self.config.callback_url.as_str()),
                ("response_type", "code"),
                ("scope", "openid email profile"),
                ("state", state),
                ("prompt", "select_account"),
            ],
        )
        .map_err(|e| OAuthError::Config(format!("auth url: {e}")))?;
        Ok(url.into())
    }

    async fn fetch_identity(&self, code: &str) -> Result<FederatedIdentity, OAuthError> {
        let access_token = self.exchange_authorization_code(code).await?;
        let info = self.fetch_userinfo(&access_token).await?;
        debug!(sub = %info.sub, "google profile fetched");
        info.into_identity()
    }
}

// =============================================================================
// Tests
// =============================================================================
