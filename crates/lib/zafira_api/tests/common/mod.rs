//! Shared fixtures: an in-memory router with a recording mailer and a fake
//! identity provider.

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use axum::Router;
use axum::body::Body;
use axum::http::header::{AUTHORIZATION, CONTENT_TYPE, COOKIE, SET_COOKIE};
use axum::http::{Method, Request, Response};
use tokio::sync::Notify;
use tower::ServiceExt;
use zafira_api::AppState;
use zafira_api::config::ApiConfig;
use zafira_core::auth::MemoryAccountStore;
use zafira_core::email::{EmailError, EmailSender, VerificationEmail};
use zafira_core::models::auth::FederatedIdentity;
use zafira_core::oauth::{IdentityProvider, OAuthError, OAuthStateStore};

pub const SECRET: &str = "integration-test-secret";
pub const FRONTEND: &str = "http://localhost:3000";
pub const PASSWORD: &str = "Passw0rd!";

/// Mail sender that keeps every message for inspection.
#[derive(Default)]
pub struct RecordingMailer {
    sent: Mutex<Vec<VerificationEmail>>,
    notify: Notify,
}

impl RecordingMailer {
    /// Wait until `count` messages were sent to `to` and return the latest.
    pub async fn wait_for(&self, to: &str, count: usize) -> VerificationEmail {
        let wait = async {
            loop {
                let notified = self.notify.notified();
                {
                    let sent = self.sent.lock().unwrap();
                    let mine: Vec<_> = sent.iter().filter(|e| e.to == to).collect();
                    if mine.len() >= count {
                        return mine[count - 1].clone();
                    }
                }
                notified.await;
            }
        };
        tokio::time::timeout(Duration::from_secs(5), wait)
            .await
            .expect("verification email was not sent")
    }

    /// Raw token carried by the latest link sent to `to`.
    pub async fn token_for(&self, to: &str, count: usize) -> String {
        let email = self.wait_for(to, count).await;
        let url = url::Url::parse(&email.link).unwrap();
        assert_eq!(url.path(), "/verify-email");
        url.query_pairs()
            .find(|(k, _)| k == "token")
            .map(|(_, v)| v.into_owned())
            .expect("token in link")
    }

    pub fn count(&self) -> usize {
        self.sent.lock().unwrap().len()
    }
}

#[async_trait]
impl EmailSender for RecordingMailer {
    async fn send_verification(&self, email: &VerificationEmail) -> Result<(), EmailError> {
        self.sent.lock().unwrap().push(email.clone());
        self.notify.notify_waiters();
        Ok(())
    }
}

/// Identity provider answering from a fixed code → identity table.
#[derive(Default)]
pub struct FakeProvider {
    identities: Mutex<HashMap<String, FederatedIdentity>>,
}

impl FakeProvider {
    pub fn register_code(&self, code: &str, identity: FederatedIdentity) {
        self.identities
            .lock()
            .unwrap()
            .insert(code.to_string(), identity);
    }
}

#[async_trait]
impl IdentityProvider for FakeProvider {
    fn authorize_url(&self, state: &str) -> Result<String, OAuthError> {
        Ok(format!("https://idp.test/authorize?state={state}"))
    }

    async fn fetch_identity(&self, code: &str) -> Result<FederatedIdentity, OAuthError> {
        self.identities
            .lock()
            .unwrap()
            .get(code)
            .cloned()
            .ok_or_else(|| OAuthError::Exchange("unknown code".into()))
    }
}

pub struct TestApp {
    pub router: Router,
    pub store: Arc<MemoryAccountStore>,
    pub mailer: Arc<RecordingMailer>,
    pub provider: Arc<FakeProvider>,
    pub oauth_states: Arc<OAuthStateStore>,
}

pub fn config() -> ApiConfig {
    ApiConfig::new("127.0.0.1:0", "api", SECRET, FRONTEND).unwrap()
}

/// Router with Google sign-in wired to a [`FakeProvider`].
pub fn test_app() -> TestApp {
    build(true, OAuthStateStore::new())
}

/// Router without any identity provider.
pub fn test_app_without_google() -> TestApp {
    build(false, OAuthStateStore::new())
}

/// Router whose OAuth state store holds at most `max_pending` entries.
pub fn test_app_with_state_limit(max_pending: usize) -> TestApp {
    build(
        true,
        OAuthStateStore::with_limits(Duration::from_secs(600), max_pending),
    )
}

fn build(with_google: bool, oauth_states: OAuthStateStore) -> TestApp {
    let store = Arc::new(MemoryAccountStore::new());
    let mailer = Arc::new(RecordingMailer::default());
    let provider = Arc::new(FakeProvider::default());
    let oauth_states = Arc::new(oauth_states);

    let identity_provider: Option<Arc<dyn IdentityProvider>> = if with_google {
        Some(provider.clone())
    } else {
        None
    };

    let state = AppState {
        store: store.clone(),
        config: config(),
        mailer: mailer.clone(),
        oauth_states: oauth_states.clone(),
        identity_provider,
    };

    TestApp {
        router: zafira_api::router(state),
        store,
        mailer,
        provider,
        oauth_states,
    }
}

impl TestApp {
    pub async fn send(&self, request: Request<Body>) -> Response<Body> {
        self.router.clone().oneshot(request).await.expect("request")
    }

    pub async fn post_json(
        &self,
        uri: &str,
        body: serde_json::Value,
        cookie: Option<&str>,
    ) -> Response<Body> {
        let mut builder = Request::builder()
            .method(Method::POST)
            .uri(uri)
            .header(CONTENT_TYPE, "application/json");
        if let Some(cookie) = cookie {
            builder = builder.header(COOKIE, cookie);
        }
        self.send(builder.body(Body::from(body.to_string())).unwrap())
            .await
    }

    pub async fn request(
        &self,
        method: Method,
        uri: &str,
        cookie: Option<&str>,
        body: Option<serde_json::Value>,
    ) -> Response<Body> {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(cookie) = cookie {
            builder = builder.header(COOKIE, cookie);
        }
        let body = match body {
            Some(json) => {
                builder = builder.header(CONTENT_TYPE, "application/json");
                Body::from(json.to_string())
            }
            None => Body::empty(),
        };
        self.send(builder.body(body).unwrap()).await
    }

    pub async fn get(&self, uri: &str, cookie: Option<&str>) -> Response<Body> {
        self.request(Method::GET, uri, cookie, None).await
    }

    pub async fn get_with_bearer(&self, uri: &str, token: &str) -> Response<Body> {
        let request = Request::builder()
            .uri(uri)
            .header(AUTHORIZATION, format!("Bearer {token}"))
            .body(Body::empty())
            .unwrap();
        self.send(request).await
    }

    /// Register an account and redeem its verification link.
    pub async fn register_verified(&self, email: &str, first_name: &str) -> serde_json::Value {
        let before = self.mailer_count_for(email);
        let resp = self
            .post_json(
                "/api/auth/register",
                serde_json::json!({
                    "email": email,
                    "password": PASSWORD,
                    "firstName": first_name,
                }),
                None,
            )
            .await;
        assert_eq!(resp.status(), 201);
        let token = self.mailer.token_for(email, before + 1).await;
        let resp = self
            .post_json(
                &format!("/api/auth/verify-email?token={token}"),
                serde_json::json!({}),
                None,
            )
            .await;
        assert_eq!(resp.status(), 200);
        body_json(resp).await["user"].clone()
    }

    /// Log in and return the `auth_token=...` cookie pair.
    pub async fn login(&self, email: &str) -> String {
        let resp = self
            .post_json(
                "/api/auth/login",
                serde_json::json!({ "email": email, "password": PASSWORD }),
                None,
            )
            .await;
        assert_eq!(resp.status(), 200);
        session_cookie(&resp).expect("session cookie")
    }

    /// Run the Google redirect and callback for `identity`; returns the
    /// callback response.
    pub async fn google_sign_in(&self, identity: FederatedIdentity) -> Response<Body> {
        let resp = self.get("/api/auth/google", None).await;
        assert!(resp.status().is_redirection());
        let location = resp.headers()[axum::http::header::LOCATION]
            .to_str()
            .unwrap()
            .to_string();
        let state = url::Url::parse(&location)
            .unwrap()
            .query_pairs()
            .find(|(k, _)| k == "state")
            .map(|(_, v)| v.into_owned())
            .expect("state in redirect");

        let code = format!("code-{}", identity.provider_id);
        self.provider.register_code(&code, identity);
        self.get(
            &format!("/api/auth/google/callback?code={code}&state={state}"),
            None,
        )
        .await
    }

    fn mailer_count_for(&self, email: &str) -> usize {
        self.mailer
            .sent
            .lock()
            .unwrap()
            .iter()
            .filter(|e| e.to == email)
            .count()
    }
}

pub async fn body_json(resp: Response<Body>) -> serde_json::Value {
    let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX)
        .await
        .expect("read body");
    serde_json::from_slice(&bytes).expect("parse JSON")
}

/// `Set-Cookie` header for `auth_token`, if any.
pub fn set_cookie_header(resp: &Response<Body>) -> Option<String> {
    resp.headers()
        .get_all(SET_COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .find(|v| v.starts_with("auth_token="))
        .map(str::to_string)
}

pub fn google_identity(provider_id: &str, email: &str) -> FederatedIdentity {
    FederatedIdentity {
        provider_id: provider_id.into(),
        email: email.into(),
        first_name: Some("Grace".into()),
        last_name: Some("Hopper".into()),
        email_verified: true,
    }
}

/// `auth_token=<value>` pair ready to send back in a `Cookie` header.
pub fn session_cookie(resp: &Response<Body>) -> Option<String> {
    let header = set_cookie_header(resp)?;
    let pair = header.split(';').next()?.trim().to_string();
    (pair != "auth_token=").then_some(pair)
}
