//! # zafira_api
//!
//! HTTP API library for Zafira: registration with e-mail verification,
//! local and Google login, and the stateless `auth_token` session.

pub mod config;
pub mod docs;
pub mod error;
pub mod handlers;
pub mod middleware;
pub mod models;
pub mod routes;
pub mod services;

use std::sync::Arc;

use axum::Router;
use axum::http::header::{AUTHORIZATION, CONTENT_TYPE};
use axum::http::{HeaderValue, Method};
use axum::middleware::{from_fn, from_fn_with_state};
use axum::routing::{get, post, put};
use sqlx::PgPool;
use tower_http::cors::{AllowOrigin, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::warn;
use zafira_core::auth::AccountStore;
use zafira_core::email::EmailSender;
use zafira_core::oauth::{IdentityProvider, OAuthStateStore};

use crate::config::ApiConfig;
use crate::handlers::{auth, health, oauth, users};
use crate::middleware::auth::{require_admin, require_auth, resolve_session};

/// Shared application state passed to all handlers.
#[derive(Clone)]
pub struct AppState {
    /// Credential store.
    pub store: Arc<dyn AccountStore>,
    /// API configuration.
    pub config: ApiConfig,
    /// Verification e-mail delivery.
    pub mailer: Arc<dyn EmailSender>,
    /// Pending OAuth `state` values.
    pub oauth_states: Arc<OAuthStateStore>,
    /// Google sign-in; `None` when not configured.
    pub identity_provider: Option<Arc<dyn IdentityProvider>>,
}

/// Run embedded database migrations.
///
/// Delegates to `zafira_core::migrate::migrate()` which owns the migration files.
pub async fn migrate(pool: &PgPool) -> Result<(), sqlx::migrate::MigrateError> {
    zafira_core::migrate::migrate(pool).await
}

fn cors_layer(config: &ApiConfig) -> CorsLayer {
    let origins: Vec<HeaderValue> = config
        .allowed_origins
        .iter()
        .filter_map(|origin| match origin.parse() {
            Ok(value) => Some(value),
            Err(_) => {
                warn!(%origin, "ignoring unparsable CORS origin");
                None
            }
        })
        .collect();

    CorsLayer::new()
        .allow_origin(AllowOrigin::list(origins))
        .allow_credentials(true)
        .allow_methods([
            Method::GET,
            Method::HEAD,
            Method::PUT,
            Method::PATCH,
            Method::POST,
            Method::DELETE,
        ])
        .allow_headers([CONTENT_TYPE, AUTHORIZATION])
}

/// Builds the Axum router with all routes and shared state.
pub fn router(state: AppState) -> Router {
    // Public routes (identity optional)
    let public = Router::new()
        .route(routes::POST_AUTH_REGISTER, post(auth::register_handler))
        .route(routes::POST_AUTH_VERIFY_EMAIL, post(auth::verify_email_handler))
        .route(
            routes::POST_AUTH_RESEND_VERIFICATION,
            post(auth::resend_verification_handler),
        )
        .route(routes::POST_AUTH_LOGIN, post(auth::login_handler))
        .route(routes::GET_AUTH_GOOGLE, get(oauth::google_start_handler))
        .route(
            routes::GET_AUTH_GOOGLE_CALLBACK,
            get(oauth::google_callback_handler),
        )
        .route(routes::GET_AUTH_ME, get(auth::me_handler))
        .route(routes::POST_AUTH_LOGOUT, post(auth::logout_handler))
        .route(routes::GET_HEALTH, get(health::health_handler));

    // Admin-only routes
    let admin = Router::new()
        .route(routes::GET_USER, get(users::list_handler))
        .route(routes::GET_USER_BY_ID, get(users::get_handler))
        .route_layer(from_fn(require_admin));

    // Protected routes (require a session; per-handler role checks)
    let protected = Router::new()
        .route(
            routes::USER_ID,
            put(users::update_handler).delete(users::delete_handler),
        )
        .route_layer(from_fn(require_auth));

    let api = Router::new().merge(public).merge(admin).merge(protected);
    let prefix = state.config.route_prefix();
    let api = match prefix.as_deref() {
        Some(prefix) => Router::new().nest(prefix, api),
        None => api,
    };
    let api = api.merge(docs::docs_router(prefix.as_deref()));

    api.layer(from_fn_with_state(state.clone(), resolve_session))
        .layer(cors_layer(&state.config))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
