//! Google sign-in handlers.

use std::sync::Arc;

use axum::extract::{Query, State};
use axum::response::Redirect;
use axum_extra::extract::cookie::CookieJar;
use serde::Deserialize;
use tracing::debug;
use utoipa::IntoParams;
use zafira_core::oauth::{IdentityProvider, OAuthError, generate_state};

use crate::AppState;
use crate::error::{AppError, AppResult};
use crate::models::ErrorResponse;
use crate::services::auth;
use crate::services::cookies::session_cookie;

/// Query parameters Google appends to the callback URL.
#[derive(Debug, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct GoogleCallbackParams {
    pub code: Option<String>,
    pub state: Option<String>,
    pub error: Option<String>,
}

fn provider(state: &AppState) -> AppResult<&Arc<dyn IdentityProvider>> {
    state
        .identity_provider
        .as_ref()
        .ok_or_else(|| AppError::Unavailable("Google sign-in is not configured".into()))
}

/// `GET /auth/google`: redirect to Google's consent screen.
#[utoipa::path(
    get,
    path = "/auth/google",
    responses(
        (status = 303, description = "Redirect to Google"),
        (status = 503, description = "Google sign-in not configured or too many pending", body = ErrorResponse)
    ),
    tag = "auth"
)]
pub async fn google_start_handler(State(state): State<AppState>) -> AppResult<Redirect> {
    let provider = provider(&state)?;
    let oauth_state = generate_state();
    let url = provider.authorize_url(&oauth_state)?;
    state.oauth_states.insert(oauth_state)?;
    Ok(Redirect::to(&url))
}

/// `GET /auth/google/callback`: complete Google sign-in, open a session and
/// send the browser back to the frontend.
#[utoipa::path(
    get,
    path = "/auth/google/callback",
    params(GoogleCallbackParams),
    responses(
        (status = 303, description = "Session opened, redirect to the frontend"),
        (status = 401, description = "Bad state, denied or failed sign-in", body = ErrorResponse),
        (status = 409, description = "Google account already linked elsewhere", body = ErrorResponse)
    ),
    tag = "auth"
)]
pub async fn google_callback_handler(
    State(state): State<AppState>,
    jar: CookieJar,
    Query(params): Query<GoogleCallbackParams>,
) -> AppResult<(CookieJar, Redirect)> {
    let provider = provider(&state)?;

    if let Some(error) = params.error {
        return Err(OAuthError::Denied(error).into());
    }
    let oauth_state = params.state.ok_or(OAuthError::InvalidState)?;
    if !state.oauth_states.take(&oauth_state) {
        return Err(OAuthError::InvalidState.into());
    }
    let code = params
        .code
        .filter(|c| !c.is_empty())
        .ok_or_else(|| AppError::Validation("Missing authorization code".into()))?;

    let identity = provider.fetch_identity(&code).await?;
    debug!(provider_id = %identity.provider_id, "google identity received");

    let account = auth::federated_login(state.store.as_ref(), identity).await?;
    let token = auth::issue_session(&account, state.config.jwt_secret.as_bytes())?;

    let jar = jar.add(session_cookie(token, state.config.cookie_secure));
    Ok((jar, Redirect::to(&format!("{}/", state.config.frontend_url))))
}
