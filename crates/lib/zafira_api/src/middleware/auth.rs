//! Session middleware and identity extractors.
//!
//! [`resolve_session`] runs on every request: it reads the session token
//! (cookie first, then `Authorization: Bearer`), verifies it, and stores an
//! [`AuthenticatedUser`] in the request extensions. Bad or missing tokens
//! leave the request anonymous; [`require_auth`] and [`require_admin`] turn
//! that into 401/403 on the routes that need it.

use std::convert::Infallible;

use axum::{
    extract::{FromRequestParts, OptionalFromRequestParts, Request, State},
    http::request::Parts,
    middleware::Next,
    response::Response,
};
use tracing::debug;
use zafira_core::auth::jwt::verify_session_token;
use zafira_core::models::auth::SessionClaims;

use crate::AppState;
use crate::error::AppError;
use crate::services::cookies::session_token_from_headers;

/// Identity recovered from the session token, kept in request extensions.
#[derive(Debug, Clone)]
pub struct AuthenticatedUser(pub SessionClaims);

/// An [`AuthenticatedUser`] holding the admin role.
#[derive(Debug, Clone)]
pub struct AdminUser(pub SessionClaims);

fn not_authenticated() -> AppError {
    AppError::Unauthorized("Not authenticated".into())
}

fn admin_required() -> AppError {
    AppError::Forbidden("Admin access required".into())
}

/// Axum middleware: attach the caller's identity when a valid session token
/// is present.
pub async fn resolve_session(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Response {
    if let Some(token) = session_token_from_headers(request.headers()) {
        match verify_session_token(&token, state.config.jwt_secret.as_bytes()) {
            Some(claims) => {
                request
                    .extensions_mut()
                    .insert(AuthenticatedUser(claims.session));
            }
            None => debug!("ignoring invalid or expired session token"),
        }
    }
    next.run(request).await
}

/// Axum middleware: reject anonymous requests with 401.
pub async fn require_auth(request: Request, next: Next) -> Result<Response, AppError> {
    if request.extensions().get::<AuthenticatedUser>().is_none() {
        return Err(not_authenticated());
    }
    Ok(next.run(request).await)
}

/// Axum middleware: 401 for anonymous requests, 403 for non-admins.
pub async fn require_admin(request: Request, next: Next) -> Result<Response, AppError> {
    match request.extensions().get::<AuthenticatedUser>() {
        None => Err(not_authenticated()),
        Some(AuthenticatedUser(claims)) if !claims.is_admin() => Err(admin_required()),
        Some(_) => Ok(next.run(request).await),
    }
}

impl<S: Send + Sync> FromRequestParts<S> for AuthenticatedUser {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<AuthenticatedUser>()
            .cloned()
            .ok_or_else(not_authenticated)
    }
}

impl<S: Send + Sync> OptionalFromRequestParts<S> for AuthenticatedUser {
    type Rejection = Infallible;

    async fn from_request_parts(
        parts: &mut Parts,
        _state: &S,
    ) -> Result<Option<Self>, Self::Rejection> {
        Ok(parts.extensions.get::<AuthenticatedUser>().cloned())
    }
}

impl<S: Send + Sync> FromRequestParts<S> for AdminUser {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let AuthenticatedUser(claims) = parts
            .extensions
            .get::<AuthenticatedUser>()
            .cloned()
            .ok_or_else(not_authenticated)?;
        if !claims.is_admin() {
            return Err(admin_required());
        }
        Ok(AdminUser(claims))
    }
}
