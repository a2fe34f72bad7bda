//! Authentication request handlers.

use axum::Json;
use axum::extract::rejection::JsonRejection;
use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum_extra::extract::cookie::CookieJar;

use crate::AppState;
use crate::error::AppResult;
use crate::middleware::auth::AuthenticatedUser;
use crate::models::{
    AccountResponse, ErrorResponse, LoginRequest, LoginResponse, MeResponse, MessageResponse,
    RegisterRequest, ResendVerificationRequest, VerifyEmailParams,
};
use crate::services::auth;
use crate::services::cookies::{clear_session_cookie, session_cookie};

/// `POST /auth/register`: create an unverified account and mail its
/// verification link.
#[utoipa::path(
    post,
    path = "/auth/register",
    request_body = RegisterRequest,
    responses(
        (status = 201, description = "Account created, verification link sent", body = AccountResponse),
        (status = 400, description = "Invalid input", body = ErrorResponse),
        (status = 409, description = "Email already registered", body = ErrorResponse)
    ),
    tag = "auth"
)]
pub async fn register_handler(
    State(state): State<AppState>,
    payload: Result<Json<RegisterRequest>, JsonRejection>,
) -> AppResult<(StatusCode, Json<AccountResponse>)> {
    let Json(body) = payload?;
    let account = auth::register(
        state.store.as_ref(),
        &state.mailer,
        &state.config.frontend_url,
        body,
    )
    .await?;
    Ok((
        StatusCode::CREATED,
        Json(AccountResponse {
            message: "Registration successful, check your email to verify your account".into(),
            user: account.into(),
        }),
    ))
}

/// `POST /auth/verify-email?token=`: redeem a verification token.
#[utoipa::path(
    post,
    path = "/auth/verify-email",
    params(VerifyEmailParams),
    responses(
        (status = 200, description = "Email verified", body = AccountResponse),
        (status = 400, description = "Missing, malformed, expired or used token", body = ErrorResponse),
        (status = 404, description = "Unknown token", body = ErrorResponse),
        (status = 409, description = "Requested address taken meanwhile", body = ErrorResponse)
    ),
    tag = "auth"
)]
pub async fn verify_email_handler(
    State(state): State<AppState>,
    Query(params): Query<VerifyEmailParams>,
) -> AppResult<Json<AccountResponse>> {
    let account = auth::verify_email(state.store.as_ref(), params.token.as_deref()).await?;
    Ok(Json(AccountResponse {
        message: "Email verified successfully".into(),
        user: account.into(),
    }))
}

/// `POST /auth/resend-verification`: re-issue a verification link.
#[utoipa::path(
    post,
    path = "/auth/resend-verification",
    request_body = ResendVerificationRequest,
    responses(
        (status = 200, description = "Same answer whether or not a link was sent", body = MessageResponse),
        (status = 400, description = "Invalid email", body = ErrorResponse)
    ),
    tag = "auth"
)]
pub async fn resend_verification_handler(
    State(state): State<AppState>,
    payload: Result<Json<ResendVerificationRequest>, JsonRejection>,
) -> AppResult<Json<MessageResponse>> {
    let Json(body) = payload?;
    auth::resend_verification(
        state.store.as_ref(),
        &state.mailer,
        &state.config.frontend_url,
        &body.email,
    )
    .await?;
    Ok(Json(MessageResponse::new(
        "If this address needs verification, a new link has been sent",
    )))
}

/// `POST /auth/login`: authenticate with email + password and open a
/// session.
#[utoipa::path(
    post,
    path = "/auth/login",
    request_body = LoginRequest,
    responses(
        (status = 200, description = "Session opened, `auth_token` cookie set", body = LoginResponse),
        (status = 400, description = "Invalid input", body = ErrorResponse),
        (status = 401, description = "Invalid credentials or unverified email", body = ErrorResponse)
    ),
    tag = "auth"
)]
pub async fn login_handler(
    State(state): State<AppState>,
    jar: CookieJar,
    payload: Result<Json<LoginRequest>, JsonRejection>,
) -> AppResult<(CookieJar, Json<LoginResponse>)> {
    let Json(body) = payload?;
    let (token, account) = auth::login(
        state.store.as_ref(),
        state.config.jwt_secret.as_bytes(),
        &body.email,
        &body.password,
    )
    .await?;
    let jar = jar.add(session_cookie(token.clone(), state.config.cookie_secure));
    Ok((
        jar,
        Json(LoginResponse {
            message: "Login successful".into(),
            user: account.into(),
            access_token: token,
        }),
    ))
}

/// `GET /auth/me`: claims of the current session.
#[utoipa::path(
    get,
    path = "/auth/me",
    responses(
        (status = 200, description = "Current session", body = MeResponse),
        (status = 401, description = "No valid session", body = MessageResponse)
    ),
    security(("bearer" = []), ("session_cookie" = [])),
    tag = "auth"
)]
pub async fn me_handler(user: Option<AuthenticatedUser>) -> Response {
    match user {
        Some(AuthenticatedUser(claims)) => Json(MeResponse { user: claims }).into_response(),
        None => (
            StatusCode::UNAUTHORIZED,
            Json(MessageResponse::new("Not authenticated")),
        )
            .into_response(),
    }
}

/// `POST /auth/logout`: clear the session cookie.
#[utoipa::path(
    post,
    path = "/auth/logout",
    responses((status = 200, description = "Cookie cleared", body = MessageResponse)),
    tag = "auth"
)]
pub async fn logout_handler(
    State(state): State<AppState>,
    jar: CookieJar,
) -> (CookieJar, Json<MessageResponse>) {
    let jar = jar.add(clear_session_cookie(state.config.cookie_secure));
    (jar, Json(MessageResponse::new("Logged out successfully")))
}
