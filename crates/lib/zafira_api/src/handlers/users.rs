//! Account administration handlers.

use axum::Json;
use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, State};

use crate::AppState;
use crate::error::AppResult;
use crate::middleware::auth::{AdminUser, AuthenticatedUser};
use crate::models::{AccountView, ErrorResponse, MessageResponse, UpdateAccountRequest};
use crate::services::users;

/// `GET /user`: list accounts (admin).
#[utoipa::path(
    get,
    path = "/user",
    responses(
        (status = 200, description = "All accounts, oldest first", body = [AccountView]),
        (status = 401, description = "No valid session", body = ErrorResponse),
        (status = 403, description = "Not an admin", body = ErrorResponse)
    ),
    security(("bearer" = []), ("session_cookie" = [])),
    tag = "users"
)]
pub async fn list_handler(State(state): State<AppState>) -> AppResult<Json<Vec<AccountView>>> {
    let accounts = users::list(state.store.as_ref()).await?;
    Ok(Json(accounts.into_iter().map(AccountView::from).collect()))
}

/// `GET /user/by-id/{id}`: fetch one account (admin).
#[utoipa::path(
    get,
    path = "/user/by-id/{id}",
    params(("id" = String, Path, description = "Account id")),
    responses(
        (status = 200, description = "Account", body = AccountView),
        (status = 403, description = "Not an admin", body = ErrorResponse),
        (status = 404, description = "Unknown account", body = ErrorResponse)
    ),
    security(("bearer" = []), ("session_cookie" = [])),
    tag = "users"
)]
pub async fn get_handler(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> AppResult<Json<AccountView>> {
    let account = users::get(state.store.as_ref(), &id).await?;
    Ok(Json(account.into()))
}

/// `PUT /user/{id}`: update a profile (self or admin).
#[utoipa::path(
    put,
    path = "/user/{id}",
    params(("id" = String, Path, description = "Account id")),
    request_body = UpdateAccountRequest,
    responses(
        (status = 200, description = "Updated account; a new email stays pending until verified", body = AccountView),
        (status = 400, description = "Invalid input", body = ErrorResponse),
        (status = 403, description = "Someone else's account", body = ErrorResponse),
        (status = 404, description = "Unknown account", body = ErrorResponse),
        (status = 409, description = "Email already registered", body = ErrorResponse)
    ),
    security(("bearer" = []), ("session_cookie" = [])),
    tag = "users"
)]
pub async fn update_handler(
    State(state): State<AppState>,
    AuthenticatedUser(actor): AuthenticatedUser,
    Path(id): Path<String>,
    payload: Result<Json<UpdateAccountRequest>, JsonRejection>,
) -> AppResult<Json<AccountView>> {
    let Json(body) = payload?;
    let account = users::update(
        state.store.as_ref(),
        &state.mailer,
        &state.config.frontend_url,
        &actor,
        &id,
        body,
    )
    .await?;
    Ok(Json(account.into()))
}

/// `DELETE /user/{id}`: delete an account (admin).
#[utoipa::path(
    delete,
    path = "/user/{id}",
    params(("id" = String, Path, description = "Account id")),
    responses(
        (status = 200, description = "Account deleted", body = MessageResponse),
        (status = 403, description = "Not an admin", body = ErrorResponse),
        (status = 404, description = "Unknown account", body = ErrorResponse)
    ),
    security(("bearer" = []), ("session_cookie" = [])),
    tag = "users"
)]
pub async fn delete_handler(
    State(state): State<AppState>,
    AdminUser(actor): AdminUser,
    Path(id): Path<String>,
) -> AppResult<Json<MessageResponse>> {
    users::delete(state.store.as_ref(), &actor, &id).await?;
    Ok(Json(MessageResponse::new("Account deleted")))
}
