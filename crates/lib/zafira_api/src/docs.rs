//! OpenAPI document and the Swagger UI served under `{prefix}/docs`.

use axum::Router;
use utoipa::openapi::security::{ApiKey, ApiKeyValue, HttpAuthScheme, HttpBuilder, SecurityScheme};
use utoipa::openapi::{OpenApi as OpenApiDoc, Server};
use utoipa::{Modify, OpenApi};
use utoipa_swagger_ui::SwaggerUi;

use crate::AppState;
use crate::handlers::{auth, health, oauth, users};
use crate::models::{
    AccountResponse, AccountView, ErrorResponse, HealthResponse, LoginRequest, LoginResponse,
    MeResponse, MessageResponse, RegisterRequest, ResendVerificationRequest, UpdateAccountRequest,
};
use crate::services::cookies::SESSION_COOKIE;

#[derive(OpenApi)]
#[openapi(
    info(
        title = "Zafira Solidaire API",
        description = "Registration, e-mail verification, login and account administration",
        version = "1.0"
    ),
    paths(
        auth::register_handler,
        auth::verify_email_handler,
        auth::resend_verification_handler,
        auth::login_handler,
        auth::me_handler,
        auth::logout_handler,
        oauth::google_start_handler,
        oauth::google_callback_handler,
        users::list_handler,
        users::get_handler,
        users::update_handler,
        users::delete_handler,
        health::health_handler,
    ),
    components(schemas(
        AccountResponse,
        AccountView,
        ErrorResponse,
        HealthResponse,
        LoginRequest,
        LoginResponse,
        MeResponse,
        MessageResponse,
        RegisterRequest,
        ResendVerificationRequest,
        UpdateAccountRequest,
    )),
    modifiers(&SessionSecurity),
    tags(
        (name = "auth", description = "Registration, verification and sessions"),
        (name = "users", description = "Account administration"),
        (name = "health", description = "Liveness"),
    )
)]
struct ApiDoc;

/// Registers the two ways a session token is presented.
struct SessionSecurity;

impl Modify for SessionSecurity {
    fn modify(&self, openapi: &mut OpenApiDoc) {
        let components = openapi.components.get_or_insert_with(Default::default);
        components.add_security_scheme(
            "bearer",
            SecurityScheme::Http(
                HttpBuilder::new()
                    .scheme(HttpAuthScheme::Bearer)
                    .bearer_format("JWT")
                    .build(),
            ),
        );
        components.add_security_scheme(
            "session_cookie",
            SecurityScheme::ApiKey(ApiKey::Cookie(ApiKeyValue::new(SESSION_COOKIE))),
        );
    }
}

/// The OpenAPI document, with paths relative to `prefix` (e.g. `/api`).
#[must_use]
pub fn openapi(prefix: Option<&str>) -> OpenApiDoc {
    let mut doc = ApiDoc::openapi();
    doc.servers = Some(vec![Server::new(prefix.unwrap_or("/"))]);
    doc
}

/// Swagger UI at `{prefix}/docs`, JSON document at `{prefix}/docs-json`.
pub fn docs_router(prefix: Option<&str>) -> Router<AppState> {
    let base = prefix.unwrap_or("");
    SwaggerUi::new(format!("{base}/docs"))
        .url(format!("{base}/docs-json"), openapi(prefix))
        .into()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn document_lists_routes_relative_to_the_prefix() {
        let doc = serde_json::to_value(openapi(Some("/api"))).unwrap();
        assert_eq!(doc["servers"][0]["url"], "/api");
        assert!(doc["paths"]["/auth/login"]["post"].is_object());
        assert!(doc["paths"]["/user/{id}"]["put"].is_object());
        assert!(doc["paths"]["/user/{id}"]["delete"].is_object());
        assert!(doc["paths"]["/auth/google/callback"]["get"].is_object());
    }

    #[test]
    fn bearer_scheme_is_declared() {
        let doc = serde_json::to_value(openapi(None)).unwrap();
        let schemes = &doc["components"]["securitySchemes"];
        assert_eq!(schemes["bearer"]["scheme"], "bearer");
        assert_eq!(schemes["bearer"]["bearerFormat"], "JWT");
        assert_eq!(schemes["session_cookie"]["in"], "cookie");
        assert_eq!(schemes["session_cookie"]["name"], "auth_token");
        assert_eq!(doc["servers"][0]["url"], "/");
        assert_eq!(
            doc["paths"]["/auth/me"]["get"]["security"][0]["bearer"],
            serde_json::json!([])
        );
    }
}
