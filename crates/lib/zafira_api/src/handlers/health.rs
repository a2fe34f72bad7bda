//! Liveness check.

use axum::Json;
use axum::extract::State;
use tracing::warn;

use crate::AppState;
use crate::error::{AppError, AppResult};
use crate::models::{ErrorResponse, HealthResponse};

/// `GET /health`: 200 when the credential store answers.
#[utoipa::path(
    get,
    path = "/health",
    responses(
        (status = 200, description = "Credential store reachable", body = HealthResponse),
        (status = 503, description = "Credential store unreachable", body = ErrorResponse)
    ),
    tag = "health"
)]
pub async fn health_handler(State(state): State<AppState>) -> AppResult<Json<HealthResponse>> {
    if let Err(e) = state.store.ping().await {
        warn!(error = %e, "credential store unreachable");
        return Err(AppError::Unavailable("Credential store unreachable".into()));
    }
    Ok(Json(HealthResponse {
        status: "ok".into(),
    }))
}
