use axum::{extract::State, Json};
use service_core::error::AppError;

use crate::{
    dtos::{ErrorResponse, HealthResponse},
    AppState,
};

/// Liveness of the service and its stores
#[utoipa::path(
    get,
    path = "/health",
    responses(
        (status = 200, description = "Service is healthy", body = HealthResponse),
        (status = 503, description = "Postgres or Redis is unreachable", body = ErrorResponse)
    ),
    tag = "Observability"
)]
pub async fn health_check(State(state): State<AppState>) -> Result<Json<HealthResponse>, AppError> {
    if let Some(database) = &state.database {
        database.health_check().await.map_err(|e| {
            tracing::error!(error = %e, "Postgres health check failed");
            AppError::ServiceUnavailable
        })?;
    }

    state.kv.health_check().await.map_err(|e| {
        tracing::error!(error = %e, "Redis health check failed");
        AppError::ServiceUnavailable
    })?;

    Ok(Json(HealthResponse {
        status: "healthy".to_string(),
        service: state.config.service_name.clone(),
        version: state.config.service_version.clone(),
    }))
}
