//! Health check endpoint

use axum::Json;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use serde::Serialize;

use super::topics::TopicsApiState;

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub backend: &'static str,
    pub version: &'static str,
}

/// Health check endpoint
pub async fn health(State(state): State<TopicsApiState>) -> impl IntoResponse {
    let (status_code, status) = match state.topics.health_check().await {
        Ok(()) => (StatusCode::OK, "ok"),
        Err(e) => {
            tracing::error!(error = %e, "health check failed");
            (StatusCode::SERVICE_UNAVAILABLE, "degraded")
        }
    };
    (
        status_code,
        Json(HealthResponse {
            status,
            backend: state.topics.backend_name(),
            version: env!("CARGO_PKG_VERSION"),
        }),
    )
}
