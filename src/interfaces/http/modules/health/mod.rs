//! Health check endpoint

use axum::extract::State;
use axum::Json;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::interfaces::http::router::ApiState;

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct HealthResponse {
    /// `ok` while the service is serving
    pub status: String,
    pub version: String,
    pub uptime_seconds: u64,
    /// Sessions monitored by this process
    pub live_sessions: usize,
    pub payment_processor: String,
}

#[utoipa::path(
    get,
    path = "/health",
    tag = "Health",
    responses(
        (status = 200, description = "Service is up", body = HealthResponse)
    )
)]
pub async fn health_check(State(state): State<ApiState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        uptime_seconds: state.started_at.elapsed().as_secs(),
        live_sessions: state.coordinator.live_count(),
        payment_processor: state.gateway.processor_name().to_string(),
    })
}
