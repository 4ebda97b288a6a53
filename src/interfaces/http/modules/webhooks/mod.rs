//! Payment processor webhook endpoint
//!
//! Unauthenticated: deliveries are verified by signature instead of JWT.

use axum::{body::Bytes, extract::State, http::HeaderMap, Json};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::application::WebhookOutcome;
use crate::interfaces::http::common::{ApiResponse, ApiResult};
use crate::interfaces::http::router::ApiState;

pub const SIGNATURE_HEADER: &str = "stripe-signature";

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct WebhookAck {
    /// processed | duplicate | ignored
    pub outcome: String,
}

impl From<WebhookOutcome> for WebhookAck {
    fn from(outcome: WebhookOutcome) -> Self {
        let outcome = match outcome {
            WebhookOutcome::Processed => "processed",
            WebhookOutcome::Duplicate => "duplicate",
            WebhookOutcome::Ignored => "ignored",
        };
        Self {
            outcome: outcome.to_string(),
        }
    }
}

#[utoipa::path(
    post,
    path = "/api/v1/webhooks/payments",
    tag = "Webhooks",
    request_body(content = String, description = "Raw processor event JSON", content_type = "application/json"),
    responses(
        (status = 200, description = "Event accepted", body = ApiResponse<WebhookAck>),
        (status = 400, description = "Bad signature or payload")
    )
)]
pub async fn payment_webhook(
    State(state): State<ApiState>,
    headers: HeaderMap,
    body: Bytes,
) -> ApiResult<WebhookAck> {
    let signature = headers
        .get(SIGNATURE_HEADER)
        .and_then(|v| v.to_str().ok());
    let outcome = state.webhooks.handle(signature, &body).await?;
    Ok(Json(ApiResponse::success(outcome.into())))
}
