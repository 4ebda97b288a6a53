//! Shared HTTP building blocks

pub mod validated_json;

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::{Deserialize, Serialize};
use tracing::error;
use utoipa::ToSchema;

use crate::application::SessionFailure;
use crate::domain::ChargeError;

pub use validated_json::ValidatedJson;

/// Standard API response envelope
///
/// Success: `{"success": true, "data": {...}}`,
/// failure: `{"success": false, "data": null, "error": "..."}`.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ApiResponse<T> {
    pub success: bool,
    pub data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl<T> ApiResponse<T> {
    pub fn success(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(message.into()),
        }
    }
}

/// Empty response for operations without return data
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct EmptyData {}

/// Handler error: a status code plus the message put in the envelope
#[derive(Debug)]
pub struct ApiError {
    pub status: StatusCode,
    pub message: String,
}

pub type ApiResult<T> = Result<Json<ApiResponse<T>>, ApiError>;

impl ApiError {
    pub fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
        }
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, message)
    }
}

pub fn status_for(err: &ChargeError) -> StatusCode {
    match err {
        ChargeError::InvalidArgument(_) => StatusCode::BAD_REQUEST,
        ChargeError::InvalidAmount { .. } => StatusCode::UNPROCESSABLE_ENTITY,
        ChargeError::NotFound { .. } => StatusCode::NOT_FOUND,
        ChargeError::StationUnavailable { .. } | ChargeError::InvalidState(_) => {
            StatusCode::CONFLICT
        }
        ChargeError::Gateway { .. } => StatusCode::BAD_GATEWAY,
        ChargeError::HardwareStartFailed { .. } | ChargeError::HardwareStopFailed { .. } => {
            StatusCode::SERVICE_UNAVAILABLE
        }
        ChargeError::Persistence(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl From<ChargeError> for ApiError {
    fn from(err: ChargeError) -> Self {
        let status = status_for(&err);
        if status.is_server_error() {
            error!(code = err.code(), error = %err, "Request failed");
        }
        Self::new(status, err.to_string())
    }
}

impl From<SessionFailure> for ApiError {
    fn from(failure: SessionFailure) -> Self {
        let status = status_for(&failure.source);
        if status.is_server_error() {
            error!(session_id = %failure.session_id, error = %failure, "Session request failed");
        }
        Self::new(status, failure.to_string())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(ApiResponse::<()>::error(self.message))).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn taxonomy_maps_to_statuses() {
        assert_eq!(
            status_for(&ChargeError::InvalidArgument("x".into())),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            status_for(&ChargeError::InvalidAmount { amount: 10, minimum: 50 }),
            StatusCode::UNPROCESSABLE_ENTITY
        );
        assert_eq!(
            status_for(&ChargeError::not_found("Session", "id", "s")),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            status_for(&ChargeError::InvalidState("x".into())),
            StatusCode::CONFLICT
        );
        assert_eq!(
            status_for(&ChargeError::gateway("capture", "declined")),
            StatusCode::BAD_GATEWAY
        );
        assert_eq!(
            status_for(&ChargeError::HardwareStartFailed {
                station_id: "st".into(),
                reason: "x".into()
            }),
            StatusCode::SERVICE_UNAVAILABLE
        );
        assert_eq!(
            status_for(&ChargeError::Persistence("db".into())),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn envelope_omits_error_on_success() {
        let json = serde_json::to_value(ApiResponse::success(5)).unwrap();
        assert_eq!(json, serde_json::json!({"success": true, "data": 5}));
    }
}
