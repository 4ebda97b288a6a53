//! Session REST API handlers

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};

use super::dto::{SessionResponse, StartSessionRequest};
use crate::application::{LiveView, StartRequest};
use crate::domain::ChargeError;
use crate::interfaces::http::common::{ApiError, ApiResponse, ApiResult, ValidatedJson};
use crate::interfaces::http::middleware::CurrentUser;
use crate::interfaces::http::modules::{PaginatedResponse, PaginationParams};
use crate::interfaces::http::router::ApiState;

/// Sessions belonging to someone else look exactly like missing ones.
async fn owned_view(state: &ApiState, user: &CurrentUser, id: &str) -> Result<LiveView, ApiError> {
    let view = state.coordinator.live_view(id).await?;
    if view.session.user_id != user.user_id {
        return Err(ChargeError::not_found("Session", "id", id).into());
    }
    Ok(view)
}

#[utoipa::path(
    post,
    path = "/api/v1/sessions",
    tag = "Sessions",
    security(("bearer_auth" = [])),
    request_body = StartSessionRequest,
    responses(
        (status = 201, description = "Charging started", body = ApiResponse<SessionResponse>),
        (status = 404, description = "Unknown station"),
        (status = 409, description = "Station unavailable"),
        (status = 422, description = "Amount below minimum or validation failed"),
        (status = 502, description = "Payment processor rejected the hold"),
        (status = 503, description = "Station did not start; hold released")
    )
)]
pub async fn start_session(
    State(state): State<ApiState>,
    user: CurrentUser,
    ValidatedJson(req): ValidatedJson<StartSessionRequest>,
) -> Result<(StatusCode, Json<ApiResponse<SessionResponse>>), ApiError> {
    let session = state
        .coordinator
        .start_session(StartRequest {
            user_id: user.user_id,
            email: user.email,
            station_id: req.station_id,
            payment_method_id: req.payment_method_id,
            estimated_cost: req.estimated_cost,
            current_limit_a: req.current_limit_a,
        })
        .await?;
    Ok((
        StatusCode::CREATED,
        Json(ApiResponse::success(SessionResponse::from_session(session, true))),
    ))
}

#[utoipa::path(
    get,
    path = "/api/v1/sessions",
    tag = "Sessions",
    security(("bearer_auth" = [])),
    params(PaginationParams),
    responses(
        (status = 200, description = "The caller's sessions, newest first", body = ApiResponse<PaginatedResponse<SessionResponse>>)
    )
)]
pub async fn list_sessions(
    State(state): State<ApiState>,
    user: CurrentUser,
    Query(params): Query<PaginationParams>,
) -> ApiResult<PaginatedResponse<SessionResponse>> {
    let mut sessions = state.store.user_sessions(&user.user_id).await?;
    sessions.sort_by_key(|s| std::cmp::Reverse(s.created_at));
    let items = sessions
        .into_iter()
        .map(|s| {
            let monitored = state.coordinator.is_live(&s.id);
            SessionResponse::from_session(s, monitored)
        })
        .collect();
    Ok(Json(ApiResponse::success(PaginatedResponse::paginate(items, &params))))
}

#[utoipa::path(
    get,
    path = "/api/v1/sessions/{id}",
    tag = "Sessions",
    security(("bearer_auth" = [])),
    params(("id" = String, Path, description = "Session ID")),
    responses(
        (status = 200, description = "Live session snapshot", body = ApiResponse<SessionResponse>),
        (status = 404, description = "Not found")
    )
)]
pub async fn get_session(
    State(state): State<ApiState>,
    user: CurrentUser,
    Path(id): Path<String>,
) -> ApiResult<SessionResponse> {
    let view = owned_view(&state, &user, &id).await?;
    Ok(Json(ApiResponse::success(view.into())))
}

#[utoipa::path(
    post,
    path = "/api/v1/sessions/{id}/stop",
    tag = "Sessions",
    security(("bearer_auth" = [])),
    params(("id" = String, Path, description = "Session ID")),
    responses(
        (status = 200, description = "Charging stopped and payment settled", body = ApiResponse<SessionResponse>),
        (status = 404, description = "Not found"),
        (status = 502, description = "Capture failed; session needs review"),
        (status = 503, description = "Station did not stop; session degraded")
    )
)]
pub async fn stop_session(
    State(state): State<ApiState>,
    user: CurrentUser,
    Path(id): Path<String>,
) -> ApiResult<SessionResponse> {
    owned_view(&state, &user, &id).await?;
    let session = state.coordinator.stop_session(&id).await?;
    Ok(Json(ApiResponse::success(SessionResponse::from_session(session, false))))
}

#[utoipa::path(
    post,
    path = "/api/v1/sessions/{id}/cancel",
    tag = "Sessions",
    security(("bearer_auth" = [])),
    params(("id" = String, Path, description = "Session ID")),
    responses(
        (status = 200, description = "Authorization released", body = ApiResponse<SessionResponse>),
        (status = 404, description = "Not found"),
        (status = 409, description = "Session already started")
    )
)]
pub async fn cancel_session(
    State(state): State<ApiState>,
    user: CurrentUser,
    Path(id): Path<String>,
) -> ApiResult<SessionResponse> {
    owned_view(&state, &user, &id).await?;
    let session = state.coordinator.cancel_session(&id).await?;
    Ok(Json(ApiResponse::success(SessionResponse::from_session(session, false))))
}
