use axum::extract::State;
use axum::Json;

use super::dto::{EstimateRequest, EstimateResponse};
use crate::domain::pricing::estimate;
use crate::domain::ChargeError;
use crate::interfaces::http::common::{ApiResponse, ApiResult, ValidatedJson};
use crate::interfaces::http::middleware::CurrentUser;
use crate::interfaces::http::router::ApiState;
use crate::shared::types::money::format_minor_units;

/// Estimate the cost and duration of a session at a station
#[utoipa::path(
    post,
    path = "/api/v1/estimate",
    tag = "Sessions",
    security(("bearer_auth" = [])),
    request_body = EstimateRequest,
    responses(
        (status = 200, description = "Estimate", body = ApiResponse<EstimateResponse>),
        (status = 404, description = "Unknown station"),
        (status = 422, description = "Validation failed")
    )
)]
pub async fn estimate_session(
    State(state): State<ApiState>,
    _user: CurrentUser,
    ValidatedJson(req): ValidatedJson<EstimateRequest>,
) -> ApiResult<EstimateResponse> {
    let station = state
        .store
        .repos()
        .stations()
        .find_by_id(&req.station_id)
        .await?
        .ok_or_else(|| ChargeError::not_found("Station", "id", &req.station_id))?;

    let energy_kwh = req.energy_kwh.unwrap_or(state.assumed_energy_kwh);
    let result = estimate(station.max_power_kw, station.price_per_kwh, energy_kwh)?;

    Ok(Json(ApiResponse::success(EstimateResponse {
        estimated_cost_display: format_minor_units(result.estimated_cost, &station.currency),
        station_id: station.id,
        currency: station.currency,
        price_per_kwh: station.price_per_kwh.normalize().to_string(),
        max_power_kw: station.max_power_kw,
        energy_kwh,
        estimated_cost: result.estimated_cost,
        estimated_duration_minutes: result.estimated_duration_minutes,
    })))
}
