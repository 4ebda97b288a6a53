use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use validator::Validate;

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct EstimateRequest {
    #[validate(length(min = 1, max = 64, message = "station id is required"))]
    pub station_id: String,
    /// Energy the driver expects to draw; the service default when absent
    #[validate(range(min = 0.1, max = 500.0, message = "must be between 0.1 and 500 kWh"))]
    pub energy_kwh: Option<f64>,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct EstimateResponse {
    pub station_id: String,
    pub currency: String,
    /// Minor units per kWh, decimal string
    pub price_per_kwh: String,
    pub max_power_kw: f64,
    pub energy_kwh: f64,
    /// Minor units
    pub estimated_cost: i64,
    pub estimated_cost_display: String,
    pub estimated_duration_minutes: i64,
}
