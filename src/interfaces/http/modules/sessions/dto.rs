use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use validator::Validate;

use crate::application::LiveView;
use crate::domain::ChargingSession;

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct StartSessionRequest {
    #[validate(length(min = 1, max = 64, message = "station id is required"))]
    pub station_id: String,
    /// Saved card to charge; the default card when absent
    #[validate(length(min = 1, max = 128))]
    pub payment_method_id: Option<String>,
    /// Amount to hold, in minor units; estimated from the station when absent
    #[validate(range(min = 1, message = "must be positive"))]
    pub estimated_cost: Option<i64>,
    #[validate(range(min = 6.0, max = 80.0, message = "must be between 6 and 80 A"))]
    pub current_limit_a: Option<f64>,
}

/// Charging session as shown to the driver
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct SessionResponse {
    pub id: String,
    pub station_id: String,
    /// authorized | active | completing | completed | cancelled | error
    pub status: String,
    pub currency: String,
    pub price_per_kwh: String,
    pub authorized_amount: i64,
    pub final_amount: Option<i64>,
    pub energy_delivered_kwh: f64,
    pub current_power_kw: f64,
    /// Running cost of the energy so far; display only
    pub live_cost: i64,
    pub elapsed_secs: i64,
    pub hardware_status: String,
    pub started_at: Option<DateTime<Utc>>,
    pub ended_at: Option<DateTime<Utc>>,
    pub last_heartbeat: Option<DateTime<Utc>>,
    pub error_message: Option<String>,
    pub monitored: bool,
    pub created_at: DateTime<Utc>,
}

impl SessionResponse {
    pub fn from_session(session: ChargingSession, monitored: bool) -> Self {
        let live_cost = session.live_cost();
        let elapsed_secs = session.elapsed_secs(Utc::now());
        Self {
            live_cost,
            elapsed_secs,
            monitored,
            id: session.id,
            station_id: session.station_id,
            status: session.status.as_str().to_string(),
            currency: session.currency,
            price_per_kwh: session.price_per_kwh.normalize().to_string(),
            authorized_amount: session.authorized_amount,
            final_amount: session.final_amount,
            energy_delivered_kwh: session.energy_delivered_kwh,
            current_power_kw: session.current_power_kw,
            hardware_status: session.hardware_status.as_str().to_string(),
            started_at: session.started_at,
            ended_at: session.ended_at,
            last_heartbeat: session.last_heartbeat,
            error_message: session.error_message,
            created_at: session.created_at,
        }
    }
}

impl From<LiveView> for SessionResponse {
    fn from(view: LiveView) -> Self {
        let mut response = Self::from_session(view.session, view.monitored);
        response.live_cost = view.live_cost;
        response.elapsed_secs = view.elapsed_secs;
        response
    }
}
