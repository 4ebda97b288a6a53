//! Station hardware port
//!
//! A simulator and a real station driver implement the same capability
//! set: start, stop, status and a live telemetry stream.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures_util::stream::BoxStream;
use serde::{Deserialize, Serialize};

use crate::domain::session::HardwareStatus;
use crate::shared::errors::DomainResult;

/// One telemetry tick: `{power, energy, elapsedTime, state}`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TelemetryFrame {
    /// Instantaneous power (kW)
    #[serde(rename = "power")]
    pub power_kw: f64,
    /// Cumulative energy since start (kWh)
    #[serde(rename = "energy")]
    pub energy_kwh: f64,
    #[serde(rename = "elapsedTime")]
    pub elapsed_secs: u64,
    pub state: HardwareStatus,
    #[serde(default = "Utc::now", skip_serializing)]
    pub at: DateTime<Utc>,
}

impl TelemetryFrame {
    pub fn idle() -> Self {
        Self {
            power_kw: 0.0,
            energy_kwh: 0.0,
            elapsed_secs: 0,
            state: HardwareStatus::Idle,
            at: Utc::now(),
        }
    }
}

pub type TelemetryStream = BoxStream<'static, TelemetryFrame>;

#[async_trait]
pub trait StationHardware: Send + Sync {
    /// Begin charging. Errors map to `HardwareStartFailed`.
    async fn start(&self, station_id: &str, current_limit_a: f64) -> DomainResult<()>;

    /// Stop charging. Errors map to `HardwareStopFailed`.
    async fn stop(&self, station_id: &str) -> DomainResult<()>;

    async fn status(&self, station_id: &str) -> DomainResult<TelemetryFrame>;

    /// Live telemetry for `station_id`. The stream ends when the driver
    /// loses the channel.
    async fn telemetry(&self, station_id: &str) -> DomainResult<TelemetryStream>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn frame_uses_wire_names() {
        let frame: TelemetryFrame = serde_json::from_str(
            r#"{"power": 7.2, "energy": 3.5, "elapsedTime": 1800, "state": "charging"}"#,
        )
        .unwrap();
        assert_eq!(frame.power_kw, 7.2);
        assert_eq!(frame.energy_kwh, 3.5);
        assert_eq!(frame.elapsed_secs, 1800);
        assert_eq!(frame.state, HardwareStatus::Charging);
    }

    #[test]
    fn unknown_state_is_tolerated() {
        let frame: TelemetryFrame = serde_json::from_str(
            r#"{"power": 0, "energy": 0, "elapsedTime": 0, "state": "preparing"}"#,
        )
        .unwrap();
        assert_eq!(frame.state, HardwareStatus::Unknown);
    }
}
