//! Station hardware drivers
//!
//! `StationSimulator` and `RemoteStationDriver` are interchangeable
//! implementations of the `StationHardware` port.

pub mod remote;
pub mod simulator;

pub use remote::RemoteStationDriver;
pub use simulator::StationSimulator;

use std::sync::Arc;

use tracing::info;

use crate::config::{HardwareConfig, HardwareDriver};
use crate::domain::ports::StationHardware;
use crate::domain::{DomainResult, Station};

/// Build the configured driver. The simulator takes each known station's
/// power rating; the remote driver asks the station itself.
pub fn build_hardware(
    cfg: &HardwareConfig,
    stations: &[Station],
) -> DomainResult<Arc<dyn StationHardware>> {
    let driver: Arc<dyn StationHardware> = match cfg.driver {
        HardwareDriver::Simulator => {
            let simulator = StationSimulator::new(cfg.simulator.clone());
            for station in stations.iter().filter(|s| s.max_power_kw > 0.0) {
                simulator.register_station(&station.id, station.max_power_kw);
            }
            Arc::new(simulator)
        }
        HardwareDriver::Remote => Arc::new(RemoteStationDriver::new(cfg)?),
    };
    info!(driver = ?cfg.driver, stations = stations.len(), "Station hardware driver configured");
    Ok(driver)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use futures_util::StreamExt;
    use rust_decimal::Decimal;

    use crate::config::SimulatorConfig;
    use crate::domain::StationStatus;

    fn station(id: &str, max_power_kw: f64) -> Station {
        Station {
            id: id.into(),
            name: "Depot".into(),
            owner_id: "owner-1".into(),
            latitude: 0.0,
            longitude: 0.0,
            address: "Quay 4".into(),
            status: StationStatus::Available,
            max_power_kw,
            price_per_kwh: Decimal::from(28),
            currency: "usd".into(),
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn simulator_charges_at_each_station_rating() {
        let cfg = HardwareConfig {
            driver: HardwareDriver::Simulator,
            simulator: SimulatorConfig {
                tick_interval_ms: 1000,
                time_scale: 600.0,
                target_energy_kwh: 50.0,
                default_power_kw: 7.4,
            },
            ..Default::default()
        };
        let hardware = build_hardware(&cfg, &[station("st-fast", 22.0)]).unwrap();

        let mut fast = hardware.telemetry("st-fast").await.unwrap();
        let mut unknown = hardware.telemetry("st-other").await.unwrap();
        hardware.start("st-fast", 0.0).await.unwrap();
        hardware.start("st-other", 0.0).await.unwrap();

        assert_eq!(fast.next().await.unwrap().power_kw, 22.0);
        assert_eq!(unknown.next().await.unwrap().power_kw, 7.4);
    }
}
