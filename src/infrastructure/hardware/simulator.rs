//! Simulated charging station
//!
//! Reproduces a client-side charging countdown: power ramps up to the
//! station rating, tapers as the vehicle approaches its target energy and
//! reports `Finished` once the target is reached. Faults can be injected
//! for tests (refuse start, refuse stop, stall telemetry).

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use dashmap::DashMap;
use futures_util::stream;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::config::SimulatorConfig;
use crate::domain::ports::hardware::{StationHardware, TelemetryFrame, TelemetryStream};
use crate::domain::session::HardwareStatus;
use crate::domain::{ChargeError, DomainResult};

/// Seconds spent ramping from zero to full power
const RAMP_SECS: f64 = 10.0;
/// Fraction of the target after which power tapers
const TAPER_FROM: f64 = 0.8;
/// Nominal phase voltage used to turn a current limit into power
const NOMINAL_VOLTAGE: f64 = 230.0;

#[derive(Debug, Clone)]
struct SimState {
    running: bool,
    max_power_kw: f64,
    energy_kwh: f64,
    power_kw: f64,
    elapsed_secs: f64,
    status: HardwareStatus,
}

struct SimStation {
    state: Mutex<SimState>,
    sender: broadcast::Sender<TelemetryFrame>,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl SimStation {
    fn new(max_power_kw: f64) -> Self {
        let (sender, _) = broadcast::channel(256);
        Self {
            state: Mutex::new(SimState {
                running: false,
                max_power_kw,
                energy_kwh: 0.0,
                power_kw: 0.0,
                elapsed_secs: 0.0,
                status: HardwareStatus::Idle,
            }),
            sender,
            task: Mutex::new(None),
        }
    }

    fn frame(&self) -> TelemetryFrame {
        match self.state.lock() {
            Ok(s) => TelemetryFrame {
                power_kw: s.power_kw,
                energy_kwh: s.energy_kwh,
                elapsed_secs: s.elapsed_secs as u64,
                state: s.status,
                at: Utc::now(),
            },
            Err(_) => TelemetryFrame::idle(),
        }
    }
}

pub struct StationSimulator {
    config: SimulatorConfig,
    stations: DashMap<String, Arc<SimStation>>,
    refuse_start: AtomicBool,
    refuse_stop: AtomicBool,
    stall_telemetry: Arc<AtomicBool>,
}

impl StationSimulator {
    pub fn new(config: SimulatorConfig) -> Self {
        Self {
            config,
            stations: DashMap::new(),
            refuse_start: AtomicBool::new(false),
            refuse_stop: AtomicBool::new(false),
            stall_telemetry: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Set the power rating for a station (defaults to `default_power_kw`).
    pub fn register_station(&self, station_id: &str, max_power_kw: f64) {
        let station = self.station(station_id);
        if let Ok(mut s) = station.state.lock() {
            s.max_power_kw = max_power_kw;
        };
    }

    pub fn set_refuse_start(&self, on: bool) {
        self.refuse_start.store(on, Ordering::SeqCst);
    }

    pub fn set_refuse_stop(&self, on: bool) {
        self.refuse_stop.store(on, Ordering::SeqCst);
    }

    /// Keep charging but stop publishing telemetry.
    pub fn set_stall_telemetry(&self, on: bool) {
        self.stall_telemetry.store(on, Ordering::SeqCst);
    }

    fn station(&self, station_id: &str) -> Arc<SimStation> {
        self.stations
            .entry(station_id.to_string())
            .or_insert_with(|| Arc::new(SimStation::new(self.config.default_power_kw)))
            .clone()
    }

    fn spawn_ticker(&self, station_id: String, station: Arc<SimStation>) -> JoinHandle<()> {
        let tick = Duration::from_millis(self.config.tick_interval_ms);
        let dt = tick.as_secs_f64() * self.config.time_scale;
        let target = self.config.target_energy_kwh;
        let stall = self.stall_telemetry.clone();

        tokio::spawn(async move {
            let mut interval = tokio::time::interval(tick);
            interval.tick().await;
            loop {
                interval.tick().await;
                let finished = match station.state.lock() {
                    Ok(mut s) => {
                        if !s.running {
                            break;
                        }
                        advance(&mut s, dt, target);
                        s.status == HardwareStatus::Finished
                    }
                    Err(_) => break,
                };

                if !stall.load(Ordering::SeqCst) {
                    let _ = station.sender.send(station.frame());
                }
                if finished {
                    info!(station_id = %station_id, "Simulated vehicle reached target energy");
                    if let Ok(mut s) = station.state.lock() {
                        s.running = false;
                    }
                    break;
                }
            }
            debug!(station_id = %station_id, "Simulator ticker stopped");
        })
    }
}

/// One simulation step of `dt` seconds.
fn advance(s: &mut SimState, dt: f64, target_kwh: f64) {
    s.elapsed_secs += dt;
    let ramp = (s.elapsed_secs / RAMP_SECS).min(1.0);
    let mut power = s.max_power_kw * ramp;

    let taper_start = target_kwh * TAPER_FROM;
    if s.energy_kwh > taper_start {
        let remaining = ((target_kwh - s.energy_kwh) / (target_kwh - taper_start)).max(0.0);
        power = (power * remaining).max(s.max_power_kw.min(1.0));
    }

    s.energy_kwh = (s.energy_kwh + power * dt / 3600.0).min(target_kwh);
    s.power_kw = power;
    s.status = HardwareStatus::Charging;

    if s.energy_kwh >= target_kwh {
        s.power_kw = 0.0;
        s.status = HardwareStatus::Finished;
    }
}

#[async_trait]
impl StationHardware for StationSimulator {
    async fn start(&self, station_id: &str, current_limit_a: f64) -> DomainResult<()> {
        if self.refuse_start.load(Ordering::SeqCst) {
            return Err(ChargeError::HardwareStartFailed {
                station_id: station_id.to_string(),
                reason: "station refused start command".to_string(),
            });
        }

        let station = self.station(station_id);
        {
            let mut s = station
                .state
                .lock()
                .map_err(|_| ChargeError::HardwareStartFailed {
                    station_id: station_id.to_string(),
                    reason: "simulator state poisoned".to_string(),
                })?;
            if s.running {
                return Err(ChargeError::HardwareStartFailed {
                    station_id: station_id.to_string(),
                    reason: "station is already charging".to_string(),
                });
            }
            // Cap power by the requested current on a single phase
            let limit_kw = current_limit_a * NOMINAL_VOLTAGE / 1000.0;
            if limit_kw > 0.0 && limit_kw < s.max_power_kw {
                s.max_power_kw = limit_kw;
            }
            s.running = true;
            s.energy_kwh = 0.0;
            s.power_kw = 0.0;
            s.elapsed_secs = 0.0;
            s.status = HardwareStatus::Charging;
        }

        let handle = self.spawn_ticker(station_id.to_string(), station.clone());
        if let Ok(mut task) = station.task.lock() {
            if let Some(old) = task.replace(handle) {
                old.abort();
            }
        }
        info!(station_id, current_limit_a, "Simulated charging started");
        Ok(())
    }

    async fn stop(&self, station_id: &str) -> DomainResult<()> {
        if self.refuse_stop.load(Ordering::SeqCst) {
            return Err(ChargeError::HardwareStopFailed {
                station_id: station_id.to_string(),
                reason: "station did not acknowledge stop".to_string(),
            });
        }
        let station = self.station(station_id);
        if let Ok(mut task) = station.task.lock() {
            if let Some(handle) = task.take() {
                handle.abort();
            }
        }
        if let Ok(mut s) = station.state.lock() {
            s.running = false;
            s.power_kw = 0.0;
            if s.status != HardwareStatus::Finished {
                s.status = HardwareStatus::Idle;
            }
        }
        info!(station_id, "Simulated charging stopped");
        Ok(())
    }

    async fn status(&self, station_id: &str) -> DomainResult<TelemetryFrame> {
        Ok(self.station(station_id).frame())
    }

    async fn telemetry(&self, station_id: &str) -> DomainResult<TelemetryStream> {
        let receiver = self.station(station_id).sender.subscribe();
        let stream = stream::unfold(receiver, |mut rx| async move {
            loop {
                match rx.recv().await {
                    Ok(frame) => return Some((frame, rx)),
                    Err(broadcast::error::RecvError::Lagged(_)) => continue,
                    Err(broadcast::error::RecvError::Closed) => return None,
                }
            }
        });
        Ok(Box::pin(stream))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures_util::StreamExt;

    fn fast_config() -> SimulatorConfig {
        SimulatorConfig {
            tick_interval_ms: 1000,
            time_scale: 600.0,
            target_energy_kwh: 5.0,
            default_power_kw: 7.4,
        }
    }

    #[test]
    fn advance_ramps_then_finishes() {
        let mut s = SimState {
            running: true,
            max_power_kw: 10.0,
            energy_kwh: 0.0,
            power_kw: 0.0,
            elapsed_secs: 0.0,
            status: HardwareStatus::Idle,
        };
        advance(&mut s, 5.0, 1.0);
        assert!((s.power_kw - 5.0).abs() < 1e-9);
        for _ in 0..10_000 {
            if s.status == HardwareStatus::Finished {
                break;
            }
            advance(&mut s, 5.0, 1.0);
        }
        assert_eq!(s.status, HardwareStatus::Finished);
        assert_eq!(s.energy_kwh, 1.0);
        assert_eq!(s.power_kw, 0.0);
    }

    #[tokio::test(start_paused = true)]
    async fn telemetry_reaches_finished() {
        let sim = StationSimulator::new(fast_config());
        let mut frames = sim.telemetry("st-1").await.unwrap();
        sim.start("st-1", 32.0).await.unwrap();

        let mut last_energy = 0.0;
        let mut finished = false;
        while let Some(frame) = frames.next().await {
            assert!(frame.energy_kwh >= last_energy);
            last_energy = frame.energy_kwh;
            if frame.state == HardwareStatus::Finished {
                finished = true;
                break;
            }
        }
        assert!(finished);
        assert_eq!(sim.status("st-1").await.unwrap().energy_kwh, 5.0);
    }

    #[tokio::test]
    async fn injected_faults() {
        let sim = StationSimulator::new(fast_config());
        sim.set_refuse_start(true);
        assert!(matches!(
            sim.start("st-1", 16.0).await,
            Err(ChargeError::HardwareStartFailed { .. })
        ));
        sim.set_refuse_start(false);
        sim.start("st-1", 16.0).await.unwrap();

        sim.set_refuse_stop(true);
        assert!(matches!(
            sim.stop("st-1").await,
            Err(ChargeError::HardwareStopFailed { .. })
        ));
        sim.set_refuse_stop(false);
        sim.stop("st-1").await.unwrap();
    }
}
