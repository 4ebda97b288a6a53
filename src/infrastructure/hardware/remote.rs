//! Remote station driver
//!
//! Commands go to the station gateway over HTTP; telemetry arrives as JSON
//! text frames on a per-station WebSocket.

use std::time::Duration;

use async_trait::async_trait;
use futures_util::{future, StreamExt};
use serde::Serialize;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, info, warn};

use crate::config::HardwareConfig;
use crate::domain::ports::hardware::{StationHardware, TelemetryFrame, TelemetryStream};
use crate::domain::{ChargeError, DomainResult};

pub struct RemoteStationDriver {
    client: reqwest::Client,
    api_base: String,
    ws_base: String,
    api_key: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct StartCommand {
    current_limit: f64,
}

impl RemoteStationDriver {
    pub fn new(cfg: &HardwareConfig) -> DomainResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(cfg.request_timeout_secs))
            .build()
            .map_err(|e| ChargeError::InvalidArgument(format!("hardware client: {}", e)))?;
        Ok(Self {
            client,
            api_base: cfg.api_base.trim_end_matches('/').to_string(),
            ws_base: cfg.ws_base.trim_end_matches('/').to_string(),
            api_key: cfg.api_key.clone(),
        })
    }

    fn url(&self, station_id: &str, action: &str) -> String {
        format!("{}/stations/{}/{}", self.api_base, station_id, action)
    }

    fn authorized(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        if self.api_key.is_empty() {
            request
        } else {
            request.bearer_auth(&self.api_key)
        }
    }

    /// Send a command and return the failure reason, if any.
    async fn command(&self, request: reqwest::RequestBuilder) -> Result<(), String> {
        let response = self
            .authorized(request)
            .send()
            .await
            .map_err(|e| e.to_string())?;
        let status = response.status();
        if status.is_success() {
            return Ok(());
        }
        let body = response.text().await.unwrap_or_default();
        Err(format!("{} {}", status, body.chars().take(200).collect::<String>()))
    }
}

fn parse_frame(message: Message) -> Option<TelemetryFrame> {
    match message {
        Message::Text(text) => match serde_json::from_str::<TelemetryFrame>(&text) {
            Ok(frame) => Some(frame),
            Err(e) => {
                warn!(error = %e, "Discarding malformed telemetry frame");
                None
            }
        },
        _ => None,
    }
}

#[async_trait]
impl StationHardware for RemoteStationDriver {
    async fn start(&self, station_id: &str, current_limit_a: f64) -> DomainResult<()> {
        let request = self
            .client
            .post(self.url(station_id, "start"))
            .json(&StartCommand {
                current_limit: current_limit_a,
            });
        self.command(request)
            .await
            .map_err(|reason| ChargeError::HardwareStartFailed {
                station_id: station_id.to_string(),
                reason,
            })?;
        info!(station_id, current_limit_a, "Remote start acknowledged");
        Ok(())
    }

    async fn stop(&self, station_id: &str) -> DomainResult<()> {
        let request = self.client.post(self.url(station_id, "stop"));
        self.command(request)
            .await
            .map_err(|reason| ChargeError::HardwareStopFailed {
                station_id: station_id.to_string(),
                reason,
            })?;
        info!(station_id, "Remote stop acknowledged");
        Ok(())
    }

    async fn status(&self, station_id: &str) -> DomainResult<TelemetryFrame> {
        let unavailable = |status: String| ChargeError::StationUnavailable {
            station_id: station_id.to_string(),
            status,
        };
        let response = self
            .authorized(self.client.get(self.url(station_id, "status")))
            .send()
            .await
            .map_err(|e| unavailable(e.to_string()))?;
        if !response.status().is_success() {
            return Err(unavailable(response.status().to_string()));
        }
        response
            .json::<TelemetryFrame>()
            .await
            .map_err(|e| unavailable(format!("bad status payload: {}", e)))
    }

    async fn telemetry(&self, station_id: &str) -> DomainResult<TelemetryStream> {
        let url = format!("{}/stations/{}/telemetry", self.ws_base, station_id);
        debug!(url = %url, "Connecting telemetry socket");
        let (socket, _) = connect_async(url.as_str())
            .await
            .map_err(|e| ChargeError::StationUnavailable {
                station_id: station_id.to_string(),
                status: format!("telemetry connect failed: {}", e),
            })?;

        let (_, read) = socket.split();
        let station = station_id.to_string();
        let frames = read
            .take_while(move |message| {
                let open = match message {
                    Ok(Message::Close(_)) => false,
                    Ok(_) => true,
                    Err(e) => {
                        warn!(station_id = %station, error = %e, "Telemetry socket error");
                        false
                    }
                };
                future::ready(open)
            })
            .filter_map(|message| future::ready(message.ok().and_then(parse_frame)));
        Ok(Box::pin(frames))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::session::HardwareStatus;

    #[test]
    fn parses_text_frames_only() {
        let frame = parse_frame(Message::Text(
            r#"{"power":7.2,"energy":1.5,"elapsedTime":600,"state":"charging"}"#.into(),
        ))
        .unwrap();
        assert_eq!(frame.energy_kwh, 1.5);
        assert_eq!(frame.state, HardwareStatus::Charging);

        assert!(parse_frame(Message::Text("not json".into())).is_none());
        assert!(parse_frame(Message::Ping(vec![])).is_none());
    }

    #[test]
    fn command_urls() {
        let cfg = HardwareConfig {
            api_base: "http://gw.local/api/".to_string(),
            ..HardwareConfig::default()
        };
        let driver = RemoteStationDriver::new(&cfg).unwrap();
        assert_eq!(driver.url("st-9", "start"), "http://gw.local/api/stations/st-9/start");
    }
}
