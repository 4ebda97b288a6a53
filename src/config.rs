//! Configuration module
//!
//! `AppConfig` is read from a TOML file
//! (`$CHARGEFLOW_CONFIG` or `~/.config/chargeflow/config.toml`). Every
//! section and field has a default, so a partial file is valid and a
//! missing file yields the defaults.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Environment variable overriding the config path
pub const CONFIG_ENV_VAR: &str = "CHARGEFLOW_CONFIG";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("Failed to parse config file {path}: {source}")]
    Parse {
        path: String,
        #[source]
        source: toml::de::Error,
    },
    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Default config location: `~/.config/chargeflow/config.toml`
pub fn default_config_path() -> PathBuf {
    dirs_next::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("chargeflow")
        .join("config.toml")
}

/// Path from `$CHARGEFLOW_CONFIG`, falling back to [`default_config_path`].
pub fn config_path_from_env() -> PathBuf {
    std::env::var(CONFIG_ENV_VAR)
        .map(PathBuf::from)
        .unwrap_or_else(|_| default_config_path())
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub logging: LoggingConfig,
    pub security: SecurityConfig,
    pub payments: PaymentsConfig,
    pub hardware: HardwareConfig,
    pub sessions: SessionsConfig,
    pub receipts: ReceiptsConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub api_host: String,
    pub api_port: u16,
    /// Seconds to wait for background tasks on shutdown
    pub shutdown_timeout: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            api_host: "0.0.0.0".to_string(),
            api_port: 8080,
            shutdown_timeout: 30,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    /// e.g. `sqlite://./chargeflow.db?mode=rwc` or `postgres://...`
    pub url: String,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: "sqlite://./chargeflow.db?mode=rwc".to_string(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    Text,
    Json,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
    pub format: LogFormat,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::Text,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SecurityConfig {
    /// HMAC secret shared with the identity provider
    pub jwt_secret: String,
    /// Expected `iss` claim; empty disables the check
    pub jwt_issuer: String,
}

impl Default for SecurityConfig {
    fn default() -> Self {
        Self {
            jwt_secret: "change-me-in-production".to_string(),
            jwt_issuer: String::new(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PaymentProvider {
    Stripe,
    Simulated,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PaymentsConfig {
    pub provider: PaymentProvider,
    pub secret_key: String,
    pub webhook_secret: String,
    /// Maximum age of a signed webhook
    pub webhook_tolerance_secs: i64,
    pub api_base: String,
    pub currency: String,
    /// Processor minimum charge in minor units
    pub minimum_amount: i64,
    pub request_timeout_secs: u64,
}

impl Default for PaymentsConfig {
    fn default() -> Self {
        Self {
            provider: PaymentProvider::Simulated,
            secret_key: String::new(),
            webhook_secret: String::new(),
            webhook_tolerance_secs: 300,
            api_base: "https://api.stripe.com".to_string(),
            currency: "usd".to_string(),
            minimum_amount: 50,
            request_timeout_secs: 30,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HardwareDriver {
    Simulator,
    Remote,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HardwareConfig {
    pub driver: HardwareDriver,
    /// Station API base for commands (`remote` driver)
    pub api_base: String,
    /// Telemetry WebSocket base (`remote` driver)
    pub ws_base: String,
    pub api_key: String,
    pub request_timeout_secs: u64,
    /// Current limit sent with every start command (A)
    pub default_current_limit_a: f64,
    pub simulator: SimulatorConfig,
}

impl Default for HardwareConfig {
    fn default() -> Self {
        Self {
            driver: HardwareDriver::Simulator,
            api_base: "http://localhost:9100".to_string(),
            ws_base: "ws://localhost:9100".to_string(),
            api_key: String::new(),
            request_timeout_secs: 10,
            default_current_limit_a: 32.0,
            simulator: SimulatorConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SimulatorConfig {
    pub tick_interval_ms: u64,
    /// Simulated seconds advanced per tick
    pub time_scale: f64,
    /// Energy at which the simulated vehicle is full
    pub target_energy_kwh: f64,
    /// Power used when the station has no rating
    pub default_power_kw: f64,
}

impl Default for SimulatorConfig {
    fn default() -> Self {
        Self {
            tick_interval_ms: 1000,
            time_scale: 1.0,
            target_energy_kwh: 30.0,
            default_power_kw: 7.4,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionsConfig {
    /// Max gap between telemetry ticks before a session errors out
    pub heartbeat_timeout_secs: u64,
    /// Orphan sweeper interval
    pub sweep_interval_secs: u64,
    /// Energy assumed by estimates when the user gives none
    pub default_assumed_energy_kwh: f64,
    /// Station owner share in basis points
    pub owner_share_bps: u32,
}

impl Default for SessionsConfig {
    fn default() -> Self {
        Self {
            heartbeat_timeout_secs: 90,
            sweep_interval_secs: 30,
            default_assumed_energy_kwh: 30.0,
            owner_share_bps: crate::domain::pricing::DEFAULT_OWNER_SHARE_BPS,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReceiptTransport {
    Log,
    Http,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ReceiptsConfig {
    pub transport: ReceiptTransport,
    /// Mail API endpoint (`http` transport)
    pub endpoint: String,
    pub api_key: String,
    pub from_address: String,
}

impl Default for ReceiptsConfig {
    fn default() -> Self {
        Self {
            transport: ReceiptTransport::Log,
            endpoint: String::new(),
            api_key: String::new(),
            from_address: "Chargeflow <receipts@chargeflow.local>".to_string(),
        }
    }
}

impl AppConfig {
    /// Load from `path`. A missing file yields defaults; nothing is written.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_toml(&raw).map_err(|source| ConfigError::Parse {
            path: path.display().to_string(),
            source,
        })
    }

    pub fn from_toml(raw: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(raw)
    }

    pub fn api_address(&self) -> String {
        format!("{}:{}", self.server.api_host, self.server.api_port)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let invalid = |msg: &str| Err(ConfigError::Invalid(msg.to_string()));

        if self.server.shutdown_timeout == 0 {
            return invalid("server.shutdown_timeout must be positive");
        }
        if self.database.url.trim().is_empty() {
            return invalid("database.url must not be empty");
        }
        if self.payments.minimum_amount <= 0 {
            return invalid("payments.minimum_amount must be positive");
        }
        if self.payments.request_timeout_secs == 0 {
            return invalid("payments.request_timeout_secs must be positive");
        }
        if self.payments.webhook_tolerance_secs <= 0 {
            return invalid("payments.webhook_tolerance_secs must be positive");
        }
        if !crate::shared::validations::is_currency_code(&self.payments.currency) {
            return invalid("payments.currency must be a lowercase ISO 4217 code");
        }
        if self.payments.provider == PaymentProvider::Stripe
            && self.payments.secret_key.is_empty()
        {
            return invalid("payments.secret_key is required for the stripe provider");
        }
        if self.hardware.request_timeout_secs == 0 {
            return invalid("hardware.request_timeout_secs must be positive");
        }
        if self.hardware.default_current_limit_a <= 0.0 {
            return invalid("hardware.default_current_limit_a must be positive");
        }
        if self.hardware.simulator.tick_interval_ms == 0 {
            return invalid("hardware.simulator.tick_interval_ms must be positive");
        }
        if self.sessions.heartbeat_timeout_secs == 0 {
            return invalid("sessions.heartbeat_timeout_secs must be positive");
        }
        if self.sessions.sweep_interval_secs == 0 {
            return invalid("sessions.sweep_interval_secs must be positive");
        }
        if self.sessions.default_assumed_energy_kwh <= 0.0 {
            return invalid("sessions.default_assumed_energy_kwh must be positive");
        }
        if self.sessions.owner_share_bps > 10_000 {
            return invalid("sessions.owner_share_bps must not exceed 10000");
        }
        if self.receipts.transport == ReceiptTransport::Http && self.receipts.endpoint.is_empty()
        {
            return invalid("receipts.endpoint is required for the http transport");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let cfg = AppConfig::default();
        cfg.validate().unwrap();
        assert_eq!(cfg.sessions.heartbeat_timeout_secs, 90);
        assert_eq!(cfg.payments.minimum_amount, 50);
        assert_eq!(cfg.api_address(), "0.0.0.0:8080");
    }

    #[test]
    fn partial_file_fills_defaults() {
        let cfg = AppConfig::from_toml(
            r#"
            [server]
            api_port = 9090

            [payments]
            provider = "stripe"
            secret_key = "sk_test_123"

            [logging]
            format = "json"
            "#,
        )
        .unwrap();
        assert_eq!(cfg.server.api_port, 9090);
        assert_eq!(cfg.server.api_host, "0.0.0.0");
        assert_eq!(cfg.payments.provider, PaymentProvider::Stripe);
        assert_eq!(cfg.payments.currency, "usd");
        assert_eq!(cfg.logging.format, LogFormat::Json);
        cfg.validate().unwrap();
    }

    #[test]
    fn validate_rejects_bad_values() {
        let mut cfg = AppConfig::default();
        cfg.sessions.heartbeat_timeout_secs = 0;
        assert!(cfg.validate().is_err());

        let mut cfg = AppConfig::default();
        cfg.payments.minimum_amount = 0;
        assert!(cfg.validate().is_err());

        let mut cfg = AppConfig::default();
        cfg.payments.provider = PaymentProvider::Stripe;
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn missing_file_yields_defaults() {
        let cfg = AppConfig::load(Path::new("/nonexistent/chargeflow/config.toml")).unwrap();
        assert_eq!(cfg.server.api_port, 8080);
    }
}
