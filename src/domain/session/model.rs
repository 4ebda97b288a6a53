//! Charging session domain entity

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::domain::pricing::energy_cost;
use crate::shared::errors::{ChargeError, DomainResult};

/// Session lifecycle status
///
/// `Completed`, `Cancelled` and `Error` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    /// Payment authorized, hardware not started yet
    Authorized,
    /// Hardware is delivering energy
    Active,
    /// Stop requested, capture in progress
    Completing,
    /// Payment captured (or released for a zero-cost session)
    Completed,
    /// Abandoned before charging began
    Cancelled,
    /// Failed after charging began; needs reconciliation
    Error,
}

impl SessionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Authorized => "authorized",
            Self::Active => "active",
            Self::Completing => "completing",
            Self::Completed => "completed",
            Self::Cancelled => "cancelled",
            Self::Error => "error",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "authorized" => Some(Self::Authorized),
            "active" => Some(Self::Active),
            "completing" => Some(Self::Completing),
            "completed" => Some(Self::Completed),
            "cancelled" => Some(Self::Cancelled),
            "error" => Some(Self::Error),
            _ => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Cancelled | Self::Error)
    }

    pub fn can_transition_to(&self, next: SessionStatus) -> bool {
        use SessionStatus::*;
        matches!(
            (self, next),
            (Authorized, Active)
                | (Authorized, Cancelled)
                | (Authorized, Error)
                | (Active, Completing)
                | (Active, Error)
                | (Completing, Completed)
                | (Completing, Error)
        )
    }
}

impl std::fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Last state reported by the station driver
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HardwareStatus {
    Idle,
    Charging,
    Finished,
    Faulted,
    #[serde(other)]
    Unknown,
}

impl HardwareStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Charging => "charging",
            Self::Finished => "finished",
            Self::Faulted => "faulted",
            Self::Unknown => "unknown",
        }
    }

    pub fn from_str(s: &str) -> Self {
        match s {
            "idle" => Self::Idle,
            "charging" => Self::Charging,
            "finished" => Self::Finished,
            "faulted" => Self::Faulted,
            _ => Self::Unknown,
        }
    }
}

/// Charging session
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChargingSession {
    pub id: String,
    pub user_id: String,
    pub station_id: String,
    /// Payment processor authorization (hold) id
    pub authorization_id: String,
    pub status: SessionStatus,
    pub currency: String,
    /// Price snapshot in minor units per kWh, fixed at session creation
    pub price_per_kwh: Decimal,
    /// Amount held on the payment method
    pub authorized_amount: i64,
    /// Captured amount; set only when the session completes normally
    pub final_amount: Option<i64>,
    pub started_at: Option<DateTime<Utc>>,
    pub ended_at: Option<DateTime<Utc>>,
    /// Cumulative energy, never decreases
    pub energy_delivered_kwh: f64,
    pub current_power_kw: f64,
    pub last_heartbeat: Option<DateTime<Utc>>,
    pub hardware_status: HardwareStatus,
    pub error_message: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Fields required to create a session
#[derive(Debug, Clone)]
pub struct NewSession {
    pub id: String,
    pub user_id: String,
    pub station_id: String,
    pub authorization_id: String,
    pub currency: String,
    pub price_per_kwh: Decimal,
    pub authorized_amount: i64,
}

impl ChargingSession {
    pub fn new(input: NewSession) -> Self {
        let now = Utc::now();
        Self {
            id: input.id,
            user_id: input.user_id,
            station_id: input.station_id,
            authorization_id: input.authorization_id,
            status: SessionStatus::Authorized,
            currency: input.currency,
            price_per_kwh: input.price_per_kwh,
            authorized_amount: input.authorized_amount,
            final_amount: None,
            started_at: None,
            ended_at: None,
            energy_delivered_kwh: 0.0,
            current_power_kw: 0.0,
            last_heartbeat: None,
            hardware_status: HardwareStatus::Idle,
            error_message: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Move to `next`, stamping start/end times. Rejects illegal moves.
    pub fn transition(&mut self, next: SessionStatus, at: DateTime<Utc>) -> DomainResult<()> {
        if !self.status.can_transition_to(next) {
            return Err(ChargeError::InvalidState(format!(
                "session {} cannot move from {} to {}",
                self.id, self.status, next
            )));
        }
        self.status = next;
        if next == SessionStatus::Active {
            self.started_at = Some(at);
            self.last_heartbeat = Some(at);
        }
        if next.is_terminal() {
            self.ended_at = Some(at);
            self.current_power_kw = 0.0;
        }
        self.updated_at = at;
        Ok(())
    }

    /// Fold a telemetry reading into the session.
    ///
    /// Energy only moves forward; a lower reading keeps the current value.
    pub fn record_telemetry(
        &mut self,
        power_kw: f64,
        energy_kwh: f64,
        hardware_status: HardwareStatus,
        at: DateTime<Utc>,
    ) {
        if energy_kwh.is_finite() && energy_kwh > self.energy_delivered_kwh {
            self.energy_delivered_kwh = energy_kwh;
        }
        if power_kw.is_finite() {
            self.current_power_kw = power_kw.max(0.0);
        }
        self.hardware_status = hardware_status;
        self.last_heartbeat = Some(at);
        self.updated_at = at;
    }

    /// Running cost for display; not a billing figure.
    pub fn live_cost(&self) -> i64 {
        energy_cost(self.energy_delivered_kwh, self.price_per_kwh)
    }

    pub fn elapsed_secs(&self, now: DateTime<Utc>) -> i64 {
        match self.started_at {
            Some(start) => (self.ended_at.unwrap_or(now) - start).num_seconds().max(0),
            None => 0,
        }
    }

    /// Whether the last heartbeat is older than `timeout_secs`.
    pub fn is_heartbeat_stale(&self, now: DateTime<Utc>, timeout_secs: i64) -> bool {
        match self.last_heartbeat.or(self.started_at) {
            Some(last) => (now - last).num_seconds() >= timeout_secs,
            None => true,
        }
    }
}

/// Partial update for a session record
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SessionPatch {
    pub status: Option<SessionStatus>,
    pub final_amount: Option<i64>,
    pub started_at: Option<DateTime<Utc>>,
    pub ended_at: Option<DateTime<Utc>>,
    pub energy_delivered_kwh: Option<f64>,
    pub current_power_kw: Option<f64>,
    pub last_heartbeat: Option<DateTime<Utc>>,
    pub hardware_status: Option<HardwareStatus>,
    pub error_message: Option<String>,
}

impl SessionPatch {
    /// Patch carrying every mutable field of `session`.
    pub fn snapshot(session: &ChargingSession) -> Self {
        Self {
            status: Some(session.status),
            final_amount: session.final_amount,
            started_at: session.started_at,
            ended_at: session.ended_at,
            energy_delivered_kwh: Some(session.energy_delivered_kwh),
            current_power_kw: Some(session.current_power_kw),
            last_heartbeat: session.last_heartbeat,
            hardware_status: Some(session.hardware_status),
            error_message: session.error_message.clone(),
        }
    }

    /// Telemetry-only patch; never touches status.
    pub fn telemetry(session: &ChargingSession) -> Self {
        Self {
            energy_delivered_kwh: Some(session.energy_delivered_kwh),
            current_power_kw: Some(session.current_power_kw),
            last_heartbeat: session.last_heartbeat,
            hardware_status: Some(session.hardware_status),
            ..Default::default()
        }
    }

    pub fn apply(&self, session: &mut ChargingSession) {
        if let Some(status) = self.status {
            session.status = status;
        }
        if let Some(amount) = self.final_amount {
            session.final_amount = Some(amount);
        }
        if let Some(at) = self.started_at {
            session.started_at = Some(at);
        }
        if let Some(at) = self.ended_at {
            session.ended_at = Some(at);
        }
        if let Some(energy) = self.energy_delivered_kwh {
            if energy > session.energy_delivered_kwh {
                session.energy_delivered_kwh = energy;
            }
        }
        if let Some(power) = self.current_power_kw {
            session.current_power_kw = power;
        }
        if let Some(at) = self.last_heartbeat {
            session.last_heartbeat = Some(at);
        }
        if let Some(hw) = self.hardware_status {
            session.hardware_status = hw;
        }
        if let Some(msg) = &self.error_message {
            session.error_message = Some(msg.clone());
        }
        session.updated_at = Utc::now();
    }
}

// ── Tests ──────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn sample() -> ChargingSession {
        ChargingSession::new(NewSession {
            id: "sess-1".into(),
            user_id: "user-1".into(),
            station_id: "st-1".into(),
            authorization_id: "pi_1".into(),
            currency: "usd".into(),
            price_per_kwh: Decimal::from(28),
            authorized_amount: 2000,
        })
    }

    #[test]
    fn new_session_is_authorized() {
        let s = sample();
        assert_eq!(s.status, SessionStatus::Authorized);
        assert!(s.started_at.is_none());
        assert!(s.final_amount.is_none());
        assert_eq!(s.energy_delivered_kwh, 0.0);
    }

    #[test]
    fn legal_transitions() {
        use SessionStatus::*;
        assert!(Authorized.can_transition_to(Active));
        assert!(Authorized.can_transition_to(Cancelled));
        assert!(Active.can_transition_to(Completing));
        assert!(Active.can_transition_to(Error));
        assert!(Completing.can_transition_to(Completed));
        assert!(Completing.can_transition_to(Error));

        assert!(!Active.can_transition_to(Cancelled));
        assert!(!Active.can_transition_to(Completed));
        assert!(!Completed.can_transition_to(Active));
        assert!(!Cancelled.can_transition_to(Active));
        assert!(!Error.can_transition_to(Completed));
    }

    #[test]
    fn transition_stamps_times() {
        let mut s = sample();
        let t0 = Utc::now();
        s.transition(SessionStatus::Active, t0).unwrap();
        assert_eq!(s.started_at, Some(t0));
        s.transition(SessionStatus::Completing, t0).unwrap();
        s.transition(SessionStatus::Completed, t0 + Duration::minutes(40))
            .unwrap();
        assert_eq!(s.elapsed_secs(Utc::now()), 2400);
        assert!(s.status.is_terminal());
    }

    #[test]
    fn illegal_transition_is_rejected() {
        let mut s = sample();
        let err = s.transition(SessionStatus::Completed, Utc::now()).unwrap_err();
        assert!(matches!(err, ChargeError::InvalidState(_)));
        assert_eq!(s.status, SessionStatus::Authorized);
    }

    #[test]
    fn energy_never_decreases() {
        let mut s = sample();
        let now = Utc::now();
        s.record_telemetry(7.2, 5.0, HardwareStatus::Charging, now);
        s.record_telemetry(7.2, 4.5, HardwareStatus::Charging, now);
        assert_eq!(s.energy_delivered_kwh, 5.0);
        s.record_telemetry(7.2, 18.2, HardwareStatus::Charging, now);
        assert_eq!(s.live_cost(), 510);
    }

    #[test]
    fn heartbeat_staleness() {
        let mut s = sample();
        let t0 = Utc::now();
        s.transition(SessionStatus::Active, t0).unwrap();
        assert!(!s.is_heartbeat_stale(t0 + Duration::seconds(30), 90));
        assert!(s.is_heartbeat_stale(t0 + Duration::seconds(91), 90));
    }

    #[test]
    fn status_round_trips_through_str() {
        for st in [
            SessionStatus::Authorized,
            SessionStatus::Active,
            SessionStatus::Completing,
            SessionStatus::Completed,
            SessionStatus::Cancelled,
            SessionStatus::Error,
        ] {
            assert_eq!(SessionStatus::from_str(st.as_str()), Some(st));
        }
        assert_eq!(SessionStatus::from_str("bogus"), None);
    }
}
