//! Change event types

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::domain::{ChargingSession, Transaction};

/// A confirmed write, carried as a full snapshot
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum ChangeEvent {
    SessionUpdated(ChargingSession),
    TransactionUpdated(Transaction),
}

impl ChangeEvent {
    pub fn event_type(&self) -> &'static str {
        match self {
            Self::SessionUpdated(_) => "session_updated",
            Self::TransactionUpdated(_) => "transaction_updated",
        }
    }

    pub fn session_id(&self) -> &str {
        match self {
            Self::SessionUpdated(s) => &s.id,
            Self::TransactionUpdated(t) => &t.session_id,
        }
    }
}

/// Event with publish timestamp and sequence number
#[derive(Debug, Clone, Serialize)]
pub struct ChangeMessage {
    pub seq: u64,
    pub published_at: DateTime<Utc>,
    #[serde(flatten)]
    pub event: ChangeEvent,
}
