//! Transaction domain entity

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::pricing::RevenueSplit;
use crate::shared::errors::{ChargeError, DomainResult};

/// Payment outcome of a session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransactionStatus {
    Pending,
    Succeeded,
    Failed,
    Refunded,
    Cancelled,
}

impl TransactionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Succeeded => "succeeded",
            Self::Failed => "failed",
            Self::Refunded => "refunded",
            Self::Cancelled => "cancelled",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(Self::Pending),
            "succeeded" => Some(Self::Succeeded),
            "failed" => Some(Self::Failed),
            "refunded" => Some(Self::Refunded),
            "cancelled" => Some(Self::Cancelled),
            _ => None,
        }
    }

    /// Legal status moves. A failed transaction may still succeed when the
    /// processor confirms a capture late (webhook).
    pub fn can_transition_to(&self, next: TransactionStatus) -> bool {
        use TransactionStatus::*;
        matches!(
            (self, next),
            (Pending, Succeeded)
                | (Pending, Failed)
                | (Pending, Cancelled)
                | (Failed, Succeeded)
                | (Succeeded, Refunded)
        )
    }

    pub fn is_final(&self) -> bool {
        matches!(self, Self::Refunded | Self::Cancelled)
    }
}

impl std::fmt::Display for TransactionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Payment transaction linked to a charging session
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transaction {
    pub id: String,
    pub session_id: String,
    pub user_id: String,
    pub station_id: String,
    pub station_name: String,
    pub station_owner_id: String,
    /// Authorized amount while pending, captured amount afterwards
    pub amount: i64,
    pub currency: String,
    pub status: TransactionStatus,
    pub authorization_id: String,
    pub payment_method_id: String,
    pub capture_id: Option<String>,
    pub session_started_at: Option<DateTime<Utc>>,
    pub session_ended_at: Option<DateTime<Utc>>,
    pub energy_delivered_kwh: f64,
    pub receipt_sent: bool,
    pub receipt_sent_at: Option<DateTime<Utc>>,
    pub refund_id: Option<String>,
    pub refund_amount: Option<i64>,
    pub refunded_at: Option<DateTime<Utc>>,
    /// Set when the capture could not cover the full cost or the session
    /// ended on a degraded path
    pub needs_reconciliation: bool,
    pub reconciliation_note: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Fields required to open a pending transaction
#[derive(Debug, Clone)]
pub struct NewTransaction {
    pub id: String,
    pub session_id: String,
    pub user_id: String,
    pub station_id: String,
    pub station_name: String,
    pub station_owner_id: String,
    pub amount: i64,
    pub currency: String,
    pub authorization_id: String,
    pub payment_method_id: String,
}

impl Transaction {
    pub fn pending(input: NewTransaction) -> Self {
        let now = Utc::now();
        Self {
            id: input.id,
            session_id: input.session_id,
            user_id: input.user_id,
            station_id: input.station_id,
            station_name: input.station_name,
            station_owner_id: input.station_owner_id,
            amount: input.amount,
            currency: input.currency,
            status: TransactionStatus::Pending,
            authorization_id: input.authorization_id,
            payment_method_id: input.payment_method_id,
            capture_id: None,
            session_started_at: None,
            session_ended_at: None,
            energy_delivered_kwh: 0.0,
            receipt_sent: false,
            receipt_sent_at: None,
            refund_id: None,
            refund_amount: None,
            refunded_at: None,
            needs_reconciliation: false,
            reconciliation_note: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Projected owner/platform split of the captured amount.
    pub fn revenue_split(&self, owner_share_bps: u32) -> Option<RevenueSplit> {
        match self.status {
            TransactionStatus::Succeeded | TransactionStatus::Refunded => {
                let net = self.amount - self.refund_amount.unwrap_or(0);
                Some(RevenueSplit::compute(net.max(0), owner_share_bps))
            }
            _ => None,
        }
    }

    /// Apply `patch`, enforcing the status machine.
    ///
    /// A same-status patch is accepted without touching status. Once
    /// refunded, only refund and receipt metadata may change.
    pub fn apply_patch(&mut self, patch: &TransactionPatch) -> DomainResult<()> {
        if self.status == TransactionStatus::Refunded && patch.touches_settlement() {
            return Err(ChargeError::InvalidState(format!(
                "transaction {} is refunded; settlement fields are frozen",
                self.id
            )));
        }
        if let Some(next) = patch.status {
            if next != self.status && !self.status.can_transition_to(next) {
                return Err(ChargeError::InvalidState(format!(
                    "transaction {} cannot move from {} to {}",
                    self.id, self.status, next
                )));
            }
            if next == TransactionStatus::Succeeded
                && patch.capture_id.is_none()
                && self.capture_id.is_none()
            {
                return Err(ChargeError::InvalidState(format!(
                    "transaction {} cannot succeed without a capture id",
                    self.id
                )));
            }
            self.status = next;
        }
        if let Some(amount) = patch.amount {
            self.amount = amount;
        }
        if let Some(id) = &patch.capture_id {
            self.capture_id = Some(id.clone());
        }
        if let Some(at) = patch.session_started_at {
            self.session_started_at = Some(at);
        }
        if let Some(at) = patch.session_ended_at {
            self.session_ended_at = Some(at);
        }
        if let Some(energy) = patch.energy_delivered_kwh {
            self.energy_delivered_kwh = energy;
        }
        if let Some(sent) = patch.receipt_sent {
            self.receipt_sent = sent;
        }
        if let Some(at) = patch.receipt_sent_at {
            self.receipt_sent_at = Some(at);
        }
        if let Some(id) = &patch.refund_id {
            self.refund_id = Some(id.clone());
        }
        if let Some(amount) = patch.refund_amount {
            self.refund_amount = Some(amount);
        }
        if let Some(at) = patch.refunded_at {
            self.refunded_at = Some(at);
        }
        if let Some(flag) = patch.needs_reconciliation {
            self.needs_reconciliation = flag;
        }
        if let Some(note) = &patch.reconciliation_note {
            self.reconciliation_note = Some(note.clone());
        }
        self.updated_at = Utc::now();
        Ok(())
    }
}

/// Partial update for a transaction record
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TransactionPatch {
    pub status: Option<TransactionStatus>,
    pub amount: Option<i64>,
    pub capture_id: Option<String>,
    pub session_started_at: Option<DateTime<Utc>>,
    pub session_ended_at: Option<DateTime<Utc>>,
    pub energy_delivered_kwh: Option<f64>,
    pub receipt_sent: Option<bool>,
    pub receipt_sent_at: Option<DateTime<Utc>>,
    pub refund_id: Option<String>,
    pub refund_amount: Option<i64>,
    pub refunded_at: Option<DateTime<Utc>>,
    pub needs_reconciliation: Option<bool>,
    pub reconciliation_note: Option<String>,
}

impl TransactionPatch {
    pub fn status(status: TransactionStatus) -> Self {
        Self {
            status: Some(status),
            ..Default::default()
        }
    }

    /// Receipt delivery metadata only.
    pub fn receipt_delivered(at: DateTime<Utc>) -> Self {
        Self {
            receipt_sent: Some(true),
            receipt_sent_at: Some(at),
            ..Default::default()
        }
    }

    fn touches_settlement(&self) -> bool {
        self.status
            .is_some_and(|s| s != TransactionStatus::Refunded)
            || self.amount.is_some()
            || self.capture_id.is_some()
            || self.energy_delivered_kwh.is_some()
            || self.session_started_at.is_some()
            || self.session_ended_at.is_some()
    }
}

// ── Tests ──────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::pricing::DEFAULT_OWNER_SHARE_BPS;

    fn sample() -> Transaction {
        Transaction::pending(NewTransaction {
            id: "tx-1".into(),
            session_id: "sess-1".into(),
            user_id: "user-1".into(),
            station_id: "st-1".into(),
            station_name: "Depot A".into(),
            station_owner_id: "owner-1".into(),
            amount: 2000,
            currency: "usd".into(),
            authorization_id: "pi_1".into(),
            payment_method_id: "pm_1".into(),
        })
    }

    fn captured(amount: i64) -> TransactionPatch {
        TransactionPatch {
            status: Some(TransactionStatus::Succeeded),
            amount: Some(amount),
            capture_id: Some("pi_1".into()),
            ..Default::default()
        }
    }

    #[test]
    fn pending_to_succeeded_requires_capture_id() {
        let mut tx = sample();
        let err = tx
            .apply_patch(&TransactionPatch::status(TransactionStatus::Succeeded))
            .unwrap_err();
        assert!(matches!(err, ChargeError::InvalidState(_)));

        tx.apply_patch(&captured(510)).unwrap();
        assert_eq!(tx.status, TransactionStatus::Succeeded);
        assert_eq!(tx.amount, 510);
    }

    #[test]
    fn same_status_is_a_no_op_move() {
        let mut tx = sample();
        tx.apply_patch(&captured(510)).unwrap();
        tx.apply_patch(&captured(510)).unwrap();
        assert_eq!(tx.status, TransactionStatus::Succeeded);
    }

    #[test]
    fn failed_may_succeed_late_but_cancelled_may_not() {
        let mut tx = sample();
        tx.apply_patch(&TransactionPatch::status(TransactionStatus::Failed))
            .unwrap();
        tx.apply_patch(&captured(510)).unwrap();
        assert_eq!(tx.status, TransactionStatus::Succeeded);

        let mut tx = sample();
        tx.apply_patch(&TransactionPatch::status(TransactionStatus::Cancelled))
            .unwrap();
        assert!(tx.apply_patch(&captured(510)).is_err());
    }

    #[test]
    fn refunded_accepts_only_metadata() {
        let mut tx = sample();
        tx.apply_patch(&captured(510)).unwrap();
        tx.apply_patch(&TransactionPatch {
            status: Some(TransactionStatus::Refunded),
            refund_id: Some("re_1".into()),
            refund_amount: Some(510),
            refunded_at: Some(Utc::now()),
            ..Default::default()
        })
        .unwrap();

        assert!(tx.apply_patch(&captured(600)).is_err());
        tx.apply_patch(&TransactionPatch::receipt_delivered(Utc::now()))
            .unwrap();
        assert!(tx.receipt_sent);
        assert_eq!(tx.amount, 510);
    }

    #[test]
    fn revenue_split_only_for_settled() {
        let mut tx = sample();
        assert!(tx.revenue_split(DEFAULT_OWNER_SHARE_BPS).is_none());
        tx.apply_patch(&captured(1000)).unwrap();
        let split = tx.revenue_split(DEFAULT_OWNER_SHARE_BPS).unwrap();
        assert_eq!(split.owner_share, 700);
        assert_eq!(split.platform_share, 300);
    }
}
