use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use validator::Validate;

use crate::application::StationTransaction;
use crate::domain::Transaction;
use crate::shared::types::money::format_minor_units;

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct TransactionResponse {
    pub id: String,
    pub session_id: String,
    pub station_id: String,
    pub station_name: String,
    /// pending | succeeded | failed | refunded | cancelled
    pub status: String,
    /// Minor units: held while pending, captured afterwards
    pub amount: i64,
    pub amount_display: String,
    pub currency: String,
    pub energy_delivered_kwh: f64,
    pub session_started_at: Option<DateTime<Utc>>,
    pub session_ended_at: Option<DateTime<Utc>>,
    pub receipt_sent: bool,
    pub refund_amount: Option<i64>,
    pub refunded_at: Option<DateTime<Utc>>,
    pub needs_reconciliation: bool,
    pub created_at: DateTime<Utc>,
}

impl From<Transaction> for TransactionResponse {
    fn from(tx: Transaction) -> Self {
        Self {
            amount_display: format_minor_units(tx.amount, &tx.currency),
            id: tx.id,
            session_id: tx.session_id,
            station_id: tx.station_id,
            station_name: tx.station_name,
            status: tx.status.as_str().to_string(),
            amount: tx.amount,
            currency: tx.currency,
            energy_delivered_kwh: tx.energy_delivered_kwh,
            session_started_at: tx.session_started_at,
            session_ended_at: tx.session_ended_at,
            receipt_sent: tx.receipt_sent,
            refund_amount: tx.refund_amount,
            refunded_at: tx.refunded_at,
            needs_reconciliation: tx.needs_reconciliation,
            created_at: tx.created_at,
        }
    }
}

/// Station owner's view of one transaction, with the projected split
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct StationTransactionResponse {
    #[serde(flatten)]
    pub transaction: TransactionResponse,
    pub owner_share: Option<i64>,
    pub platform_share: Option<i64>,
}

impl From<StationTransaction> for StationTransactionResponse {
    fn from(item: StationTransaction) -> Self {
        Self {
            owner_share: item.revenue_split.map(|s| s.owner_share),
            platform_share: item.revenue_split.map(|s| s.platform_share),
            transaction: item.transaction.into(),
        }
    }
}

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct RefundRequest {
    /// Minor units; the whole captured amount when absent
    #[validate(range(min = 1, message = "must be positive"))]
    pub amount: Option<i64>,
    #[validate(length(min = 1, max = 200))]
    #[serde(default = "default_reason")]
    pub reason: String,
}

fn default_reason() -> String {
    "requested_by_customer".to_string()
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ReceiptResponse {
    pub transaction_id: String,
    /// `false` when the transaction is not in a receipt-bearing state
    pub sent: bool,
}
