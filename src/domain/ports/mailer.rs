//! Receipt delivery port

use async_trait::async_trait;
use serde::Serialize;

use crate::shared::errors::DomainResult;

/// A rendered receipt ready for delivery
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OutgoingReceipt {
    pub transaction_id: String,
    pub to: String,
    pub from: String,
    pub subject: String,
    pub text_body: String,
    pub html_body: String,
}

#[async_trait]
pub trait ReceiptMailer: Send + Sync {
    /// Hand the receipt to the transport. Returns the transport's message id
    /// once the send (or enqueue) is confirmed.
    async fn send(&self, receipt: &OutgoingReceipt) -> DomainResult<String>;
}
