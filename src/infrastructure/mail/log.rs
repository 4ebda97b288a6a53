use std::sync::Mutex;

use async_trait::async_trait;
use tracing::info;

use crate::domain::ports::mailer::{OutgoingReceipt, ReceiptMailer};
use crate::domain::{ChargeError, DomainResult};

/// Writes receipts to the log instead of sending them. Keeps the last
/// deliveries in memory so tests can inspect them.
#[derive(Default)]
pub struct LogMailer {
    sent: Mutex<Vec<OutgoingReceipt>>,
    fail: Mutex<bool>,
}

impl LogMailer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn sent(&self) -> Vec<OutgoingReceipt> {
        self.sent.lock().map(|s| s.clone()).unwrap_or_default()
    }

    pub fn set_failing(&self, on: bool) {
        if let Ok(mut fail) = self.fail.lock() {
            *fail = on;
        }
    }
}

#[async_trait]
impl ReceiptMailer for LogMailer {
    async fn send(&self, receipt: &OutgoingReceipt) -> DomainResult<String> {
        if self.fail.lock().map(|f| *f).unwrap_or(false) {
            return Err(ChargeError::gateway("send_receipt", "mail transport unavailable"));
        }
        let mut sent = self
            .sent
            .lock()
            .map_err(|_| ChargeError::gateway("send_receipt", "mailer state poisoned"))?;
        sent.push(receipt.clone());
        let message_id = format!("log-{}-{}", receipt.transaction_id, sent.len());

        info!(
            transaction_id = %receipt.transaction_id,
            to = %receipt.to,
            subject = %receipt.subject,
            message_id = %message_id,
            "Receipt delivered to log\n{}",
            receipt.text_body
        );
        Ok(message_id)
    }
}
