//! Receipt dispatcher
//!
//! Renders a receipt from the current transaction (plus station details)
//! and hands it to the mail transport. Only delivery metadata is written
//! back, so sending again never changes billing fields.

use std::sync::Arc;

use chrono::Utc;
use tracing::{info, warn};

use crate::domain::ports::{OutgoingReceipt, ReceiptMailer};
use crate::domain::{
    ChargeError, DomainResult, Station, Transaction, TransactionPatch, TransactionStatus,
};
use crate::shared::format_minor_units;

use super::store::SessionStore;

pub struct ReceiptDispatcher {
    store: Arc<SessionStore>,
    mailer: Arc<dyn ReceiptMailer>,
    from_address: String,
}

impl ReceiptDispatcher {
    pub fn new(store: Arc<SessionStore>, mailer: Arc<dyn ReceiptMailer>, from_address: String) -> Self {
        Self {
            store,
            mailer,
            from_address,
        }
    }

    /// Render and send the receipt for `transaction_id`.
    ///
    /// Returns `Ok(false)` when nothing could be delivered (not yet settled,
    /// no recipient address, transport failure); the transaction is left
    /// untouched in that case. Unknown ids are an error.
    pub async fn send_receipt(&self, transaction_id: &str) -> DomainResult<bool> {
        let tx = self.store.get_transaction(transaction_id).await?;
        if !matches!(
            tx.status,
            TransactionStatus::Succeeded | TransactionStatus::Refunded
        ) {
            warn!(transaction_id, status = %tx.status, "No receipt for unsettled transaction");
            return Ok(false);
        }

        let recipient = self
            .store
            .repos()
            .customers()
            .find_by_user(&tx.user_id)
            .await?
            .map(|c| c.email)
            .filter(|e| !e.is_empty());
        let Some(to) = recipient else {
            warn!(transaction_id, user_id = %tx.user_id, "No email on file for receipt");
            metrics::counter!("receipts_sent_total", "result" => "no_recipient").increment(1);
            return Ok(false);
        };

        let station = self.store.repos().stations().find_by_id(&tx.station_id).await?;
        let receipt = render_receipt(&tx, station.as_ref(), &to, &self.from_address);

        match self.mailer.send(&receipt).await {
            Ok(message_id) => {
                self.store
                    .update_transaction(&tx.id, TransactionPatch::receipt_delivered(Utc::now()))
                    .await?;
                metrics::counter!("receipts_sent_total", "result" => "sent").increment(1);
                info!(transaction_id, message_id = %message_id, "Receipt sent");
                Ok(true)
            }
            Err(e) => {
                metrics::counter!("receipts_sent_total", "result" => "failed").increment(1);
                warn!(transaction_id, error = %e, "Receipt delivery failed");
                Ok(false)
            }
        }
    }

    /// Send without waiting; used right after a capture.
    pub fn dispatch(self: &Arc<Self>, transaction_id: String) {
        let this = self.clone();
        tokio::spawn(async move {
            match this.send_receipt(&transaction_id).await {
                Ok(_) => {}
                Err(ChargeError::NotFound { .. }) => {
                    warn!(transaction_id = %transaction_id, "Receipt for unknown transaction")
                }
                Err(e) => warn!(transaction_id = %transaction_id, error = %e, "Receipt dispatch failed"),
            }
        });
    }
}

pub fn render_receipt(
    tx: &Transaction,
    station: Option<&Station>,
    to: &str,
    from: &str,
) -> OutgoingReceipt {
    let money = |amount: i64| format_minor_units(amount, &tx.currency);
    let station_name = if tx.station_name.is_empty() {
        station.map(|s| s.name.clone()).unwrap_or_else(|| tx.station_id.clone())
    } else {
        tx.station_name.clone()
    };
    let address = station.map(|s| s.address.clone()).unwrap_or_default();
    let date = tx
        .session_ended_at
        .unwrap_or(tx.updated_at)
        .format("%Y-%m-%d %H:%M UTC")
        .to_string();
    let minutes = match (tx.session_started_at, tx.session_ended_at) {
        (Some(start), Some(end)) => (end - start).num_minutes().max(0),
        _ => 0,
    };

    let mut lines = vec![
        ("Station".to_string(), station_name.clone()),
        ("Date".to_string(), date),
        ("Duration".to_string(), format!("{} min", minutes)),
        (
            "Energy delivered".to_string(),
            format!("{:.2} kWh", tx.energy_delivered_kwh),
        ),
        ("Amount charged".to_string(), money(tx.amount)),
    ];
    if !address.is_empty() {
        lines.insert(1, ("Address".to_string(), address));
    }
    if let Some(refunded) = tx.refund_amount {
        lines.push(("Refunded".to_string(), money(refunded)));
        lines.push(("Net".to_string(), money(tx.amount - refunded)));
    }
    lines.push(("Reference".to_string(), tx.id.clone()));

    let subject = format!("Your charging receipt: {} at {}", money(tx.amount), station_name);

    let mut text_body = String::from("Thanks for charging with us.\n\n");
    for (label, value) in &lines {
        text_body.push_str(&format!("{:<18}{}\n", format!("{}:", label), value));
    }

    let mut rows = String::new();
    for (label, value) in &lines {
        rows.push_str(&format!(
            "<tr><td style=\"padding:4px 12px 4px 0;color:#666\">{}</td><td>{}</td></tr>",
            escape_html(label),
            escape_html(value)
        ));
    }
    let html_body = format!(
        "<html><body style=\"font-family:sans-serif\"><h2>Charging receipt</h2>\
         <p>Thanks for charging with us.</p><table>{}</table></body></html>",
        rows
    );

    OutgoingReceipt {
        transaction_id: tx.id.clone(),
        to: to.to_string(),
        from: from.to_string(),
        subject,
        text_body,
        html_body,
    }
}

fn escape_html(input: &str) -> String {
    input
        .replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    use crate::domain::transaction::NewTransaction;
    use crate::domain::{CustomerRecord, RepositoryProvider};
    use crate::infrastructure::mail::LogMailer;
    use crate::infrastructure::storage::InMemoryRepositories;
    use crate::notifications::ChangeFeed;

    fn settled() -> Transaction {
        let mut tx = Transaction::pending(NewTransaction {
            id: "tx-1".into(),
            session_id: "sess-1".into(),
            user_id: "user-1".into(),
            station_id: "st-1".into(),
            station_name: "Harbor <Depot>".into(),
            station_owner_id: "owner-1".into(),
            amount: 2000,
            currency: "usd".into(),
            authorization_id: "pi_1".into(),
            payment_method_id: "pm_1".into(),
        });
        let end = Utc::now();
        tx.apply_patch(&TransactionPatch {
            status: Some(TransactionStatus::Succeeded),
            amount: Some(510),
            capture_id: Some("ch_1".into()),
            session_started_at: Some(end - Duration::minutes(45)),
            session_ended_at: Some(end),
            energy_delivered_kwh: Some(18.2),
            ..Default::default()
        })
        .unwrap();
        tx
    }

    async fn setup(tx: Transaction) -> (ReceiptDispatcher, Arc<LogMailer>, Arc<SessionStore>) {
        let repos = Arc::new(InMemoryRepositories::new());
        repos
            .customers()
            .insert_if_absent(CustomerRecord::new("user-1", "cus_1", "driver@example.com"))
            .await
            .unwrap();
        repos.transactions().insert(tx).await.unwrap();
        let store = Arc::new(SessionStore::new(repos, Arc::new(ChangeFeed::new())));
        let mailer = Arc::new(LogMailer::new());
        let dispatcher = ReceiptDispatcher::new(
            store.clone(),
            mailer.clone(),
            "receipts@chargeflow.test".into(),
        );
        (dispatcher, mailer, store)
    }

    #[test]
    fn renders_amounts_and_escapes_html() {
        let receipt = render_receipt(&settled(), None, "driver@example.com", "from@test");
        assert!(receipt.subject.contains("$5.10"));
        assert!(receipt.text_body.contains("18.20 kWh"));
        assert!(receipt.text_body.contains("45 min"));
        assert!(receipt.html_body.contains("Harbor &lt;Depot&gt;"));
        assert!(!receipt.html_body.contains("<Depot>"));
    }

    #[tokio::test]
    async fn resend_only_touches_delivery_metadata() {
        let (dispatcher, mailer, store) = setup(settled()).await;
        let before = store.get_transaction("tx-1").await.unwrap();

        assert!(dispatcher.send_receipt("tx-1").await.unwrap());
        assert!(dispatcher.send_receipt("tx-1").await.unwrap());

        let after = store.get_transaction("tx-1").await.unwrap();
        assert!(after.receipt_sent);
        assert!(after.receipt_sent_at.is_some());
        assert_eq!(after.amount, before.amount);
        assert_eq!(after.energy_delivered_kwh, before.energy_delivered_kwh);
        assert_eq!(after.status, before.status);
        assert_eq!(after.capture_id, before.capture_id);
        assert_eq!(mailer.sent().len(), 2);
    }

    #[tokio::test]
    async fn transport_failure_leaves_flag_unset() {
        let (dispatcher, mailer, store) = setup(settled()).await;
        mailer.set_failing(true);
        assert!(!dispatcher.send_receipt("tx-1").await.unwrap());
        assert!(!store.get_transaction("tx-1").await.unwrap().receipt_sent);
    }

    #[tokio::test]
    async fn pending_transactions_get_no_receipt() {
        let mut tx = settled();
        tx.status = TransactionStatus::Pending;
        let (dispatcher, mailer, _) = setup(tx).await;
        assert!(!dispatcher.send_receipt("tx-1").await.unwrap());
        assert!(mailer.sent().is_empty());
        assert!(matches!(
            dispatcher.send_receipt("missing").await,
            Err(ChargeError::NotFound { .. })
        ));
    }
}
