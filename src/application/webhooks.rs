//! Payment-processor webhooks
//!
//! Alternate entry point for transaction status: the processor reports
//! asynchronous outcomes here, and they go through the same ledger
//! transition as the coordinator's direct calls. Events are verified,
//! deduplicated by event id, then mapped.

use std::sync::Arc;

use chrono::Utc;
use serde::Deserialize;
use tracing::{debug, info, warn};

use crate::domain::{
    ChargeError, DomainResult, Transaction, TransactionPatch, TransactionStatus,
};
use crate::infrastructure::crypto::webhook_signature;

use super::store::SessionStore;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WebhookOutcome {
    Processed,
    Duplicate,
    /// Verified but not relevant (unknown type, unknown authorization, or
    /// the transaction has already moved past the reported state)
    Ignored,
}

#[derive(Debug, Deserialize)]
struct Event {
    id: String,
    #[serde(rename = "type")]
    kind: String,
    data: EventData,
}

#[derive(Debug, Deserialize)]
struct EventData {
    object: EventObject,
}

#[derive(Debug, Default, Deserialize)]
struct EventObject {
    id: String,
    /// Set on charge objects
    #[serde(default)]
    payment_intent: Option<String>,
    #[serde(default)]
    latest_charge: Option<String>,
    #[serde(default)]
    amount_received: Option<i64>,
    #[serde(default)]
    amount_refunded: Option<i64>,
    #[serde(default)]
    refunds: Option<RefundList>,
    #[serde(default)]
    last_payment_error: Option<PaymentError>,
}

#[derive(Debug, Default, Deserialize)]
struct RefundList {
    #[serde(default)]
    data: Vec<RefundItem>,
}

#[derive(Debug, Deserialize)]
struct RefundItem {
    id: String,
}

#[derive(Debug, Deserialize)]
struct PaymentError {
    #[serde(default)]
    message: Option<String>,
}

pub struct PaymentWebhookHandler {
    store: Arc<SessionStore>,
    secret: String,
    tolerance_secs: i64,
}

impl PaymentWebhookHandler {
    pub fn new(store: Arc<SessionStore>, secret: String, tolerance_secs: i64) -> Self {
        Self {
            store,
            secret,
            tolerance_secs,
        }
    }

    /// Verify and apply one delivery. Signature and parse failures are
    /// `InvalidArgument`; everything after verification is best-effort.
    pub async fn handle(
        &self,
        signature: Option<&str>,
        payload: &[u8],
    ) -> DomainResult<WebhookOutcome> {
        let header = signature
            .ok_or_else(|| ChargeError::InvalidArgument("missing signature header".into()))?;
        webhook_signature::verify(
            &self.secret,
            header,
            payload,
            Utc::now().timestamp(),
            self.tolerance_secs,
        )
        .map_err(|e| {
            warn!(error = %e, "Webhook signature verification failed");
            ChargeError::InvalidArgument(format!("webhook signature: {}", e))
        })?;

        let event: Event = serde_json::from_slice(payload)
            .map_err(|e| ChargeError::InvalidArgument(format!("webhook payload: {}", e)))?;

        if !self
            .store
            .repos()
            .webhook_events()
            .record_if_new(&event.id, &event.kind)
            .await?
        {
            info!(event_id = %event.id, "Duplicate webhook event, skipping");
            return Ok(WebhookOutcome::Duplicate);
        }

        let outcome = self.route(&event).await?;
        debug!(event_id = %event.id, event_type = %event.kind, ?outcome, "Webhook handled");
        Ok(outcome)
    }

    async fn route(&self, event: &Event) -> DomainResult<WebhookOutcome> {
        let object = &event.data.object;
        match event.kind.as_str() {
            "payment_intent.succeeded" => {
                let capture_id = object
                    .latest_charge
                    .clone()
                    .unwrap_or_else(|| object.id.clone());
                let patch = TransactionPatch {
                    capture_id: Some(capture_id),
                    amount: object.amount_received.filter(|a| *a > 0),
                    ..Default::default()
                };
                self.apply(&object.id, TransactionStatus::Succeeded, patch).await
            }
            "payment_intent.canceled" => {
                self.apply(&object.id, TransactionStatus::Cancelled, TransactionPatch::default())
                    .await
            }
            "payment_intent.payment_failed" => {
                let note = object
                    .last_payment_error
                    .as_ref()
                    .and_then(|e| e.message.clone())
                    .unwrap_or_else(|| "payment failed".to_string());
                let patch = TransactionPatch {
                    needs_reconciliation: Some(true),
                    reconciliation_note: Some(note),
                    ..Default::default()
                };
                self.apply(&object.id, TransactionStatus::Failed, patch).await
            }
            "charge.refunded" => {
                let Some(intent) = object.payment_intent.as_deref() else {
                    warn!(event_id = %event.id, "Refund event without payment intent");
                    return Ok(WebhookOutcome::Ignored);
                };
                let patch = TransactionPatch {
                    refund_id: object
                        .refunds
                        .as_ref()
                        .and_then(|r| r.data.first())
                        .map(|r| r.id.clone()),
                    refund_amount: object.amount_refunded,
                    refunded_at: Some(Utc::now()),
                    ..Default::default()
                };
                self.apply(intent, TransactionStatus::Refunded, patch).await
            }
            other => {
                debug!(event_type = other, "Unhandled webhook event type");
                Ok(WebhookOutcome::Ignored)
            }
        }
    }

    async fn apply(
        &self,
        authorization_id: &str,
        next: TransactionStatus,
        patch: TransactionPatch,
    ) -> DomainResult<WebhookOutcome> {
        let Some(tx) = self
            .store
            .repos()
            .transactions()
            .find_by_authorization(authorization_id)
            .await?
        else {
            info!(authorization_id, "Webhook for unknown authorization");
            return Ok(WebhookOutcome::Ignored);
        };

        if is_stale(&tx, next) {
            info!(
                transaction_id = %tx.id,
                status = %tx.status,
                reported = %next,
                "Webhook reports a state the transaction has moved past"
            );
            return Ok(WebhookOutcome::Ignored);
        }

        self.store.ledger().transition(&tx.id, next, patch).await?;
        Ok(WebhookOutcome::Processed)
    }
}

/// Whether the transaction is already beyond `reported` (late delivery).
fn is_stale(tx: &Transaction, reported: TransactionStatus) -> bool {
    use TransactionStatus::*;
    matches!(
        (tx.status, reported),
        (Refunded, Succeeded) | (Refunded, Failed) | (Succeeded, Failed) | (Succeeded, Cancelled)
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    use crate::domain::transaction::NewTransaction;
    use crate::domain::RepositoryProvider;
    use crate::infrastructure::crypto::webhook_signature::signature_header;
    use crate::infrastructure::storage::InMemoryRepositories;
    use crate::notifications::ChangeFeed;

    const SECRET: &str = "whsec_test";

    async fn setup() -> (PaymentWebhookHandler, Arc<SessionStore>) {
        let repos = Arc::new(InMemoryRepositories::new());
        repos
            .transactions()
            .insert(Transaction::pending(NewTransaction {
                id: "tx-1".into(),
                session_id: "sess-1".into(),
                user_id: "user-1".into(),
                station_id: "st-1".into(),
                station_name: "Depot".into(),
                station_owner_id: "owner-1".into(),
                amount: 2000,
                currency: "usd".into(),
                authorization_id: "pi_1".into(),
                payment_method_id: "pm_1".into(),
            }))
            .await
            .unwrap();
        let store = Arc::new(SessionStore::new(repos, Arc::new(ChangeFeed::new())));
        (
            PaymentWebhookHandler::new(store.clone(), SECRET.into(), 300),
            store,
        )
    }

    fn signed(body: &serde_json::Value) -> (String, Vec<u8>) {
        let payload = serde_json::to_vec(body).unwrap();
        (signature_header(SECRET, Utc::now().timestamp(), &payload), payload)
    }

    fn succeeded(event_id: &str) -> serde_json::Value {
        json!({
            "id": event_id,
            "type": "payment_intent.succeeded",
            "data": { "object": { "id": "pi_1", "latest_charge": "ch_1", "amount_received": 510 } }
        })
    }

    #[tokio::test]
    async fn succeeded_event_settles_transaction() {
        let (handler, store) = setup().await;
        let (sig, body) = signed(&succeeded("evt_1"));
        assert_eq!(
            handler.handle(Some(&sig), &body).await.unwrap(),
            WebhookOutcome::Processed
        );
        let tx = store.get_transaction("tx-1").await.unwrap();
        assert_eq!(tx.status, TransactionStatus::Succeeded);
        assert_eq!(tx.capture_id.as_deref(), Some("ch_1"));
        assert_eq!(tx.amount, 510);
    }

    #[tokio::test]
    async fn duplicate_events_are_skipped() {
        let (handler, _) = setup().await;
        let (sig, body) = signed(&succeeded("evt_1"));
        handler.handle(Some(&sig), &body).await.unwrap();
        assert_eq!(
            handler.handle(Some(&sig), &body).await.unwrap(),
            WebhookOutcome::Duplicate
        );
    }

    #[tokio::test]
    async fn bad_signature_is_rejected() {
        let (handler, store) = setup().await;
        let (_, body) = signed(&succeeded("evt_1"));
        let forged = signature_header("wrong", Utc::now().timestamp(), &body);
        assert!(matches!(
            handler.handle(Some(&forged), &body).await,
            Err(ChargeError::InvalidArgument(_))
        ));
        assert!(handler.handle(None, &body).await.is_err());
        assert_eq!(
            store.get_transaction("tx-1").await.unwrap().status,
            TransactionStatus::Pending
        );
    }

    #[tokio::test]
    async fn late_failure_after_success_is_ignored() {
        let (handler, store) = setup().await;
        let (sig, body) = signed(&succeeded("evt_1"));
        handler.handle(Some(&sig), &body).await.unwrap();

        let (sig, body) = signed(&json!({
            "id": "evt_2",
            "type": "payment_intent.payment_failed",
            "data": { "object": { "id": "pi_1", "last_payment_error": { "message": "declined" } } }
        }));
        assert_eq!(
            handler.handle(Some(&sig), &body).await.unwrap(),
            WebhookOutcome::Ignored
        );
        assert_eq!(
            store.get_transaction("tx-1").await.unwrap().status,
            TransactionStatus::Succeeded
        );
    }

    #[tokio::test]
    async fn refund_event_records_refund() {
        let (handler, store) = setup().await;
        let (sig, body) = signed(&succeeded("evt_1"));
        handler.handle(Some(&sig), &body).await.unwrap();

        let (sig, body) = signed(&json!({
            "id": "evt_3",
            "type": "charge.refunded",
            "data": { "object": {
                "id": "ch_1",
                "payment_intent": "pi_1",
                "amount_refunded": 510,
                "refunds": { "data": [ { "id": "re_1" } ] }
            } }
        }));
        handler.handle(Some(&sig), &body).await.unwrap();
        let tx = store.get_transaction("tx-1").await.unwrap();
        assert_eq!(tx.status, TransactionStatus::Refunded);
        assert_eq!(tx.refund_id.as_deref(), Some("re_1"));
        assert_eq!(tx.refund_amount, Some(510));
    }

    #[tokio::test]
    async fn unknown_types_and_authorizations_are_ignored() {
        let (handler, _) = setup().await;
        let (sig, body) = signed(&json!({
            "id": "evt_4", "type": "customer.created", "data": { "object": { "id": "cus_1" } }
        }));
        assert_eq!(
            handler.handle(Some(&sig), &body).await.unwrap(),
            WebhookOutcome::Ignored
        );
        let (sig, body) = signed(&json!({
            "id": "evt_5", "type": "payment_intent.canceled", "data": { "object": { "id": "pi_other" } }
        }));
        assert_eq!(
            handler.handle(Some(&sig), &body).await.unwrap(),
            WebhookOutcome::Ignored
        );
    }
}
