//! Post-completion refunds

use std::sync::Arc;

use chrono::Utc;
use tracing::info;

use crate::domain::{ChargeError, DomainResult, Transaction, TransactionPatch, TransactionStatus};

use super::gateway::PaymentGatewayClient;
use super::store::SessionStore;

pub struct RefundService {
    gateway: Arc<PaymentGatewayClient>,
    store: Arc<SessionStore>,
}

impl RefundService {
    pub fn new(gateway: Arc<PaymentGatewayClient>, store: Arc<SessionStore>) -> Self {
        Self { gateway, store }
    }

    /// Refund `amount` (default: everything captured) of a succeeded
    /// transaction and move it to `refunded`.
    pub async fn refund(
        &self,
        transaction_id: &str,
        amount: Option<i64>,
        reason: &str,
    ) -> DomainResult<Transaction> {
        let tx = self.store.get_transaction(transaction_id).await?;
        if tx.status != TransactionStatus::Succeeded {
            return Err(ChargeError::InvalidState(format!(
                "transaction {} is {}; only succeeded transactions can be refunded",
                tx.id, tx.status
            )));
        }
        let amount = amount.unwrap_or(tx.amount);
        if amount <= 0 || amount > tx.amount {
            return Err(ChargeError::InvalidArgument(format!(
                "refund amount {} must be between 1 and {}",
                amount, tx.amount
            )));
        }

        let outcome = self
            .gateway
            .refund(
                &tx.authorization_id,
                Some(amount),
                reason,
                &format!("{}:refund", tx.id),
            )
            .await?;

        let updated = self
            .store
            .ledger()
            .transition(
                &tx.id,
                TransactionStatus::Refunded,
                TransactionPatch {
                    refund_id: Some(outcome.refund_id.clone()),
                    refund_amount: Some(outcome.refunded_amount),
                    refunded_at: Some(Utc::now()),
                    ..Default::default()
                },
            )
            .await?;
        info!(
            transaction_id = %tx.id,
            refund_id = %outcome.refund_id,
            amount = outcome.refunded_amount,
            "Transaction refunded"
        );
        Ok(updated)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    use crate::domain::transaction::NewTransaction;
    use crate::domain::RepositoryProvider;
    use crate::infrastructure::payments::SimulatedProcessor;
    use crate::infrastructure::storage::InMemoryRepositories;
    use crate::notifications::ChangeFeed;

    async fn setup(capture: bool) -> RefundService {
        let repos = Arc::new(InMemoryRepositories::new());
        let processor = Arc::new(SimulatedProcessor::new());
        let gateway = Arc::new(PaymentGatewayClient::new(processor, repos.clone(), 50));
        let store = Arc::new(SessionStore::new(repos.clone(), Arc::new(ChangeFeed::new())));

        let auth = gateway
            .authorize("cus_1", "pm_1", 2000, "usd", HashMap::new(), "sess-1:authorize")
            .await
            .unwrap();
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
                authorization_id: auth.authorization_id.clone(),
                payment_method_id: "pm_1".into(),
            }))
            .await
            .unwrap();
        if capture {
            let outcome = gateway
                .capture(&auth.authorization_id, Some(510), "sess-1:capture")
                .await
                .unwrap();
            store
                .ledger()
                .transition(
                    "tx-1",
                    TransactionStatus::Succeeded,
                    TransactionPatch {
                        amount: Some(outcome.captured_amount),
                        capture_id: Some(outcome.capture_id),
                        ..Default::default()
                    },
                )
                .await
                .unwrap();
        }
        RefundService::new(gateway, store)
    }

    #[tokio::test]
    async fn partial_refund_records_metadata() {
        let service = setup(true).await;
        let tx = service.refund("tx-1", Some(200), "requested_by_customer").await.unwrap();
        assert_eq!(tx.status, TransactionStatus::Refunded);
        assert_eq!(tx.refund_amount, Some(200));
        assert!(tx.refund_id.is_some());
        assert_eq!(tx.amount, 510);

        // Frozen once refunded
        let err = service.refund("tx-1", Some(100), "again").await.unwrap_err();
        assert!(matches!(err, ChargeError::InvalidState(_)));
    }

    #[tokio::test]
    async fn refund_cannot_exceed_amount() {
        let service = setup(true).await;
        let err = service.refund("tx-1", Some(511), "too much").await.unwrap_err();
        assert!(matches!(err, ChargeError::InvalidArgument(_)));
    }

    #[tokio::test]
    async fn pending_transactions_cannot_be_refunded() {
        let service = setup(false).await;
        let err = service.refund("tx-1", None, "early").await.unwrap_err();
        assert!(matches!(err, ChargeError::InvalidState(_)));
    }
}
