//! Authoritative transaction status transitions
//!
//! Both the coordinator and the webhook path write transaction status
//! through [`TransactionLedger::apply`]. It is a compare-and-set loop: read
//! the current row, validate the patch against it, then write only if the
//! stored status is still the one that was read.

use std::sync::Arc;

use tracing::{debug, error};

use crate::domain::{
    ChargeError, DomainResult, RepositoryProvider, Transaction, TransactionPatch,
    TransactionStatus,
};
use crate::notifications::{ChangeEvent, SharedChangeFeed};

const MAX_ATTEMPTS: usize = 3;

pub struct TransactionLedger {
    repos: Arc<dyn RepositoryProvider>,
    feed: SharedChangeFeed,
}

impl TransactionLedger {
    pub fn new(repos: Arc<dyn RepositoryProvider>, feed: SharedChangeFeed) -> Self {
        Self { repos, feed }
    }

    /// Move `id` to `next`, carrying `patch` along. Moving to the current
    /// status is a no-op for the status field.
    pub async fn transition(
        &self,
        id: &str,
        next: TransactionStatus,
        mut patch: TransactionPatch,
    ) -> DomainResult<Transaction> {
        patch.status = Some(next);
        self.apply(id, patch).await
    }

    pub async fn apply(&self, id: &str, patch: TransactionPatch) -> DomainResult<Transaction> {
        for attempt in 1..=MAX_ATTEMPTS {
            let current = self
                .repos
                .transactions()
                .find_by_id(id)
                .await?
                .ok_or_else(|| ChargeError::not_found("Transaction", "id", id))?;

            let mut preview = current.clone();
            if let Err(e) = preview.apply_patch(&patch) {
                error!(
                    transaction_id = id,
                    status = %current.status,
                    requested = ?patch.status,
                    error = %e,
                    "Rejected transaction transition"
                );
                return Err(e);
            }

            match self
                .repos
                .transactions()
                .update_if_status(id, current.status, patch.clone())
                .await?
            {
                Some(updated) => {
                    debug!(
                        transaction_id = id,
                        from = %current.status,
                        to = %updated.status,
                        "Transaction updated"
                    );
                    self.feed
                        .publish(ChangeEvent::TransactionUpdated(updated.clone()));
                    return Ok(updated);
                }
                None => {
                    debug!(transaction_id = id, attempt, "Status changed concurrently, retrying");
                }
            }
        }

        let err = ChargeError::InvalidState(format!(
            "transaction {} kept changing status; gave up after {} attempts",
            id, MAX_ATTEMPTS
        ));
        error!(transaction_id = id, error = %err, "Transaction transition contention");
        Err(err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::transaction::NewTransaction;
    use crate::infrastructure::storage::InMemoryRepositories;
    use crate::notifications::ChangeFeed;

    async fn setup() -> (TransactionLedger, Arc<InMemoryRepositories>) {
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
        let ledger = TransactionLedger::new(repos.clone(), Arc::new(ChangeFeed::new()));
        (ledger, repos)
    }

    fn captured(id: &str) -> TransactionPatch {
        TransactionPatch {
            capture_id: Some(id.to_string()),
            amount: Some(510),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn same_state_transition_is_a_no_op() {
        let (ledger, _) = setup().await;
        ledger
            .transition("tx-1", TransactionStatus::Succeeded, captured("ch_1"))
            .await
            .unwrap();
        // Webhook confirmation arriving after the direct capture
        let again = ledger
            .transition("tx-1", TransactionStatus::Succeeded, captured("ch_1"))
            .await
            .unwrap();
        assert_eq!(again.status, TransactionStatus::Succeeded);
        assert_eq!(again.amount, 510);
    }

    #[tokio::test]
    async fn illegal_moves_are_rejected() {
        let (ledger, repos) = setup().await;
        ledger
            .transition("tx-1", TransactionStatus::Cancelled, TransactionPatch::default())
            .await
            .unwrap();
        let err = ledger
            .transition("tx-1", TransactionStatus::Succeeded, captured("ch_1"))
            .await
            .unwrap_err();
        assert!(matches!(err, ChargeError::InvalidState(_)));
        let stored = repos.transactions().find_by_id("tx-1").await.unwrap().unwrap();
        assert_eq!(stored.status, TransactionStatus::Cancelled);
    }

    #[tokio::test]
    async fn success_requires_capture_id() {
        let (ledger, _) = setup().await;
        let err = ledger
            .transition("tx-1", TransactionStatus::Succeeded, TransactionPatch::default())
            .await
            .unwrap_err();
        assert!(matches!(err, ChargeError::InvalidState(_)));
    }

    #[tokio::test]
    async fn missing_transaction_is_not_found() {
        let (ledger, _) = setup().await;
        let err = ledger
            .transition("nope", TransactionStatus::Failed, TransactionPatch::default())
            .await
            .unwrap_err();
        assert!(matches!(err, ChargeError::NotFound { .. }));
    }
}
