//! Session store
//!
//! Durable owner of session and transaction records. Every confirmed
//! session write is published on the change feed as a full snapshot, which
//! is what `subscribe_session` hands to readers.

use std::sync::Arc;

use serde::Serialize;
use tracing::debug;

use crate::domain::{
    ChargeError, ChargingSession, DomainResult, RepositoryProvider, RevenueSplit,
    SessionPatch, SessionStatus, Transaction, TransactionPatch,
};
use crate::notifications::{ChangeEvent, SessionSubscription, SharedChangeFeed};

use super::ledger::TransactionLedger;

/// A station-owner view of one transaction
#[derive(Debug, Clone, Serialize)]
pub struct StationTransaction {
    pub transaction: Transaction,
    /// Projected owner/platform split; absent until the charge succeeds
    pub revenue_split: Option<RevenueSplit>,
}

pub struct SessionStore {
    repos: Arc<dyn RepositoryProvider>,
    feed: SharedChangeFeed,
    ledger: TransactionLedger,
    owner_share_bps: u32,
}

impl SessionStore {
    pub fn new(repos: Arc<dyn RepositoryProvider>, feed: SharedChangeFeed) -> Self {
        Self {
            ledger: TransactionLedger::new(repos.clone(), feed.clone()),
            repos,
            feed,
            owner_share_bps: crate::domain::pricing::DEFAULT_OWNER_SHARE_BPS,
        }
    }

    pub fn with_owner_share_bps(mut self, bps: u32) -> Self {
        self.owner_share_bps = bps;
        self
    }

    pub fn repos(&self) -> &Arc<dyn RepositoryProvider> {
        &self.repos
    }

    pub fn feed(&self) -> &SharedChangeFeed {
        &self.feed
    }

    pub fn ledger(&self) -> &TransactionLedger {
        &self.ledger
    }

    // ── Sessions ───────────────────────────────────────────────

    pub async fn create_session(&self, session: ChargingSession) -> DomainResult<ChargingSession> {
        self.repos.sessions().insert(session.clone()).await?;
        debug!(session_id = %session.id, status = %session.status, "Session created");
        self.feed.publish(ChangeEvent::SessionUpdated(session.clone()));
        Ok(session)
    }

    pub async fn update_session(
        &self,
        id: &str,
        patch: SessionPatch,
    ) -> DomainResult<ChargingSession> {
        let stored = self.repos.sessions().update(id, patch).await?;
        self.feed.publish(ChangeEvent::SessionUpdated(stored.clone()));
        Ok(stored)
    }

    /// Status-changing write. Fails with `InvalidState` if the stored
    /// session is no longer in `expected`.
    pub async fn transition_session(
        &self,
        id: &str,
        expected: SessionStatus,
        patch: SessionPatch,
    ) -> DomainResult<ChargingSession> {
        let stored = self
            .repos
            .sessions()
            .update_if_status(id, expected, patch)
            .await?
            .ok_or_else(|| {
                ChargeError::InvalidState(format!(
                    "session {} is no longer {}",
                    id, expected
                ))
            })?;
        self.feed.publish(ChangeEvent::SessionUpdated(stored.clone()));
        Ok(stored)
    }

    pub async fn get_session(&self, id: &str) -> DomainResult<ChargingSession> {
        self.repos
            .sessions()
            .find_by_id(id)
            .await?
            .ok_or_else(|| ChargeError::not_found("ChargingSession", "id", id))
    }

    /// Current snapshot followed by every later snapshot of `id`. Dropping
    /// the subscription unsubscribes.
    pub async fn subscribe_session(&self, id: &str) -> DomainResult<SessionSubscription> {
        // Subscribe before reading so no write in between is missed
        let subscriber = self.feed.subscribe();
        let initial = self.get_session(id).await?;
        Ok(SessionSubscription::from_subscriber(subscriber, initial))
    }

    pub async fn user_sessions(&self, user_id: &str) -> DomainResult<Vec<ChargingSession>> {
        self.repos.sessions().find_by_user(user_id).await
    }

    // ── Transactions ───────────────────────────────────────────

    pub async fn create_transaction(&self, transaction: Transaction) -> DomainResult<Transaction> {
        self.repos.transactions().insert(transaction.clone()).await?;
        debug!(
            transaction_id = %transaction.id,
            session_id = %transaction.session_id,
            "Transaction created"
        );
        self.feed
            .publish(ChangeEvent::TransactionUpdated(transaction.clone()));
        Ok(transaction)
    }

    /// Partial update through the ledger, so status moves stay legal.
    pub async fn update_transaction(
        &self,
        id: &str,
        patch: TransactionPatch,
    ) -> DomainResult<Transaction> {
        self.ledger.apply(id, patch).await
    }

    pub async fn get_transaction(&self, id: &str) -> DomainResult<Transaction> {
        self.repos
            .transactions()
            .find_by_id(id)
            .await?
            .ok_or_else(|| ChargeError::not_found("Transaction", "id", id))
    }

    pub async fn transaction_for_session(&self, session_id: &str) -> DomainResult<Transaction> {
        self.repos
            .transactions()
            .find_by_session(session_id)
            .await?
            .ok_or_else(|| ChargeError::not_found("Transaction", "session_id", session_id))
    }

    pub async fn query_user_transactions(&self, user_id: &str) -> DomainResult<Vec<Transaction>> {
        self.repos.transactions().find_by_user(user_id).await
    }

    /// Transactions across every station owned by `owner_id`, newest first.
    pub async fn query_station_transactions(
        &self,
        owner_id: &str,
    ) -> DomainResult<Vec<StationTransaction>> {
        let stations = self.repos.stations().find_by_owner(owner_id).await?;
        let mut all = Vec::new();
        for station in stations {
            all.extend(self.repos.transactions().find_by_station(&station.id).await?);
        }
        all.sort_by_key(|tx| std::cmp::Reverse(tx.created_at));

        Ok(all
            .into_iter()
            .map(|transaction| StationTransaction {
                revenue_split: transaction.revenue_split(self.owner_share_bps),
                transaction,
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use rust_decimal::Decimal;

    use crate::domain::session::NewSession;
    use crate::domain::station::{Station, StationStatus};
    use crate::domain::transaction::NewTransaction;
    use crate::domain::{SessionStatus, TransactionStatus};
    use crate::infrastructure::storage::InMemoryRepositories;
    use crate::notifications::ChangeFeed;

    fn store() -> SessionStore {
        SessionStore::new(
            Arc::new(InMemoryRepositories::new()),
            Arc::new(ChangeFeed::new()),
        )
    }

    fn session(id: &str) -> ChargingSession {
        ChargingSession::new(NewSession {
            id: id.into(),
            user_id: "user-1".into(),
            station_id: "st-1".into(),
            authorization_id: format!("pi_{}", id),
            currency: "usd".into(),
            price_per_kwh: Decimal::from(28),
            authorized_amount: 2000,
        })
    }

    fn transaction(id: &str, station_id: &str) -> Transaction {
        Transaction::pending(NewTransaction {
            id: id.into(),
            session_id: format!("sess-{}", id),
            user_id: "user-1".into(),
            station_id: station_id.into(),
            station_name: "Depot".into(),
            station_owner_id: "owner-1".into(),
            amount: 1000,
            currency: "usd".into(),
            authorization_id: format!("pi_{}", id),
            payment_method_id: "pm_1".into(),
        })
    }

    #[tokio::test]
    async fn subscription_sees_snapshot_then_updates() {
        let store = store();
        store.create_session(session("sess-1")).await.unwrap();
        store.create_session(session("sess-2")).await.unwrap();

        let mut sub = store.subscribe_session("sess-1").await.unwrap();
        assert_eq!(sub.next().await.unwrap().status, SessionStatus::Authorized);

        // Other sessions are filtered out
        store
            .update_session(
                "sess-2",
                SessionPatch {
                    status: Some(SessionStatus::Cancelled),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        store
            .update_session(
                "sess-1",
                SessionPatch {
                    energy_delivered_kwh: Some(1.5),
                    ..Default::default()
                },
            )
            .await
            .unwrap();

        let next = sub.next().await.unwrap();
        assert_eq!(next.id, "sess-1");
        assert_eq!(next.energy_delivered_kwh, 1.5);
    }

    #[tokio::test]
    async fn subscribing_to_unknown_session_fails() {
        let store = store();
        assert!(matches!(
            store.subscribe_session("missing").await,
            Err(ChargeError::NotFound { .. })
        ));
        assert_eq!(store.feed().subscriber_count(), 0);
    }

    #[tokio::test]
    async fn station_owner_view_projects_split() {
        let store = store();
        let now = Utc::now();
        for id in ["st-1", "st-2"] {
            store
                .repos()
                .stations()
                .save(Station {
                    id: id.into(),
                    name: "Depot".into(),
                    owner_id: "owner-1".into(),
                    latitude: 0.0,
                    longitude: 0.0,
                    address: String::new(),
                    status: StationStatus::Available,
                    max_power_kw: 50.0,
                    price_per_kwh: Decimal::from(30),
                    currency: "usd".into(),
                    created_at: now,
                    updated_at: now,
                })
                .await
                .unwrap();
        }
        store.create_transaction(transaction("tx-1", "st-1")).await.unwrap();
        store.create_transaction(transaction("tx-2", "st-2")).await.unwrap();
        store
            .ledger()
            .transition(
                "tx-1",
                TransactionStatus::Succeeded,
                TransactionPatch {
                    capture_id: Some("ch_1".into()),
                    ..Default::default()
                },
            )
            .await
            .unwrap();

        let rows = store.query_station_transactions("owner-1").await.unwrap();
        assert_eq!(rows.len(), 2);
        let settled = rows.iter().find(|r| r.transaction.id == "tx-1").unwrap();
        let split = settled.revenue_split.unwrap();
        assert_eq!(split.owner_share, 700);
        assert_eq!(split.platform_share, 300);
        let pending = rows.iter().find(|r| r.transaction.id == "tx-2").unwrap();
        assert!(pending.revenue_split.is_none());

        assert!(store
            .query_station_transactions("someone-else")
            .await
            .unwrap()
            .is_empty());
    }
}
