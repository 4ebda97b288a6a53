//! SeaORM implementation of RepositoryProvider

use sea_orm::DatabaseConnection;

use crate::domain::customer::CustomerRepository;
use crate::domain::payment_method::PaymentMethodRepository;
use crate::domain::repositories::RepositoryProvider;
use crate::domain::session::SessionRepository;
use crate::domain::station::StationRepository;
use crate::domain::transaction::TransactionRepository;
use crate::domain::webhook::WebhookEventRepository;

use super::customer_repository::SeaOrmCustomerRepository;
use super::payment_method_repository::SeaOrmPaymentMethodRepository;
use super::session_repository::SeaOrmSessionRepository;
use super::station_repository::SeaOrmStationRepository;
use super::transaction_repository::SeaOrmTransactionRepository;
use super::webhook_event_repository::SeaOrmWebhookEventRepository;

/// Unified repository provider backed by SeaORM.
///
/// Holds one connection pool and exposes per-aggregate repository accessors.
///
/// ```ignore
/// let repos = SeaOrmRepositoryProvider::new(db.clone());
/// let session = repos.sessions().find_by_id("sess-1").await?;
/// let txs = repos.transactions().find_by_user("user-1").await?;
/// ```
pub struct SeaOrmRepositoryProvider {
    sessions: SeaOrmSessionRepository,
    transactions: SeaOrmTransactionRepository,
    stations: SeaOrmStationRepository,
    customers: SeaOrmCustomerRepository,
    payment_methods: SeaOrmPaymentMethodRepository,
    webhook_events: SeaOrmWebhookEventRepository,
}

impl SeaOrmRepositoryProvider {
    pub fn new(db: DatabaseConnection) -> Self {
        Self {
            sessions: SeaOrmSessionRepository::new(db.clone()),
            transactions: SeaOrmTransactionRepository::new(db.clone()),
            stations: SeaOrmStationRepository::new(db.clone()),
            customers: SeaOrmCustomerRepository::new(db.clone()),
            payment_methods: SeaOrmPaymentMethodRepository::new(db.clone()),
            webhook_events: SeaOrmWebhookEventRepository::new(db),
        }
    }
}

impl RepositoryProvider for SeaOrmRepositoryProvider {
    fn sessions(&self) -> &dyn SessionRepository {
        &self.sessions
    }

    fn transactions(&self) -> &dyn TransactionRepository {
        &self.transactions
    }

    fn stations(&self) -> &dyn StationRepository {
        &self.stations
    }

    fn customers(&self) -> &dyn CustomerRepository {
        &self.customers
    }

    fn payment_methods(&self) -> &dyn PaymentMethodRepository {
        &self.payment_methods
    }

    fn webhook_events(&self) -> &dyn WebhookEventRepository {
        &self.webhook_events
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::customer::CustomerRecord;
    use crate::domain::session::{ChargingSession, NewSession, SessionPatch, SessionStatus};
    use crate::domain::station::{Station, StationStatus};
    use crate::domain::transaction::{NewTransaction, Transaction, TransactionPatch, TransactionStatus};
    use crate::infrastructure::database::migrator::Migrator;
    use chrono::Utc;
    use rust_decimal::Decimal;
    use sea_orm::{ConnectOptions, Database};
    use sea_orm_migration::MigratorTrait;
    use std::str::FromStr;

    async fn provider() -> SeaOrmRepositoryProvider {
        let mut options = ConnectOptions::new("sqlite::memory:");
        options.max_connections(1).sqlx_logging(false);
        let db = Database::connect(options).await.unwrap();
        Migrator::up(&db, None).await.unwrap();
        SeaOrmRepositoryProvider::new(db)
    }

    fn station() -> Station {
        Station {
            id: "st-1".into(),
            name: "Depot A".into(),
            owner_id: "owner-1".into(),
            latitude: 41.3,
            longitude: 69.2,
            address: "1 Main St".into(),
            status: StationStatus::Available,
            max_power_kw: 7.4,
            price_per_kwh: Decimal::from_str("28.5").unwrap(),
            currency: "usd".into(),
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn session_and_transaction_round_trip() {
        let repos = provider().await;
        repos.stations().save(station()).await.unwrap();
        let stored = repos.stations().find_by_id("st-1").await.unwrap().unwrap();
        assert_eq!(stored.price_per_kwh, Decimal::from_str("28.5").unwrap());

        let session = ChargingSession::new(NewSession {
            id: "sess-1".into(),
            user_id: "u1".into(),
            station_id: "st-1".into(),
            authorization_id: "pi_1".into(),
            currency: "usd".into(),
            price_per_kwh: stored.price_per_kwh,
            authorized_amount: 2000,
        });
        repos.sessions().insert(session).await.unwrap();

        let updated = repos
            .sessions()
            .update(
                "sess-1",
                SessionPatch {
                    status: Some(SessionStatus::Active),
                    energy_delivered_kwh: Some(1.25),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(updated.status, SessionStatus::Active);
        assert_eq!(
            repos.sessions().find_by_status(SessionStatus::Active).await.unwrap().len(),
            1
        );

        repos
            .transactions()
            .insert(Transaction::pending(NewTransaction {
                id: "tx-1".into(),
                session_id: "sess-1".into(),
                user_id: "u1".into(),
                station_id: "st-1".into(),
                station_name: "Depot A".into(),
                station_owner_id: "owner-1".into(),
                amount: 2000,
                currency: "usd".into(),
                authorization_id: "pi_1".into(),
                payment_method_id: "pm_1".into(),
            }))
            .await
            .unwrap();

        let patch = TransactionPatch {
            status: Some(TransactionStatus::Succeeded),
            amount: Some(510),
            capture_id: Some("ch_1".into()),
            ..Default::default()
        };
        let done = repos
            .transactions()
            .update_if_status("tx-1", TransactionStatus::Pending, patch.clone())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(done.amount, 510);

        // Stale expectation loses
        let stale = repos
            .transactions()
            .update_if_status("tx-1", TransactionStatus::Pending, patch)
            .await
            .unwrap();
        assert!(stale.is_none());
    }

    #[tokio::test]
    async fn session_status_write_requires_expected_status() {
        let repos = provider().await;
        repos.stations().save(station()).await.unwrap();
        repos
            .sessions()
            .insert(ChargingSession::new(NewSession {
                id: "sess-2".into(),
                user_id: "u1".into(),
                station_id: "st-1".into(),
                authorization_id: "pi_2".into(),
                currency: "usd".into(),
                price_per_kwh: Decimal::from(28),
                authorized_amount: 2000,
            }))
            .await
            .unwrap();

        let completed = SessionPatch {
            status: Some(SessionStatus::Completed),
            final_amount: Some(510),
            ..Default::default()
        };
        let done = repos
            .sessions()
            .update_if_status("sess-2", SessionStatus::Authorized, completed)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(done.status, SessionStatus::Completed);

        // A writer still holding the old status must not clobber the result
        let errored = SessionPatch {
            status: Some(SessionStatus::Error),
            error_message: Some("late".into()),
            ..Default::default()
        };
        let lost = repos
            .sessions()
            .update_if_status("sess-2", SessionStatus::Authorized, errored)
            .await
            .unwrap();
        assert!(lost.is_none());

        let stored = repos.sessions().find_by_id("sess-2").await.unwrap().unwrap();
        assert_eq!(stored.status, SessionStatus::Completed);
        assert_eq!(stored.final_amount, Some(510));
        assert_eq!(stored.error_message, None);
    }

    #[tokio::test]
    async fn customer_mapping_first_writer_wins() {
        let repos = provider().await;
        let a = repos
            .customers()
            .insert_if_absent(CustomerRecord::new("u1", "cus_a", "a@example.com"))
            .await
            .unwrap();
        let b = repos
            .customers()
            .insert_if_absent(CustomerRecord::new("u1", "cus_b", "a@example.com"))
            .await
            .unwrap();
        assert_eq!(a.customer_id, "cus_a");
        assert_eq!(b.customer_id, "cus_a");
    }

    #[tokio::test]
    async fn webhook_event_dedup() {
        let repos = provider().await;
        assert!(repos
            .webhook_events()
            .record_if_new("evt_1", "payment_intent.succeeded")
            .await
            .unwrap());
        assert!(!repos
            .webhook_events()
            .record_if_new("evt_1", "payment_intent.succeeded")
            .await
            .unwrap());
    }
}
