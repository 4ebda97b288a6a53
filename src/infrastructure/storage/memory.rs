//! In-memory repository provider

use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use chrono::Utc;
use dashmap::DashMap;

use crate::domain::customer::{CustomerRecord, CustomerRepository};
use crate::domain::payment_method::{PaymentMethod, PaymentMethodRepository};
use crate::domain::session::{ChargingSession, SessionPatch, SessionRepository, SessionStatus};
use crate::domain::station::{Station, StationRepository, StationStatus};
use crate::domain::transaction::{
    Transaction, TransactionPatch, TransactionRepository, TransactionStatus,
};
use crate::domain::webhook::WebhookEventRepository;
use crate::domain::{ChargeError, DomainResult, RepositoryProvider};

/// In-memory storage for development and testing
#[derive(Default)]
pub struct InMemoryRepositories {
    sessions: DashMap<String, ChargingSession>,
    transactions: DashMap<String, Transaction>,
    stations: DashMap<String, Station>,
    customers: DashMap<String, CustomerRecord>,
    payment_methods: DashMap<String, PaymentMethod>,
    webhook_events: DashMap<String, String>,
    fail_session_writes: AtomicBool,
}

impl InMemoryRepositories {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every session insert/update fail with a persistence error.
    pub fn set_fail_session_writes(&self, fail: bool) {
        self.fail_session_writes.store(fail, Ordering::SeqCst);
    }

    fn check_session_writes(&self) -> DomainResult<()> {
        if self.fail_session_writes.load(Ordering::SeqCst) {
            return Err(ChargeError::Persistence("session store unavailable".into()));
        }
        Ok(())
    }
}

fn newest_first<T>(mut items: Vec<T>, key: impl Fn(&T) -> chrono::DateTime<Utc>) -> Vec<T> {
    items.sort_by_key(|item| std::cmp::Reverse(key(item)));
    items
}

#[async_trait]
impl SessionRepository for InMemoryRepositories {
    async fn insert(&self, session: ChargingSession) -> DomainResult<()> {
        self.check_session_writes()?;
        if self.sessions.contains_key(&session.id) {
            return Err(ChargeError::Persistence(format!(
                "session {} already exists",
                session.id
            )));
        }
        self.sessions.insert(session.id.clone(), session);
        Ok(())
    }

    async fn find_by_id(&self, id: &str) -> DomainResult<Option<ChargingSession>> {
        Ok(self.sessions.get(id).map(|s| s.clone()))
    }

    async fn update(&self, id: &str, patch: SessionPatch) -> DomainResult<ChargingSession> {
        self.check_session_writes()?;
        let mut entry = self
            .sessions
            .get_mut(id)
            .ok_or_else(|| ChargeError::not_found("Session", "id", id))?;
        patch.apply(&mut entry);
        Ok(entry.clone())
    }

    async fn find_by_user(&self, user_id: &str) -> DomainResult<Vec<ChargingSession>> {
        let items = self
            .sessions
            .iter()
            .filter(|e| e.user_id == user_id)
            .map(|e| e.value().clone())
            .collect();
        Ok(newest_first(items, |s| s.created_at))
    }

    async fn find_by_status(&self, status: SessionStatus) -> DomainResult<Vec<ChargingSession>> {
        Ok(self
            .sessions
            .iter()
            .filter(|e| e.status == status)
            .map(|e| e.value().clone())
            .collect())
    }

    async fn update_if_status(
        &self,
        id: &str,
        expected: SessionStatus,
        patch: SessionPatch,
    ) -> DomainResult<Option<ChargingSession>> {
        self.check_session_writes()?;
        let mut entry = self
            .sessions
            .get_mut(id)
            .ok_or_else(|| ChargeError::not_found("Session", "id", id))?;
        if entry.status != expected {
            return Ok(None);
        }
        patch.apply(&mut entry);
        Ok(Some(entry.clone()))
    }
}

#[async_trait]
impl TransactionRepository for InMemoryRepositories {
    async fn insert(&self, transaction: Transaction) -> DomainResult<()> {
        if self.transactions.contains_key(&transaction.id) {
            return Err(ChargeError::Persistence(format!(
                "transaction {} already exists",
                transaction.id
            )));
        }
        self.transactions.insert(transaction.id.clone(), transaction);
        Ok(())
    }

    async fn find_by_id(&self, id: &str) -> DomainResult<Option<Transaction>> {
        Ok(self.transactions.get(id).map(|t| t.clone()))
    }

    async fn find_by_session(&self, session_id: &str) -> DomainResult<Option<Transaction>> {
        Ok(self
            .transactions
            .iter()
            .find(|e| e.session_id == session_id)
            .map(|e| e.value().clone()))
    }

    async fn find_by_authorization(
        &self,
        authorization_id: &str,
    ) -> DomainResult<Option<Transaction>> {
        Ok(self
            .transactions
            .iter()
            .find(|e| e.authorization_id == authorization_id)
            .map(|e| e.value().clone()))
    }

    async fn find_by_user(&self, user_id: &str) -> DomainResult<Vec<Transaction>> {
        let items = self
            .transactions
            .iter()
            .filter(|e| e.user_id == user_id)
            .map(|e| e.value().clone())
            .collect();
        Ok(newest_first(items, |t| t.created_at))
    }

    async fn find_by_station(&self, station_id: &str) -> DomainResult<Vec<Transaction>> {
        let items = self
            .transactions
            .iter()
            .filter(|e| e.station_id == station_id)
            .map(|e| e.value().clone())
            .collect();
        Ok(newest_first(items, |t| t.created_at))
    }

    async fn find_needing_reconciliation(&self) -> DomainResult<Vec<Transaction>> {
        Ok(self
            .transactions
            .iter()
            .filter(|e| e.needs_reconciliation)
            .map(|e| e.value().clone())
            .collect())
    }

    async fn update_if_status(
        &self,
        id: &str,
        expected: TransactionStatus,
        patch: TransactionPatch,
    ) -> DomainResult<Option<Transaction>> {
        let mut entry = self
            .transactions
            .get_mut(id)
            .ok_or_else(|| ChargeError::not_found("Transaction", "id", id))?;
        if entry.status != expected {
            return Ok(None);
        }
        let mut updated = entry.clone();
        updated.apply_patch(&patch)?;
        *entry = updated.clone();
        Ok(Some(updated))
    }
}

#[async_trait]
impl StationRepository for InMemoryRepositories {
    async fn save(&self, station: Station) -> DomainResult<()> {
        self.stations.insert(station.id.clone(), station);
        Ok(())
    }

    async fn find_by_id(&self, id: &str) -> DomainResult<Option<Station>> {
        Ok(self.stations.get(id).map(|s| s.clone()))
    }

    async fn find_all(&self) -> DomainResult<Vec<Station>> {
        Ok(self.stations.iter().map(|e| e.value().clone()).collect())
    }

    async fn find_by_owner(&self, owner_id: &str) -> DomainResult<Vec<Station>> {
        Ok(self
            .stations
            .iter()
            .filter(|e| e.owner_id == owner_id)
            .map(|e| e.value().clone())
            .collect())
    }

    async fn update_status(&self, id: &str, status: StationStatus) -> DomainResult<()> {
        let mut station = self
            .stations
            .get_mut(id)
            .ok_or_else(|| ChargeError::not_found("Station", "id", id))?;
        station.status = status;
        station.updated_at = Utc::now();
        Ok(())
    }
}

#[async_trait]
impl CustomerRepository for InMemoryRepositories {
    async fn find_by_user(&self, user_id: &str) -> DomainResult<Option<CustomerRecord>> {
        Ok(self.customers.get(user_id).map(|c| c.clone()))
    }

    async fn insert_if_absent(&self, record: CustomerRecord) -> DomainResult<CustomerRecord> {
        let stored = self
            .customers
            .entry(record.user_id.clone())
            .or_insert(record)
            .clone();
        Ok(stored)
    }
}

#[async_trait]
impl PaymentMethodRepository for InMemoryRepositories {
    async fn upsert(&self, method: PaymentMethod) -> DomainResult<()> {
        self.payment_methods.insert(method.id.clone(), method);
        Ok(())
    }

    async fn find_by_id(&self, id: &str) -> DomainResult<Option<PaymentMethod>> {
        Ok(self.payment_methods.get(id).map(|m| m.clone()))
    }

    async fn find_by_user(&self, user_id: &str) -> DomainResult<Vec<PaymentMethod>> {
        let items = self
            .payment_methods
            .iter()
            .filter(|e| e.user_id == user_id)
            .map(|e| e.value().clone())
            .collect();
        Ok(newest_first(items, |m| m.created_at))
    }

    async fn find_default(&self, user_id: &str) -> DomainResult<Option<PaymentMethod>> {
        Ok(self
            .payment_methods
            .iter()
            .find(|e| e.user_id == user_id && e.is_default)
            .map(|e| e.value().clone()))
    }

    async fn set_default(&self, user_id: &str, id: &str) -> DomainResult<()> {
        match self.payment_methods.get(id) {
            Some(m) if m.user_id == user_id => {}
            _ => return Err(ChargeError::not_found("PaymentMethod", "id", id)),
        }
        for mut entry in self.payment_methods.iter_mut() {
            if entry.user_id == user_id {
                let is_target = entry.id == id;
                entry.is_default = is_target;
            }
        }
        Ok(())
    }

    async fn delete(&self, id: &str) -> DomainResult<()> {
        self.payment_methods
            .remove(id)
            .ok_or_else(|| ChargeError::not_found("PaymentMethod", "id", id))?;
        Ok(())
    }
}

#[async_trait]
impl WebhookEventRepository for InMemoryRepositories {
    async fn record_if_new(&self, event_id: &str, event_type: &str) -> DomainResult<bool> {
        match self.webhook_events.entry(event_id.to_string()) {
            dashmap::mapref::entry::Entry::Occupied(_) => Ok(false),
            dashmap::mapref::entry::Entry::Vacant(slot) => {
                slot.insert(event_type.to_string());
                Ok(true)
            }
        }
    }
}

impl RepositoryProvider for InMemoryRepositories {
    fn sessions(&self) -> &dyn SessionRepository {
        self
    }
    fn transactions(&self) -> &dyn TransactionRepository {
        self
    }
    fn stations(&self) -> &dyn StationRepository {
        self
    }
    fn customers(&self) -> &dyn CustomerRepository {
        self
    }
    fn payment_methods(&self) -> &dyn PaymentMethodRepository {
        self
    }
    fn webhook_events(&self) -> &dyn WebhookEventRepository {
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn method(id: &str, user: &str, default: bool) -> PaymentMethod {
        PaymentMethod {
            id: id.into(),
            user_id: user.into(),
            customer_id: format!("cus_{}", user),
            brand: "visa".into(),
            last4: "4242".into(),
            exp_month: 12,
            exp_year: 2030,
            is_default: default,
            created_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn set_default_leaves_exactly_one() {
        let repos = InMemoryRepositories::new();
        let pm = repos.payment_methods();
        pm.upsert(method("pm_1", "u1", true)).await.unwrap();
        pm.upsert(method("pm_2", "u1", false)).await.unwrap();
        pm.upsert(method("pm_3", "u2", true)).await.unwrap();

        pm.set_default("u1", "pm_2").await.unwrap();

        let defaults: Vec<_> = pm
            .find_by_user("u1")
            .await
            .unwrap()
            .into_iter()
            .filter(|m| m.is_default)
            .collect();
        assert_eq!(defaults.len(), 1);
        assert_eq!(defaults[0].id, "pm_2");
        assert!(pm.find_by_id("pm_3").await.unwrap().unwrap().is_default);
    }

    #[tokio::test]
    async fn set_default_rejects_foreign_method() {
        let repos = InMemoryRepositories::new();
        repos
            .payment_methods()
            .upsert(method("pm_3", "u2", true))
            .await
            .unwrap();
        assert!(repos.payment_methods().set_default("u1", "pm_3").await.is_err());
    }

    #[tokio::test]
    async fn customer_insert_if_absent_keeps_first() {
        let repos = InMemoryRepositories::new();
        let first = repos
            .customers()
            .insert_if_absent(CustomerRecord::new("u1", "cus_a", "a@example.com"))
            .await
            .unwrap();
        let second = repos
            .customers()
            .insert_if_absent(CustomerRecord::new("u1", "cus_b", "a@example.com"))
            .await
            .unwrap();
        assert_eq!(first.customer_id, "cus_a");
        assert_eq!(second.customer_id, "cus_a");
    }

    #[tokio::test]
    async fn webhook_events_dedup() {
        let repos = InMemoryRepositories::new();
        let events = repos.webhook_events();
        assert!(events.record_if_new("evt_1", "charge.refunded").await.unwrap());
        assert!(!events.record_if_new("evt_1", "charge.refunded").await.unwrap());
    }
}
