//! Maps application users to payment-processor customers

use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::Mutex;
use tracing::{info, warn};

use crate::domain::ports::PaymentProcessor;
use crate::domain::{ChargeError, CustomerRecord, DomainResult, RepositoryProvider};

pub struct CustomerResolver {
    repos: Arc<dyn RepositoryProvider>,
    processor: Arc<dyn PaymentProcessor>,
    /// Serialises creation per user within this process
    locks: DashMap<String, Arc<Mutex<()>>>,
}

impl CustomerResolver {
    pub fn new(repos: Arc<dyn RepositoryProvider>, processor: Arc<dyn PaymentProcessor>) -> Self {
        Self {
            repos,
            processor,
            locks: DashMap::new(),
        }
    }

    /// Return the customer id for `user_id`, creating the remote customer
    /// on first use.
    ///
    /// The mapping is written with a single insert-if-absent keyed by user
    /// id, and creation uses a per-user idempotency key, so concurrent
    /// callers (even across processes) end up with the same customer.
    pub async fn resolve_customer(&self, user_id: &str, email: &str) -> DomainResult<String> {
        if user_id.trim().is_empty() {
            return Err(ChargeError::InvalidArgument("user id is required".into()));
        }
        if let Some(existing) = self.repos.customers().find_by_user(user_id).await? {
            return Ok(existing.customer_id);
        }

        let lock = self
            .locks
            .entry(user_id.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone();
        let resolved = {
            let _guard = lock.lock().await;
            self.create_customer(user_id, email).await
        };
        drop(lock);
        // Only the map's own reference left: nobody is waiting on it
        self.locks
            .remove_if(user_id, |_, held| Arc::strong_count(held) == 1);
        resolved
    }

    async fn create_customer(&self, user_id: &str, email: &str) -> DomainResult<String> {
        if let Some(existing) = self.repos.customers().find_by_user(user_id).await? {
            return Ok(existing.customer_id);
        }

        let created = self
            .processor
            .create_customer(user_id, email, &format!("customer:{}", user_id))
            .await?;
        let stored = self
            .repos
            .customers()
            .insert_if_absent(CustomerRecord::new(user_id, &created, email))
            .await?;

        if stored.customer_id != created {
            warn!(
                user_id,
                kept = %stored.customer_id,
                discarded = %created,
                "Lost customer creation race; using stored customer"
            );
        } else {
            info!(user_id, customer_id = %created, "Payment customer created");
        }
        Ok(stored.customer_id)
    }

    /// Stored email for receipts, if the user has a customer record.
    pub async fn email_for(&self, user_id: &str) -> DomainResult<Option<String>> {
        Ok(self
            .repos
            .customers()
            .find_by_user(user_id)
            .await?
            .map(|c| c.email)
            .filter(|e| !e.is_empty()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::payments::simulated::{ProcessorCall, SimulatedProcessor};
    use crate::infrastructure::storage::InMemoryRepositories;

    fn setup() -> (Arc<CustomerResolver>, Arc<SimulatedProcessor>) {
        let processor = Arc::new(SimulatedProcessor::new());
        let resolver = Arc::new(CustomerResolver::new(
            Arc::new(InMemoryRepositories::new()),
            processor.clone(),
        ));
        (resolver, processor)
    }

    fn creations(processor: &SimulatedProcessor) -> usize {
        processor
            .calls()
            .iter()
            .filter(|c| matches!(c, ProcessorCall::CreateCustomer { .. }))
            .count()
    }

    #[tokio::test]
    async fn creates_once_and_reuses() {
        let (resolver, processor) = setup();
        let first = resolver.resolve_customer("user-1", "a@example.com").await.unwrap();
        let second = resolver.resolve_customer("user-1", "a@example.com").await.unwrap();
        assert_eq!(first, second);
        assert_eq!(creations(&processor), 1);
        assert_eq!(
            resolver.email_for("user-1").await.unwrap().as_deref(),
            Some("a@example.com")
        );
    }

    #[tokio::test]
    async fn concurrent_calls_do_not_duplicate() {
        let (resolver, processor) = setup();
        let mut handles = Vec::new();
        for _ in 0..8 {
            let r = resolver.clone();
            handles.push(tokio::spawn(async move {
                r.resolve_customer("user-1", "a@example.com").await
            }));
        }
        let mut ids = Vec::new();
        for h in handles {
            ids.push(h.await.unwrap().unwrap());
        }
        ids.dedup();
        assert_eq!(ids.len(), 1);
        assert_eq!(creations(&processor), 1);
        assert!(resolver.locks.is_empty());
    }

    #[tokio::test]
    async fn creation_locks_do_not_accumulate() {
        let (resolver, _) = setup();
        for i in 0..5 {
            let user = format!("user-{}", i);
            resolver.resolve_customer(&user, "a@example.com").await.unwrap();
        }
        assert!(resolver.locks.is_empty());

        // Failed creations release their lock too
        let (resolver, processor) = setup();
        processor.set_unreachable(true);
        assert!(resolver.resolve_customer("user-9", "a@example.com").await.is_err());
        assert!(resolver.locks.is_empty());
    }

    #[tokio::test]
    async fn gateway_failure_propagates_without_mapping() {
        let (resolver, processor) = setup();
        processor.set_unreachable(true);
        let err = resolver.resolve_customer("user-1", "a@example.com").await.unwrap_err();
        assert!(matches!(err, ChargeError::Gateway { .. }));
        assert_eq!(resolver.email_for("user-1").await.unwrap(), None);
    }
}
