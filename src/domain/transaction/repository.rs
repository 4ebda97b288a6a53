//! Transaction repository interface

use async_trait::async_trait;

use super::model::{Transaction, TransactionPatch, TransactionStatus};
use crate::shared::errors::DomainResult;

#[async_trait]
pub trait TransactionRepository: Send + Sync {
    async fn insert(&self, transaction: Transaction) -> DomainResult<()>;
    async fn find_by_id(&self, id: &str) -> DomainResult<Option<Transaction>>;
    async fn find_by_session(&self, session_id: &str) -> DomainResult<Option<Transaction>>;
    async fn find_by_authorization(&self, authorization_id: &str)
        -> DomainResult<Option<Transaction>>;
    async fn find_by_user(&self, user_id: &str) -> DomainResult<Vec<Transaction>>;
    async fn find_by_station(&self, station_id: &str) -> DomainResult<Vec<Transaction>>;
    async fn find_needing_reconciliation(&self) -> DomainResult<Vec<Transaction>>;

    /// Apply `patch` only if the stored status still equals `expected`.
    ///
    /// Returns `Ok(None)` when the status changed underneath the caller.
    async fn update_if_status(
        &self,
        id: &str,
        expected: TransactionStatus,
        patch: TransactionPatch,
    ) -> DomainResult<Option<Transaction>>;
}
