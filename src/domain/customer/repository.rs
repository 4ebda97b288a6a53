//! Customer repository interface

use async_trait::async_trait;

use super::model::CustomerRecord;
use crate::shared::errors::DomainResult;

#[async_trait]
pub trait CustomerRepository: Send + Sync {
    async fn find_by_user(&self, user_id: &str) -> DomainResult<Option<CustomerRecord>>;

    /// Insert unless a record for the user exists; returns the stored record
    /// (the existing one when the insert lost).
    async fn insert_if_absent(&self, record: CustomerRecord) -> DomainResult<CustomerRecord>;
}
