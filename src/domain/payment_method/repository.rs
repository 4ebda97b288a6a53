//! Payment method repository interface

use async_trait::async_trait;

use super::model::PaymentMethod;
use crate::shared::errors::DomainResult;

#[async_trait]
pub trait PaymentMethodRepository: Send + Sync {
    async fn upsert(&self, method: PaymentMethod) -> DomainResult<()>;
    async fn find_by_id(&self, id: &str) -> DomainResult<Option<PaymentMethod>>;
    async fn find_by_user(&self, user_id: &str) -> DomainResult<Vec<PaymentMethod>>;
    async fn find_default(&self, user_id: &str) -> DomainResult<Option<PaymentMethod>>;
    /// Make `id` the only default for `user_id` in one step.
    async fn set_default(&self, user_id: &str, id: &str) -> DomainResult<()>;
    async fn delete(&self, id: &str) -> DomainResult<()>;
}
