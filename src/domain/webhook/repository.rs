use async_trait::async_trait;

use crate::shared::errors::DomainResult;

#[async_trait]
pub trait WebhookEventRepository: Send + Sync {
    /// Record `event_id`; returns `false` if it was already recorded.
    async fn record_if_new(&self, event_id: &str, event_type: &str) -> DomainResult<bool>;
}
