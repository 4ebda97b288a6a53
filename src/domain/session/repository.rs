//! Session repository interface

use async_trait::async_trait;

use super::model::{ChargingSession, SessionPatch, SessionStatus};
use crate::shared::errors::DomainResult;

#[async_trait]
pub trait SessionRepository: Send + Sync {
    async fn insert(&self, session: ChargingSession) -> DomainResult<()>;
    async fn find_by_id(&self, id: &str) -> DomainResult<Option<ChargingSession>>;
    /// Apply a partial update and return the stored result.
    async fn update(&self, id: &str, patch: SessionPatch) -> DomainResult<ChargingSession>;
    async fn find_by_user(&self, user_id: &str) -> DomainResult<Vec<ChargingSession>>;
    async fn find_by_status(&self, status: SessionStatus) -> DomainResult<Vec<ChargingSession>>;

    /// Apply `patch` only if the stored status still equals `expected`.
    ///
    /// Returns `Ok(None)` when another writer moved the session first.
    async fn update_if_status(
        &self,
        id: &str,
        expected: SessionStatus,
        patch: SessionPatch,
    ) -> DomainResult<Option<ChargingSession>>;
}
