//! Station repository interface

use async_trait::async_trait;

use super::model::{Station, StationStatus};
use crate::shared::errors::DomainResult;

#[async_trait]
pub trait StationRepository: Send + Sync {
    async fn save(&self, station: Station) -> DomainResult<()>;
    async fn find_by_id(&self, id: &str) -> DomainResult<Option<Station>>;
    async fn find_all(&self) -> DomainResult<Vec<Station>>;
    async fn find_by_owner(&self, owner_id: &str) -> DomainResult<Vec<Station>>;
    async fn update_status(&self, id: &str, status: StationStatus) -> DomainResult<()>;
}
