//! Repository provider for the domain layer

use super::customer::CustomerRepository;
use super::payment_method::PaymentMethodRepository;
use super::session::SessionRepository;
use super::station::StationRepository;
use super::transaction::TransactionRepository;
use super::webhook::WebhookEventRepository;

/// Provides access to all domain repositories.
///
/// Consumers request only the repository they need:
///
/// ```ignore
/// async fn handle(repos: &dyn RepositoryProvider) {
///     let station = repos.stations().find_by_id("st-1").await?;
///     let tx = repos.transactions().find_by_session("sess-1").await?;
/// }
/// ```
pub trait RepositoryProvider: Send + Sync {
    fn sessions(&self) -> &dyn SessionRepository;
    fn transactions(&self) -> &dyn TransactionRepository;
    fn stations(&self) -> &dyn StationRepository;
    fn customers(&self) -> &dyn CustomerRepository;
    fn payment_methods(&self) -> &dyn PaymentMethodRepository;
    fn webhook_events(&self) -> &dyn WebhookEventRepository;
}
