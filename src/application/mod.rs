pub mod charging;
pub mod customers;
pub mod gateway;
pub mod ledger;
pub mod receipts;
pub mod refunds;
pub mod store;
pub mod sweeper;
pub mod webhooks;

// Re-export key types for convenience
pub use charging::{
    ChargingCoordinator, CoordinatorConfig, LiveView, SessionFailure, StartRequest,
};
pub use customers::CustomerResolver;
pub use gateway::PaymentGatewayClient;
pub use ledger::TransactionLedger;
pub use receipts::{render_receipt, ReceiptDispatcher};
pub use refunds::RefundService;
pub use store::{SessionStore, StationTransaction};
pub use sweeper::{OrphanSweeper, SweepReport, SweeperConfig};
pub use webhooks::{PaymentWebhookHandler, WebhookOutcome};
