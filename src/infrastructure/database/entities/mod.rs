//! Database entities module

pub mod charging_session;
pub mod customer;
pub mod payment_method;
pub mod station;
pub mod transaction;
pub mod webhook_event;

pub use charging_session::Entity as ChargingSession;
pub use customer::Entity as Customer;
pub use payment_method::Entity as PaymentMethod;
pub use station::Entity as Station;
pub use transaction::Entity as Transaction;
pub use webhook_event::Entity as WebhookEvent;
