pub mod customer;
pub mod payment_method;
pub mod ports;
pub mod pricing;
pub mod repositories;
pub mod session;
pub mod station;
pub mod transaction;
pub mod webhook;

pub use customer::CustomerRecord;
pub use payment_method::PaymentMethod;
pub use pricing::{CaptureDecision, Estimate, RevenueSplit};
pub use repositories::RepositoryProvider;
pub use session::{ChargingSession, HardwareStatus, SessionPatch, SessionStatus};
pub use station::{Station, StationStatus};
pub use transaction::{Transaction, TransactionPatch, TransactionStatus};

pub use crate::shared::errors::{ChargeError, DomainResult};
