//! Ports to external collaborators
//!
//! The coordinator only ever talks to these traits; concrete adapters live
//! in `infrastructure/` and are injected at startup.

pub mod hardware;
pub mod mailer;
pub mod payments;

pub use hardware::{StationHardware, TelemetryFrame, TelemetryStream};
pub use mailer::{OutgoingReceipt, ReceiptMailer};
pub use payments::{
    Authorization, AuthorizationRequest, AuthorizationStatus, CaptureOutcome, CardSummary,
    PaymentProcessor, RefundOutcome,
};
