//! Payment processor adapters

pub mod simulated;
pub mod stripe;

pub use simulated::{ProcessorCall, SimulatedProcessor};
pub use stripe::StripeProcessor;

use std::sync::Arc;

use tracing::info;

use crate::config::{PaymentProvider, PaymentsConfig};
use crate::domain::ports::PaymentProcessor;
use crate::domain::DomainResult;

/// Build the processor selected by `payments.provider`.
pub fn build_processor(cfg: &PaymentsConfig) -> DomainResult<Arc<dyn PaymentProcessor>> {
    let processor: Arc<dyn PaymentProcessor> = match cfg.provider {
        PaymentProvider::Stripe => Arc::new(StripeProcessor::new(cfg)?),
        PaymentProvider::Simulated => Arc::new(SimulatedProcessor::new()),
    };
    info!(provider = processor.name(), "Payment processor configured");
    Ok(processor)
}
