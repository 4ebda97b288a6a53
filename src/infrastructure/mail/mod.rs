//! Receipt mail transports

pub mod http;
pub mod log;

pub use self::http::HttpMailer;
pub use self::log::LogMailer;

use std::sync::Arc;

use crate::config::{ReceiptTransport, ReceiptsConfig};
use crate::domain::ports::ReceiptMailer;
use crate::domain::DomainResult;

pub fn build_mailer(cfg: &ReceiptsConfig) -> DomainResult<Arc<dyn ReceiptMailer>> {
    Ok(match cfg.transport {
        ReceiptTransport::Log => Arc::new(LogMailer::new()),
        ReceiptTransport::Http => Arc::new(HttpMailer::new(cfg)?),
    })
}
