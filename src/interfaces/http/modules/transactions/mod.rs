//! Transactions module: history, owner view, receipts and refunds

pub mod dto;
pub mod handlers;

pub use dto::*;
pub use handlers::*;
