//! Estimate module: pre-session cost and duration

pub mod dto;
pub mod handlers;

pub use dto::*;
pub use handlers::*;
