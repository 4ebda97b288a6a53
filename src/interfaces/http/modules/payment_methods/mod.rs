//! Payment methods module: saved cards

pub mod dto;
pub mod handlers;

pub use dto::*;
pub use handlers::*;
