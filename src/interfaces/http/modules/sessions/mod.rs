//! Sessions module: start, inspect, stop and cancel charging sessions

pub mod dto;
pub mod handlers;

pub use dto::*;
pub use handlers::*;
