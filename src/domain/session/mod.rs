//! Charging session aggregate
//!
//! Contains the ChargingSession entity, its status machine, and the
//! repository interface.

pub mod model;
pub mod repository;

pub use model::{ChargingSession, HardwareStatus, NewSession, SessionPatch, SessionStatus};
pub use repository::SessionRepository;
