//! Charging station aggregate

pub mod model;
pub mod repository;

pub use model::{Station, StationStatus};
pub use repository::StationRepository;
