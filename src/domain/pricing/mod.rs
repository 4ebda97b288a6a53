//! Pricing and estimate calculation
//!
//! Pure functions only: no I/O, no clock.

pub mod model;

pub use model::{
    energy_cost, estimate, CaptureDecision, Estimate, RevenueSplit, DEFAULT_OWNER_SHARE_BPS,
};
