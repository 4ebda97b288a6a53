//! Charging session lifecycle
//!
//! [`ChargingCoordinator`] owns every live session in this process: it
//! places the payment hold, starts the station, folds telemetry into the
//! session record and settles payment when charging ends.

mod coordinator;
mod live;


pub use coordinator::{
    ChargingCoordinator, CoordinatorConfig, LiveView, SessionFailure, StartRequest,
};
