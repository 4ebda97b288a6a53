//! Saved payment methods (local mirror of the processor's list)

pub mod model;
pub mod repository;

pub use model::PaymentMethod;
pub use repository::PaymentMethodRepository;
