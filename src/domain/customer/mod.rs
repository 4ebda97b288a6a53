//! Payment-processor customer mapping
//!
//! At most one record per user; the first writer wins.

pub mod model;
pub mod repository;

pub use model::CustomerRecord;
pub use repository::CustomerRepository;
