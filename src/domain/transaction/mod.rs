//! Payment transaction aggregate
//!
//! One transaction per charging session; it mirrors the payment outcome.

pub mod model;
pub mod repository;

pub use model::{NewTransaction, Transaction, TransactionPatch, TransactionStatus};
pub use repository::TransactionRepository;
