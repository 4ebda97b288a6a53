//! Infrastructure layer: adapters behind the domain ports

pub mod crypto;
pub mod database;
pub mod hardware;
pub mod mail;
pub mod payments;
pub mod storage;

pub use database::{init_database, SeaOrmRepositoryProvider};
pub use storage::InMemoryRepositories;
