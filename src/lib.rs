//! # ChargeFlow
//!
//! Payment and lifecycle coordinator for pay-per-session EV charging.
//!
//! ## Architecture
//!
//! - **domain**: entities (sessions, transactions, stations), pricing and
//!   the ports adapters implement (payment processor, station hardware,
//!   receipt mailer, repositories)
//! - **application**: the charging coordinator state machine, payment
//!   gateway client, customer resolver, session store and transaction
//!   ledger, receipts, refunds, webhooks and the orphan sweeper
//! - **infrastructure**: SeaORM and in-memory storage, Stripe and
//!   simulated processors, simulated and remote station drivers, mail
//! - **interfaces**: REST API with Swagger documentation
//! - **notifications**: in-process change feed for session updates

pub mod application;
pub mod config;
pub mod domain;
pub mod infrastructure;
pub mod interfaces;
pub mod notifications;
pub mod server;
pub mod shared;

pub use config::{default_config_path, AppConfig};

pub use infrastructure::{init_database, InMemoryRepositories, SeaOrmRepositoryProvider};

pub use interfaces::http::create_api_router;

pub use server::{init_tracing, ServerHandle, ServerOptions};
