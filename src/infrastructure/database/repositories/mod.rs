//! Database repository implementations
//!
//! Per-aggregate SeaORM repositories + unified RepositoryProvider.

pub mod customer_repository;
pub mod payment_method_repository;
pub mod repository_provider;
pub mod session_repository;
pub mod station_repository;
pub mod transaction_repository;
pub mod webhook_event_repository;

pub use repository_provider::SeaOrmRepositoryProvider;

use std::str::FromStr;

use rust_decimal::Decimal;

use crate::domain::ChargeError;

pub(crate) fn db_err(e: sea_orm::DbErr) -> ChargeError {
    ChargeError::Persistence(format!("Database error: {}", e))
}

pub(crate) fn parse_price(raw: &str) -> Result<Decimal, ChargeError> {
    Decimal::from_str(raw)
        .map_err(|e| ChargeError::Persistence(format!("Invalid stored price '{}': {}", raw, e)))
}
