//! Database migrations module

pub use sea_orm_migration::prelude::*;

mod m20260101_000001_create_stations;
mod m20260101_000002_create_customers;
mod m20260101_000003_create_payment_methods;
mod m20260101_000004_create_charging_sessions;
mod m20260101_000005_create_transactions;
mod m20260101_000006_create_webhook_events;

pub struct Migrator;

#[async_trait::async_trait]
impl MigratorTrait for Migrator {
    fn migrations() -> Vec<Box<dyn MigrationTrait>> {
        vec![
            Box::new(m20260101_000001_create_stations::Migration),
            Box::new(m20260101_000002_create_customers::Migration),
            Box::new(m20260101_000003_create_payment_methods::Migration),
            Box::new(m20260101_000004_create_charging_sessions::Migration),
            Box::new(m20260101_000005_create_transactions::Migration),
            Box::new(m20260101_000006_create_webhook_events::Migration),
        ]
    }
}
