pub mod entities;
pub mod migrator;
pub mod repositories;

pub use repositories::SeaOrmRepositoryProvider;

use sea_orm::{ConnectOptions, Database, DatabaseConnection};
use sea_orm_migration::MigratorTrait;
use tracing::info;

use migrator::Migrator;

/// Connect and optionally run pending migrations.
pub async fn init_database(
    url: &str,
    run_migrations: bool,
) -> Result<DatabaseConnection, sea_orm::DbErr> {
    info!("Connecting to database: {}", url);
    let mut options = ConnectOptions::new(url.to_string());
    options.sqlx_logging(false);
    let db = Database::connect(options).await?;
    info!("Database connected successfully");

    if run_migrations {
        Migrator::up(&db, None).await?;
        info!("Database migrations applied");
    }
    Ok(db)
}
