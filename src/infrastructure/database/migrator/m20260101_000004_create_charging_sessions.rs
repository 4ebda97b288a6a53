//! Create charging_sessions table

use sea_orm_migration::prelude::*;

use super::m20260101_000001_create_stations::Stations;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(ChargingSessions::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(ChargingSessions::Id)
                            .string()
                            .not_null()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(ChargingSessions::UserId).string().not_null())
                    .col(
                        ColumnDef::new(ChargingSessions::StationId)
                            .string()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(ChargingSessions::AuthorizationId)
                            .string()
                            .not_null()
                            .unique_key(),
                    )
                    .col(
                        ColumnDef::new(ChargingSessions::Status)
                            .string()
                            .not_null()
                            .default("authorized"),
                    )
                    .col(
                        ColumnDef::new(ChargingSessions::Currency)
                            .string()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(ChargingSessions::PricePerKwh)
                            .string()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(ChargingSessions::AuthorizedAmount)
                            .big_integer()
                            .not_null(),
                    )
                    .col(ColumnDef::new(ChargingSessions::FinalAmount).big_integer())
                    .col(ColumnDef::new(ChargingSessions::StartedAt).timestamp_with_time_zone())
                    .col(ColumnDef::new(ChargingSessions::EndedAt).timestamp_with_time_zone())
                    .col(
                        ColumnDef::new(ChargingSessions::EnergyDeliveredKwh)
                            .double()
                            .not_null()
                            .default(0.0),
                    )
                    .col(
                        ColumnDef::new(ChargingSessions::CurrentPowerKw)
                            .double()
                            .not_null()
                            .default(0.0),
                    )
                    .col(
                        ColumnDef::new(ChargingSessions::LastHeartbeat)
                            .timestamp_with_time_zone(),
                    )
                    .col(
                        ColumnDef::new(ChargingSessions::HardwareStatus)
                            .string()
                            .not_null()
                            .default("idle"),
                    )
                    .col(ColumnDef::new(ChargingSessions::ErrorMessage).string())
                    .col(
                        ColumnDef::new(ChargingSessions::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(ChargingSessions::UpdatedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_charging_sessions_station")
                            .from(ChargingSessions::Table, ChargingSessions::StationId)
                            .to(Stations::Table, Stations::Id)
                            .on_delete(ForeignKeyAction::Restrict),
                    )
                    .to_owned(),
            )
            .await?;

        // Sweeper scans by status
        manager
            .create_index(
                Index::create()
                    .name("idx_charging_sessions_status")
                    .table(ChargingSessions::Table)
                    .col(ChargingSessions::Status)
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_charging_sessions_user")
                    .table(ChargingSessions::Table)
                    .col(ChargingSessions::UserId)
                    .to_owned(),
            )
            .await
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(ChargingSessions::Table).to_owned())
            .await
    }
}

#[derive(Iden)]
pub enum ChargingSessions {
    Table,
    Id,
    UserId,
    StationId,
    AuthorizationId,
    Status,
    Currency,
    PricePerKwh,
    AuthorizedAmount,
    FinalAmount,
    StartedAt,
    EndedAt,
    EnergyDeliveredKwh,
    CurrentPowerKw,
    LastHeartbeat,
    HardwareStatus,
    ErrorMessage,
    CreatedAt,
    UpdatedAt,
}
