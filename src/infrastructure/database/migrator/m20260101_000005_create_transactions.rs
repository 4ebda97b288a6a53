//! Create transactions table

use sea_orm_migration::prelude::*;

use super::m20260101_000004_create_charging_sessions::ChargingSessions;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(Transactions::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(Transactions::Id)
                            .string()
                            .not_null()
                            .primary_key(),
                    )
                    .col(
                        ColumnDef::new(Transactions::SessionId)
                            .string()
                            .not_null()
                            .unique_key(),
                    )
                    .col(ColumnDef::new(Transactions::UserId).string().not_null())
                    .col(ColumnDef::new(Transactions::StationId).string().not_null())
                    .col(
                        ColumnDef::new(Transactions::StationName)
                            .string()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(Transactions::StationOwnerId)
                            .string()
                            .not_null(),
                    )
                    .col(ColumnDef::new(Transactions::Amount).big_integer().not_null())
                    .col(ColumnDef::new(Transactions::Currency).string().not_null())
                    .col(
                        ColumnDef::new(Transactions::Status)
                            .string()
                            .not_null()
                            .default("pending"),
                    )
                    .col(
                        ColumnDef::new(Transactions::AuthorizationId)
                            .string()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(Transactions::PaymentMethodId)
                            .string()
                            .not_null(),
                    )
                    .col(ColumnDef::new(Transactions::CaptureId).string())
                    .col(
                        ColumnDef::new(Transactions::SessionStartedAt)
                            .timestamp_with_time_zone(),
                    )
                    .col(
                        ColumnDef::new(Transactions::SessionEndedAt)
                            .timestamp_with_time_zone(),
                    )
                    .col(
                        ColumnDef::new(Transactions::EnergyDeliveredKwh)
                            .double()
                            .not_null()
                            .default(0.0),
                    )
                    .col(
                        ColumnDef::new(Transactions::ReceiptSent)
                            .boolean()
                            .not_null()
                            .default(false),
                    )
                    .col(ColumnDef::new(Transactions::ReceiptSentAt).timestamp_with_time_zone())
                    .col(ColumnDef::new(Transactions::RefundId).string())
                    .col(ColumnDef::new(Transactions::RefundAmount).big_integer())
                    .col(ColumnDef::new(Transactions::RefundedAt).timestamp_with_time_zone())
                    .col(
                        ColumnDef::new(Transactions::NeedsReconciliation)
                            .boolean()
                            .not_null()
                            .default(false),
                    )
                    .col(ColumnDef::new(Transactions::ReconciliationNote).string())
                    .col(
                        ColumnDef::new(Transactions::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(Transactions::UpdatedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_transactions_session")
                            .from(Transactions::Table, Transactions::SessionId)
                            .to(ChargingSessions::Table, ChargingSessions::Id)
                            .on_delete(ForeignKeyAction::Restrict),
                    )
                    .to_owned(),
            )
            .await?;

        // Webhooks look transactions up by authorization
        manager
            .create_index(
                Index::create()
                    .name("idx_transactions_authorization")
                    .table(Transactions::Table)
                    .col(Transactions::AuthorizationId)
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_transactions_user")
                    .table(Transactions::Table)
                    .col(Transactions::UserId)
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_transactions_station")
                    .table(Transactions::Table)
                    .col(Transactions::StationId)
                    .to_owned(),
            )
            .await
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(Transactions::Table).to_owned())
            .await
    }
}

#[derive(Iden)]
pub enum Transactions {
    Table,
    Id,
    SessionId,
    UserId,
    StationId,
    StationName,
    StationOwnerId,
    Amount,
    Currency,
    Status,
    AuthorizationId,
    PaymentMethodId,
    CaptureId,
    SessionStartedAt,
    SessionEndedAt,
    EnergyDeliveredKwh,
    ReceiptSent,
    ReceiptSentAt,
    RefundId,
    RefundAmount,
    RefundedAt,
    NeedsReconciliation,
    ReconciliationNote,
    CreatedAt,
    UpdatedAt,
}
