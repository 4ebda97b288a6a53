//! Create payment_methods table

use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(PaymentMethods::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(PaymentMethods::Id)
                            .string()
                            .not_null()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(PaymentMethods::UserId).string().not_null())
                    .col(
                        ColumnDef::new(PaymentMethods::CustomerId)
                            .string()
                            .not_null(),
                    )
                    .col(ColumnDef::new(PaymentMethods::Brand).string().not_null())
                    .col(ColumnDef::new(PaymentMethods::Last4).string().not_null())
                    .col(
                        ColumnDef::new(PaymentMethods::ExpMonth)
                            .integer()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(PaymentMethods::ExpYear)
                            .integer()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(PaymentMethods::IsDefault)
                            .boolean()
                            .not_null()
                            .default(false),
                    )
                    .col(
                        ColumnDef::new(PaymentMethods::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_payment_methods_user")
                    .table(PaymentMethods::Table)
                    .col(PaymentMethods::UserId)
                    .to_owned(),
            )
            .await
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(PaymentMethods::Table).to_owned())
            .await
    }
}

#[derive(Iden)]
pub enum PaymentMethods {
    Table,
    Id,
    UserId,
    CustomerId,
    Brand,
    Last4,
    ExpMonth,
    ExpYear,
    IsDefault,
    CreatedAt,
}
