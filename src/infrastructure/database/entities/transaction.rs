//! Payment transaction entity

use sea_orm::entity::prelude::*;

#[derive(Clone, Debug, PartialEq, DeriveEntityModel)]
#[sea_orm(table_name = "transactions")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: String,

    #[sea_orm(unique)]
    pub session_id: String,
    pub user_id: String,
    pub station_id: String,
    pub station_name: String,
    pub station_owner_id: String,

    /// Minor currency units
    pub amount: i64,
    pub currency: String,

    /// Status: pending, succeeded, failed, refunded, cancelled
    pub status: String,

    pub authorization_id: String,
    pub payment_method_id: String,

    #[sea_orm(nullable)]
    pub capture_id: Option<String>,

    #[sea_orm(nullable)]
    pub session_started_at: Option<DateTimeUtc>,

    #[sea_orm(nullable)]
    pub session_ended_at: Option<DateTimeUtc>,

    #[sea_orm(column_type = "Double")]
    pub energy_delivered_kwh: f64,

    pub receipt_sent: bool,

    #[sea_orm(nullable)]
    pub receipt_sent_at: Option<DateTimeUtc>,

    #[sea_orm(nullable)]
    pub refund_id: Option<String>,

    #[sea_orm(nullable)]
    pub refund_amount: Option<i64>,

    #[sea_orm(nullable)]
    pub refunded_at: Option<DateTimeUtc>,

    pub needs_reconciliation: bool,

    #[sea_orm(nullable)]
    pub reconciliation_note: Option<String>,

    pub created_at: DateTimeUtc,
    pub updated_at: DateTimeUtc,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::charging_session::Entity",
        from = "Column::SessionId",
        to = "super::charging_session::Column::Id"
    )]
    Session,
}

impl Related<super::charging_session::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Session.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
