//! Charging session entity

use sea_orm::entity::prelude::*;

#[derive(Clone, Debug, PartialEq, DeriveEntityModel)]
#[sea_orm(table_name = "charging_sessions")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: String,

    pub user_id: String,
    pub station_id: String,
    pub authorization_id: String,

    /// Status: authorized, active, completing, completed, cancelled, error
    pub status: String,

    pub currency: String,
    pub price_per_kwh: String,
    pub authorized_amount: i64,

    #[sea_orm(nullable)]
    pub final_amount: Option<i64>,

    #[sea_orm(nullable)]
    pub started_at: Option<DateTimeUtc>,

    #[sea_orm(nullable)]
    pub ended_at: Option<DateTimeUtc>,

    #[sea_orm(column_type = "Double")]
    pub energy_delivered_kwh: f64,

    #[sea_orm(column_type = "Double")]
    pub current_power_kw: f64,

    #[sea_orm(nullable)]
    pub last_heartbeat: Option<DateTimeUtc>,

    pub hardware_status: String,

    #[sea_orm(nullable)]
    pub error_message: Option<String>,

    pub created_at: DateTimeUtc,
    pub updated_at: DateTimeUtc,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::station::Entity",
        from = "Column::StationId",
        to = "super::station::Column::Id"
    )]
    Station,
}

impl Related<super::station::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Station.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
