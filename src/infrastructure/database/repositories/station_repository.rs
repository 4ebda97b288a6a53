//! SeaORM implementation of StationRepository

use async_trait::async_trait;
use chrono::Utc;
use sea_orm::{
    sea_query::OnConflict, ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait,
    QueryFilter, QueryOrder, Set,
};

use super::{db_err, parse_price};
use crate::domain::station::{Station, StationRepository, StationStatus};
use crate::domain::{ChargeError, DomainResult};
use crate::infrastructure::database::entities::station;

pub struct SeaOrmStationRepository {
    db: DatabaseConnection,
}

impl SeaOrmStationRepository {
    pub fn new(db: DatabaseConnection) -> Self {
        Self { db }
    }
}

fn model_to_domain(m: station::Model) -> DomainResult<Station> {
    let status = StationStatus::from_str(&m.status).unwrap_or(StationStatus::Offline);
    Ok(Station {
        price_per_kwh: parse_price(&m.price_per_kwh)?,
        id: m.id,
        name: m.name,
        owner_id: m.owner_id,
        latitude: m.latitude,
        longitude: m.longitude,
        address: m.address,
        status,
        max_power_kw: m.max_power_kw,
        currency: m.currency,
        created_at: m.created_at,
        updated_at: m.updated_at,
    })
}

#[async_trait]
impl StationRepository for SeaOrmStationRepository {
    async fn save(&self, s: Station) -> DomainResult<()> {
        let model = station::ActiveModel {
            id: Set(s.id),
            name: Set(s.name),
            owner_id: Set(s.owner_id),
            latitude: Set(s.latitude),
            longitude: Set(s.longitude),
            address: Set(s.address),
            status: Set(s.status.as_str().to_string()),
            max_power_kw: Set(s.max_power_kw),
            price_per_kwh: Set(s.price_per_kwh.to_string()),
            currency: Set(s.currency),
            created_at: Set(s.created_at),
            updated_at: Set(s.updated_at),
        };
        station::Entity::insert(model)
            .on_conflict(
                OnConflict::column(station::Column::Id)
                    .update_columns([
                        station::Column::Name,
                        station::Column::OwnerId,
                        station::Column::Latitude,
                        station::Column::Longitude,
                        station::Column::Address,
                        station::Column::Status,
                        station::Column::MaxPowerKw,
                        station::Column::PricePerKwh,
                        station::Column::Currency,
                        station::Column::UpdatedAt,
                    ])
                    .to_owned(),
            )
            .exec_without_returning(&self.db)
            .await
            .map_err(db_err)?;
        Ok(())
    }

    async fn find_by_id(&self, id: &str) -> DomainResult<Option<Station>> {
        let model = station::Entity::find_by_id(id.to_string())
            .one(&self.db)
            .await
            .map_err(db_err)?;
        model.map(model_to_domain).transpose()
    }

    async fn find_all(&self) -> DomainResult<Vec<Station>> {
        let models = station::Entity::find()
            .order_by_asc(station::Column::Name)
            .all(&self.db)
            .await
            .map_err(db_err)?;
        models.into_iter().map(model_to_domain).collect()
    }

    async fn find_by_owner(&self, owner_id: &str) -> DomainResult<Vec<Station>> {
        let models = station::Entity::find()
            .filter(station::Column::OwnerId.eq(owner_id))
            .all(&self.db)
            .await
            .map_err(db_err)?;
        models.into_iter().map(model_to_domain).collect()
    }

    async fn update_status(&self, id: &str, status: StationStatus) -> DomainResult<()> {
        let model = station::Entity::find_by_id(id.to_string())
            .one(&self.db)
            .await
            .map_err(db_err)?
            .ok_or_else(|| ChargeError::not_found("Station", "id", id))?;

        let mut active: station::ActiveModel = model.into();
        active.status = Set(status.as_str().to_string());
        active.updated_at = Set(Utc::now());
        active.update(&self.db).await.map_err(db_err)?;
        Ok(())
    }
}
