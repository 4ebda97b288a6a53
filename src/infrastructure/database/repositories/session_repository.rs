//! SeaORM implementation of SessionRepository

use async_trait::async_trait;
use log::{debug, warn};
use sea_orm::{
    ActiveModelTrait, ActiveValue::NotSet, ColumnTrait, DatabaseConnection, EntityTrait,
    QueryFilter, QueryOrder, Set,
};

use super::{db_err, parse_price};
use crate::domain::session::{
    ChargingSession, HardwareStatus, SessionPatch, SessionRepository, SessionStatus,
};
use crate::domain::{ChargeError, DomainResult};
use crate::infrastructure::database::entities::charging_session;

pub struct SeaOrmSessionRepository {
    db: DatabaseConnection,
}

impl SeaOrmSessionRepository {
    pub fn new(db: DatabaseConnection) -> Self {
        Self { db }
    }
}

// ── Conversion helpers ──────────────────────────────────────────

fn model_to_domain(m: charging_session::Model) -> DomainResult<ChargingSession> {
    let status = SessionStatus::from_str(&m.status).ok_or_else(|| {
        ChargeError::Persistence(format!("Unknown session status '{}' for {}", m.status, m.id))
    })?;
    Ok(ChargingSession {
        price_per_kwh: parse_price(&m.price_per_kwh)?,
        id: m.id,
        user_id: m.user_id,
        station_id: m.station_id,
        authorization_id: m.authorization_id,
        status,
        currency: m.currency,
        authorized_amount: m.authorized_amount,
        final_amount: m.final_amount,
        started_at: m.started_at,
        ended_at: m.ended_at,
        energy_delivered_kwh: m.energy_delivered_kwh,
        current_power_kw: m.current_power_kw,
        last_heartbeat: m.last_heartbeat,
        hardware_status: HardwareStatus::from_str(&m.hardware_status),
        error_message: m.error_message,
        created_at: m.created_at,
        updated_at: m.updated_at,
    })
}

fn domain_to_active(s: &ChargingSession) -> charging_session::ActiveModel {
    charging_session::ActiveModel {
        id: Set(s.id.clone()),
        user_id: Set(s.user_id.clone()),
        station_id: Set(s.station_id.clone()),
        authorization_id: Set(s.authorization_id.clone()),
        status: Set(s.status.as_str().to_string()),
        currency: Set(s.currency.clone()),
        price_per_kwh: Set(s.price_per_kwh.to_string()),
        authorized_amount: Set(s.authorized_amount),
        final_amount: Set(s.final_amount),
        started_at: Set(s.started_at),
        ended_at: Set(s.ended_at),
        energy_delivered_kwh: Set(s.energy_delivered_kwh),
        current_power_kw: Set(s.current_power_kw),
        last_heartbeat: Set(s.last_heartbeat),
        hardware_status: Set(s.hardware_status.as_str().to_string()),
        error_message: Set(s.error_message.clone()),
        created_at: Set(s.created_at),
        updated_at: Set(s.updated_at),
    }
}

fn collect(models: Vec<charging_session::Model>) -> DomainResult<Vec<ChargingSession>> {
    models.into_iter().map(model_to_domain).collect()
}

// ── SessionRepository impl ──────────────────────────────────────

#[async_trait]
impl SessionRepository for SeaOrmSessionRepository {
    async fn insert(&self, session: ChargingSession) -> DomainResult<()> {
        debug!("Inserting session: {}", session.id);
        domain_to_active(&session)
            .insert(&self.db)
            .await
            .map_err(db_err)?;
        Ok(())
    }

    async fn find_by_id(&self, id: &str) -> DomainResult<Option<ChargingSession>> {
        let model = charging_session::Entity::find_by_id(id.to_string())
            .one(&self.db)
            .await
            .map_err(db_err)?;
        model.map(model_to_domain).transpose()
    }

    async fn update(&self, id: &str, patch: SessionPatch) -> DomainResult<ChargingSession> {
        let existing = charging_session::Entity::find_by_id(id.to_string())
            .one(&self.db)
            .await
            .map_err(db_err)?
            .ok_or_else(|| ChargeError::not_found("Session", "id", id))?;

        let mut session = model_to_domain(existing)?;
        patch.apply(&mut session);
        debug!("Updating session {}: status={}", id, session.status);

        domain_to_active(&session)
            .update(&self.db)
            .await
            .map_err(db_err)?;
        Ok(session)
    }

    async fn find_by_user(&self, user_id: &str) -> DomainResult<Vec<ChargingSession>> {
        let models = charging_session::Entity::find()
            .filter(charging_session::Column::UserId.eq(user_id))
            .order_by_desc(charging_session::Column::CreatedAt)
            .all(&self.db)
            .await
            .map_err(db_err)?;
        collect(models)
    }

    async fn find_by_status(&self, status: SessionStatus) -> DomainResult<Vec<ChargingSession>> {
        let models = charging_session::Entity::find()
            .filter(charging_session::Column::Status.eq(status.as_str()))
            .all(&self.db)
            .await
            .map_err(db_err)?;
        collect(models)
    }

    async fn update_if_status(
        &self,
        id: &str,
        expected: SessionStatus,
        patch: SessionPatch,
    ) -> DomainResult<Option<ChargingSession>> {
        let existing = charging_session::Entity::find_by_id(id.to_string())
            .one(&self.db)
            .await
            .map_err(db_err)?
            .ok_or_else(|| ChargeError::not_found("Session", "id", id))?;

        let mut session = model_to_domain(existing)?;
        if session.status != expected {
            return Ok(None);
        }
        patch.apply(&mut session);

        let mut active = domain_to_active(&session);
        active.id = NotSet;

        let result = charging_session::Entity::update_many()
            .set(active)
            .filter(charging_session::Column::Id.eq(id))
            .filter(charging_session::Column::Status.eq(expected.as_str()))
            .exec(&self.db)
            .await
            .map_err(db_err)?;

        if result.rows_affected == 0 {
            warn!("Session {} left {} concurrently", id, expected);
            return Ok(None);
        }
        debug!("Session {} moved {} -> {}", id, expected, session.status);
        Ok(Some(session))
    }
}
