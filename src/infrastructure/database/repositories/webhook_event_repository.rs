//! SeaORM implementation of WebhookEventRepository

use async_trait::async_trait;
use chrono::Utc;
use sea_orm::{sea_query::OnConflict, DatabaseConnection, EntityTrait, Set};

use super::db_err;
use crate::domain::webhook::WebhookEventRepository;
use crate::domain::DomainResult;
use crate::infrastructure::database::entities::webhook_event;

pub struct SeaOrmWebhookEventRepository {
    db: DatabaseConnection,
}

impl SeaOrmWebhookEventRepository {
    pub fn new(db: DatabaseConnection) -> Self {
        Self { db }
    }
}

#[async_trait]
impl WebhookEventRepository for SeaOrmWebhookEventRepository {
    async fn record_if_new(&self, event_id: &str, event_type: &str) -> DomainResult<bool> {
        let model = webhook_event::ActiveModel {
            event_id: Set(event_id.to_string()),
            event_type: Set(event_type.to_string()),
            received_at: Set(Utc::now()),
        };
        let inserted = webhook_event::Entity::insert(model)
            .on_conflict(
                OnConflict::column(webhook_event::Column::EventId)
                    .do_nothing()
                    .to_owned(),
            )
            .exec_without_returning(&self.db)
            .await
            .map_err(db_err)?;
        Ok(inserted > 0)
    }
}
