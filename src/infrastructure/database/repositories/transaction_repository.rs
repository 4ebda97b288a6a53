//! SeaORM implementation of TransactionRepository

use async_trait::async_trait;
use log::{debug, warn};
use sea_orm::{
    ActiveModelTrait, ActiveValue::NotSet, ColumnTrait, DatabaseConnection, EntityTrait,
    QueryFilter, QueryOrder, Set,
};

use super::db_err;
use crate::domain::transaction::{
    Transaction, TransactionPatch, TransactionRepository, TransactionStatus,
};
use crate::domain::{ChargeError, DomainResult};
use crate::infrastructure::database::entities::transaction;

pub struct SeaOrmTransactionRepository {
    db: DatabaseConnection,
}

impl SeaOrmTransactionRepository {
    pub fn new(db: DatabaseConnection) -> Self {
        Self { db }
    }
}

// ── Conversion helpers ──────────────────────────────────────────

fn model_to_domain(t: transaction::Model) -> DomainResult<Transaction> {
    let status = TransactionStatus::from_str(&t.status).ok_or_else(|| {
        ChargeError::Persistence(format!(
            "Unknown transaction status '{}' for {}",
            t.status, t.id
        ))
    })?;
    Ok(Transaction {
        id: t.id,
        session_id: t.session_id,
        user_id: t.user_id,
        station_id: t.station_id,
        station_name: t.station_name,
        station_owner_id: t.station_owner_id,
        amount: t.amount,
        currency: t.currency,
        status,
        authorization_id: t.authorization_id,
        payment_method_id: t.payment_method_id,
        capture_id: t.capture_id,
        session_started_at: t.session_started_at,
        session_ended_at: t.session_ended_at,
        energy_delivered_kwh: t.energy_delivered_kwh,
        receipt_sent: t.receipt_sent,
        receipt_sent_at: t.receipt_sent_at,
        refund_id: t.refund_id,
        refund_amount: t.refund_amount,
        refunded_at: t.refunded_at,
        needs_reconciliation: t.needs_reconciliation,
        reconciliation_note: t.reconciliation_note,
        created_at: t.created_at,
        updated_at: t.updated_at,
    })
}

fn domain_to_active(t: &Transaction) -> transaction::ActiveModel {
    transaction::ActiveModel {
        id: Set(t.id.clone()),
        session_id: Set(t.session_id.clone()),
        user_id: Set(t.user_id.clone()),
        station_id: Set(t.station_id.clone()),
        station_name: Set(t.station_name.clone()),
        station_owner_id: Set(t.station_owner_id.clone()),
        amount: Set(t.amount),
        currency: Set(t.currency.clone()),
        status: Set(t.status.as_str().to_string()),
        authorization_id: Set(t.authorization_id.clone()),
        payment_method_id: Set(t.payment_method_id.clone()),
        capture_id: Set(t.capture_id.clone()),
        session_started_at: Set(t.session_started_at),
        session_ended_at: Set(t.session_ended_at),
        energy_delivered_kwh: Set(t.energy_delivered_kwh),
        receipt_sent: Set(t.receipt_sent),
        receipt_sent_at: Set(t.receipt_sent_at),
        refund_id: Set(t.refund_id.clone()),
        refund_amount: Set(t.refund_amount),
        refunded_at: Set(t.refunded_at),
        needs_reconciliation: Set(t.needs_reconciliation),
        reconciliation_note: Set(t.reconciliation_note.clone()),
        created_at: Set(t.created_at),
        updated_at: Set(t.updated_at),
    }
}

fn collect(models: Vec<transaction::Model>) -> DomainResult<Vec<Transaction>> {
    models.into_iter().map(model_to_domain).collect()
}

// ── TransactionRepository impl ──────────────────────────────────

#[async_trait]
impl TransactionRepository for SeaOrmTransactionRepository {
    async fn insert(&self, tx: Transaction) -> DomainResult<()> {
        debug!("Inserting transaction: {} (session {})", tx.id, tx.session_id);
        domain_to_active(&tx).insert(&self.db).await.map_err(db_err)?;
        Ok(())
    }

    async fn find_by_id(&self, id: &str) -> DomainResult<Option<Transaction>> {
        let model = transaction::Entity::find_by_id(id.to_string())
            .one(&self.db)
            .await
            .map_err(db_err)?;
        model.map(model_to_domain).transpose()
    }

    async fn find_by_session(&self, session_id: &str) -> DomainResult<Option<Transaction>> {
        let model = transaction::Entity::find()
            .filter(transaction::Column::SessionId.eq(session_id))
            .one(&self.db)
            .await
            .map_err(db_err)?;
        model.map(model_to_domain).transpose()
    }

    async fn find_by_authorization(
        &self,
        authorization_id: &str,
    ) -> DomainResult<Option<Transaction>> {
        let model = transaction::Entity::find()
            .filter(transaction::Column::AuthorizationId.eq(authorization_id))
            .one(&self.db)
            .await
            .map_err(db_err)?;
        model.map(model_to_domain).transpose()
    }

    async fn find_by_user(&self, user_id: &str) -> DomainResult<Vec<Transaction>> {
        let models = transaction::Entity::find()
            .filter(transaction::Column::UserId.eq(user_id))
            .order_by_desc(transaction::Column::CreatedAt)
            .all(&self.db)
            .await
            .map_err(db_err)?;
        collect(models)
    }

    async fn find_by_station(&self, station_id: &str) -> DomainResult<Vec<Transaction>> {
        let models = transaction::Entity::find()
            .filter(transaction::Column::StationId.eq(station_id))
            .order_by_desc(transaction::Column::CreatedAt)
            .all(&self.db)
            .await
            .map_err(db_err)?;
        collect(models)
    }

    async fn find_needing_reconciliation(&self) -> DomainResult<Vec<Transaction>> {
        let models = transaction::Entity::find()
            .filter(transaction::Column::NeedsReconciliation.eq(true))
            .order_by_asc(transaction::Column::UpdatedAt)
            .all(&self.db)
            .await
            .map_err(db_err)?;
        collect(models)
    }

    async fn update_if_status(
        &self,
        id: &str,
        expected: TransactionStatus,
        patch: TransactionPatch,
    ) -> DomainResult<Option<Transaction>> {
        let existing = transaction::Entity::find_by_id(id.to_string())
            .one(&self.db)
            .await
            .map_err(db_err)?
            .ok_or_else(|| ChargeError::not_found("Transaction", "id", id))?;

        let mut tx = model_to_domain(existing)?;
        if tx.status != expected {
            return Ok(None);
        }
        tx.apply_patch(&patch)?;

        let mut active = domain_to_active(&tx);
        active.id = NotSet;

        // Compare-and-set on the status column
        let result = transaction::Entity::update_many()
            .set(active)
            .filter(transaction::Column::Id.eq(id))
            .filter(transaction::Column::Status.eq(expected.as_str()))
            .exec(&self.db)
            .await
            .map_err(db_err)?;

        if result.rows_affected == 0 {
            warn!(
                "Transaction {} changed status concurrently (expected {})",
                id, expected
            );
            return Ok(None);
        }
        debug!("Transaction {} updated: status={}", id, tx.status);
        Ok(Some(tx))
    }
}
