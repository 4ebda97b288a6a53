//! SeaORM implementation of PaymentMethodRepository

use async_trait::async_trait;
use sea_orm::{
    sea_query::{Expr, OnConflict},
    ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, QueryOrder, Set,
    TransactionTrait,
};

use super::db_err;
use crate::domain::payment_method::{PaymentMethod, PaymentMethodRepository};
use crate::domain::{ChargeError, DomainResult};
use crate::infrastructure::database::entities::payment_method;

pub struct SeaOrmPaymentMethodRepository {
    db: DatabaseConnection,
}

impl SeaOrmPaymentMethodRepository {
    pub fn new(db: DatabaseConnection) -> Self {
        Self { db }
    }
}

fn model_to_domain(m: payment_method::Model) -> PaymentMethod {
    PaymentMethod {
        id: m.id,
        user_id: m.user_id,
        customer_id: m.customer_id,
        brand: m.brand,
        last4: m.last4,
        exp_month: m.exp_month.max(0) as u32,
        exp_year: m.exp_year.max(0) as u32,
        is_default: m.is_default,
        created_at: m.created_at,
    }
}

#[async_trait]
impl PaymentMethodRepository for SeaOrmPaymentMethodRepository {
    async fn upsert(&self, m: PaymentMethod) -> DomainResult<()> {
        let model = payment_method::ActiveModel {
            id: Set(m.id),
            user_id: Set(m.user_id),
            customer_id: Set(m.customer_id),
            brand: Set(m.brand),
            last4: Set(m.last4),
            exp_month: Set(m.exp_month as i32),
            exp_year: Set(m.exp_year as i32),
            is_default: Set(m.is_default),
            created_at: Set(m.created_at),
        };
        payment_method::Entity::insert(model)
            .on_conflict(
                OnConflict::column(payment_method::Column::Id)
                    .update_columns([
                        payment_method::Column::Brand,
                        payment_method::Column::Last4,
                        payment_method::Column::ExpMonth,
                        payment_method::Column::ExpYear,
                        payment_method::Column::IsDefault,
                    ])
                    .to_owned(),
            )
            .exec_without_returning(&self.db)
            .await
            .map_err(db_err)?;
        Ok(())
    }

    async fn find_by_id(&self, id: &str) -> DomainResult<Option<PaymentMethod>> {
        let model = payment_method::Entity::find_by_id(id.to_string())
            .one(&self.db)
            .await
            .map_err(db_err)?;
        Ok(model.map(model_to_domain))
    }

    async fn find_by_user(&self, user_id: &str) -> DomainResult<Vec<PaymentMethod>> {
        let models = payment_method::Entity::find()
            .filter(payment_method::Column::UserId.eq(user_id))
            .order_by_desc(payment_method::Column::CreatedAt)
            .all(&self.db)
            .await
            .map_err(db_err)?;
        Ok(models.into_iter().map(model_to_domain).collect())
    }

    async fn find_default(&self, user_id: &str) -> DomainResult<Option<PaymentMethod>> {
        let model = payment_method::Entity::find()
            .filter(payment_method::Column::UserId.eq(user_id))
            .filter(payment_method::Column::IsDefault.eq(true))
            .one(&self.db)
            .await
            .map_err(db_err)?;
        Ok(model.map(model_to_domain))
    }

    async fn set_default(&self, user_id: &str, id: &str) -> DomainResult<()> {
        let txn = self.db.begin().await.map_err(db_err)?;

        let owned = payment_method::Entity::find_by_id(id.to_string())
            .filter(payment_method::Column::UserId.eq(user_id))
            .one(&txn)
            .await
            .map_err(db_err)?;
        if owned.is_none() {
            txn.rollback().await.map_err(db_err)?;
            return Err(ChargeError::not_found("PaymentMethod", "id", id));
        }

        payment_method::Entity::update_many()
            .col_expr(payment_method::Column::IsDefault, Expr::value(false))
            .filter(payment_method::Column::UserId.eq(user_id))
            .exec(&txn)
            .await
            .map_err(db_err)?;

        payment_method::Entity::update_many()
            .col_expr(payment_method::Column::IsDefault, Expr::value(true))
            .filter(payment_method::Column::Id.eq(id))
            .exec(&txn)
            .await
            .map_err(db_err)?;

        txn.commit().await.map_err(db_err)?;
        Ok(())
    }

    async fn delete(&self, id: &str) -> DomainResult<()> {
        let result = payment_method::Entity::delete_by_id(id.to_string())
            .exec(&self.db)
            .await
            .map_err(db_err)?;
        if result.rows_affected == 0 {
            return Err(ChargeError::not_found("PaymentMethod", "id", id));
        }
        Ok(())
    }
}
