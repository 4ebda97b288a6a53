//! SeaORM implementation of CustomerRepository

use async_trait::async_trait;
use log::info;
use sea_orm::{sea_query::OnConflict, DatabaseConnection, EntityTrait, Set};

use super::db_err;
use crate::domain::customer::{CustomerRecord, CustomerRepository};
use crate::domain::{ChargeError, DomainResult};
use crate::infrastructure::database::entities::customer;

pub struct SeaOrmCustomerRepository {
    db: DatabaseConnection,
}

impl SeaOrmCustomerRepository {
    pub fn new(db: DatabaseConnection) -> Self {
        Self { db }
    }
}

fn model_to_domain(m: customer::Model) -> CustomerRecord {
    CustomerRecord {
        user_id: m.user_id,
        customer_id: m.customer_id,
        email: m.email,
        created_at: m.created_at,
    }
}

#[async_trait]
impl CustomerRepository for SeaOrmCustomerRepository {
    async fn find_by_user(&self, user_id: &str) -> DomainResult<Option<CustomerRecord>> {
        let model = customer::Entity::find_by_id(user_id.to_string())
            .one(&self.db)
            .await
            .map_err(db_err)?;
        Ok(model.map(model_to_domain))
    }

    async fn insert_if_absent(&self, record: CustomerRecord) -> DomainResult<CustomerRecord> {
        let user_id = record.user_id.clone();
        let model = customer::ActiveModel {
            user_id: Set(record.user_id),
            customer_id: Set(record.customer_id),
            email: Set(record.email),
            created_at: Set(record.created_at),
        };

        // Primary key on user_id: a losing writer inserts nothing
        let inserted = customer::Entity::insert(model)
            .on_conflict(
                OnConflict::column(customer::Column::UserId)
                    .do_nothing()
                    .to_owned(),
            )
            .exec_without_returning(&self.db)
            .await
            .map_err(db_err)?;
        if inserted == 0 {
            info!("Customer mapping for user {} already existed", user_id);
        }

        self.find_by_user(&user_id).await?.ok_or_else(|| {
            ChargeError::Persistence(format!("customer mapping for {} vanished", user_id))
        })
    }
}
