use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Links an application user to a payment-processor customer
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CustomerRecord {
    pub user_id: String,
    pub customer_id: String,
    pub email: String,
    pub created_at: DateTime<Utc>,
}

impl CustomerRecord {
    pub fn new(
        user_id: impl Into<String>,
        customer_id: impl Into<String>,
        email: impl Into<String>,
    ) -> Self {
        Self {
            user_id: user_id.into(),
            customer_id: customer_id.into(),
            email: email.into(),
            created_at: Utc::now(),
        }
    }
}
