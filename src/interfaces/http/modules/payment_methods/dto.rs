use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use validator::Validate;

use crate::domain::PaymentMethod;

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct PaymentMethodResponse {
    pub id: String,
    pub brand: String,
    pub last4: String,
    pub exp_month: u32,
    pub exp_year: u32,
    pub is_default: bool,
    /// e.g. "Visa •••• 4242"
    pub label: String,
}

impl From<PaymentMethod> for PaymentMethodResponse {
    fn from(pm: PaymentMethod) -> Self {
        Self {
            label: pm.display_label(),
            id: pm.id,
            brand: pm.brand,
            last4: pm.last4,
            exp_month: pm.exp_month,
            exp_year: pm.exp_year,
            is_default: pm.is_default,
        }
    }
}

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct SavePaymentMethodRequest {
    /// Token produced by client-side card collection
    #[validate(length(min = 1, max = 128, message = "payment method id is required"))]
    pub payment_method_id: String,
    #[serde(default)]
    pub make_default: bool,
}
