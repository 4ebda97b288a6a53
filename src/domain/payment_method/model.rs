use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Card summary; never contains the full card number
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentMethod {
    /// Processor payment method id (`pm_...`)
    pub id: String,
    pub user_id: String,
    pub customer_id: String,
    pub brand: String,
    pub last4: String,
    pub exp_month: u32,
    pub exp_year: u32,
    pub is_default: bool,
    pub created_at: DateTime<Utc>,
}

impl PaymentMethod {
    /// `"visa •••• 4242 (12/30)"`
    pub fn display_label(&self) -> String {
        format!(
            "{} •••• {} ({:02}/{:02})",
            self.brand,
            self.last4,
            self.exp_month,
            self.exp_year % 100
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn label_masks_card() {
        let pm = PaymentMethod {
            id: "pm_1".into(),
            user_id: "u1".into(),
            customer_id: "cus_1".into(),
            brand: "visa".into(),
            last4: "4242".into(),
            exp_month: 4,
            exp_year: 2030,
            is_default: true,
            created_at: Utc::now(),
        };
        assert_eq!(pm.display_label(), "visa •••• 4242 (04/30)");
    }
}
