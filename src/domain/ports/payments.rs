//! Payment processor port
//!
//! Raw remote calls only. Amount validation and retry policy live in the
//! application-level `PaymentGatewayClient`.

use std::collections::HashMap;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::shared::errors::DomainResult;

/// Remote state of an authorization (payment intent)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuthorizationStatus {
    /// Funds held, awaiting capture
    RequiresCapture,
    /// Awaiting customer action or confirmation
    Pending,
    Captured,
    Cancelled,
    Failed,
}

impl AuthorizationStatus {
    /// Map a processor status string (`requires_capture`, `succeeded`, ...)
    pub fn from_processor(s: &str) -> Self {
        match s {
            "requires_capture" => Self::RequiresCapture,
            "succeeded" => Self::Captured,
            "canceled" | "cancelled" => Self::Cancelled,
            "requires_payment_method" => Self::Failed,
            _ => Self::Pending,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::RequiresCapture => "requires_capture",
            Self::Pending => "pending",
            Self::Captured => "captured",
            Self::Cancelled => "cancelled",
            Self::Failed => "failed",
        }
    }
}

#[derive(Debug, Clone)]
pub struct AuthorizationRequest {
    pub customer_id: String,
    pub payment_method_id: String,
    pub amount: i64,
    pub currency: String,
    pub metadata: HashMap<String, String>,
    pub idempotency_key: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Authorization {
    pub authorization_id: String,
    pub client_secret: Option<String>,
    pub amount: i64,
    pub status: AuthorizationStatus,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CaptureOutcome {
    pub status: AuthorizationStatus,
    pub captured_amount: i64,
    /// Processor confirmation reference (charge id)
    pub capture_id: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RefundOutcome {
    pub refund_id: String,
    pub refunded_amount: i64,
}

/// Card summary as reported by the processor
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CardSummary {
    pub id: String,
    pub customer_id: String,
    pub brand: String,
    pub last4: String,
    pub exp_month: u32,
    pub exp_year: u32,
}

#[async_trait]
pub trait PaymentProcessor: Send + Sync {
    /// Stable adapter name for logs ("stripe", "simulated")
    fn name(&self) -> &'static str;

    async fn create_customer(
        &self,
        user_id: &str,
        email: &str,
        idempotency_key: &str,
    ) -> DomainResult<String>;

    /// Place a manual-capture hold.
    async fn authorize(&self, request: &AuthorizationRequest) -> DomainResult<Authorization>;

    /// Capture `amount` (or the full hold). Fails with `InvalidState` when
    /// the authorization was already captured or cancelled.
    async fn capture(
        &self,
        authorization_id: &str,
        amount: Option<i64>,
        idempotency_key: &str,
    ) -> DomainResult<CaptureOutcome>;

    /// Release an uncaptured hold. Fails with `InvalidState` when captured.
    async fn cancel(
        &self,
        authorization_id: &str,
        idempotency_key: &str,
    ) -> DomainResult<AuthorizationStatus>;

    async fn refund(
        &self,
        authorization_id: &str,
        amount: Option<i64>,
        reason: &str,
        idempotency_key: &str,
    ) -> DomainResult<RefundOutcome>;

    async fn list_payment_methods(&self, customer_id: &str) -> DomainResult<Vec<CardSummary>>;

    async fn attach_payment_method(
        &self,
        customer_id: &str,
        payment_method_id: &str,
    ) -> DomainResult<CardSummary>;

    async fn set_default_payment_method(
        &self,
        customer_id: &str,
        payment_method_id: &str,
    ) -> DomainResult<()>;

    async fn detach_payment_method(&self, payment_method_id: &str) -> DomainResult<()>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn processor_status_mapping() {
        assert_eq!(
            AuthorizationStatus::from_processor("requires_capture"),
            AuthorizationStatus::RequiresCapture
        );
        assert_eq!(
            AuthorizationStatus::from_processor("succeeded"),
            AuthorizationStatus::Captured
        );
        assert_eq!(
            AuthorizationStatus::from_processor("canceled"),
            AuthorizationStatus::Cancelled
        );
        assert_eq!(
            AuthorizationStatus::from_processor("processing"),
            AuthorizationStatus::Pending
        );
    }
}
