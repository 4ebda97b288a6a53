//! Payment gateway client
//!
//! Normalises the processor port for the rest of the application:
//! validates amounts before any remote call, retries idempotent reads once,
//! and mirrors saved payment methods into the local store. Mutations
//! (authorize, capture, cancel, refund) are never retried here; callers
//! pass one idempotency key per logical operation.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::Utc;
use tracing::{error, info, warn};

use crate::domain::ports::payments::{
    Authorization, AuthorizationRequest, AuthorizationStatus, CaptureOutcome, CardSummary,
    PaymentProcessor, RefundOutcome,
};
use crate::domain::{ChargeError, DomainResult, PaymentMethod, RepositoryProvider};
use crate::shared::utills::{retry_with_backoff, RetryConfig};
use crate::shared::validations::is_currency_code;

pub struct PaymentGatewayClient {
    processor: Arc<dyn PaymentProcessor>,
    repos: Arc<dyn RepositoryProvider>,
    minimum_amount: i64,
    read_retry: RetryConfig,
}

impl PaymentGatewayClient {
    pub fn new(
        processor: Arc<dyn PaymentProcessor>,
        repos: Arc<dyn RepositoryProvider>,
        minimum_amount: i64,
    ) -> Self {
        Self {
            processor,
            repos,
            minimum_amount,
            read_retry: RetryConfig::read_once(),
        }
    }

    pub fn with_read_retry(mut self, retry: RetryConfig) -> Self {
        self.read_retry = retry;
        self
    }

    pub fn minimum_amount(&self) -> i64 {
        self.minimum_amount
    }

    pub fn processor_name(&self) -> &'static str {
        self.processor.name()
    }

    // ── Authorizations ─────────────────────────────────────────

    /// Place a hold of `amount` minor units.
    ///
    /// An authorization that comes back in any state other than
    /// capturable (e.g. it needs customer action) is released again and
    /// reported as a gateway error.
    pub async fn authorize(
        &self,
        customer_id: &str,
        payment_method_id: &str,
        amount: i64,
        currency: &str,
        metadata: HashMap<String, String>,
        idempotency_key: &str,
    ) -> DomainResult<Authorization> {
        if amount < self.minimum_amount {
            return Err(ChargeError::InvalidAmount {
                amount,
                minimum: self.minimum_amount,
            });
        }
        if !is_currency_code(currency) {
            return Err(ChargeError::InvalidArgument(format!(
                "unsupported currency code '{}'",
                currency
            )));
        }
        if payment_method_id.is_empty() {
            return Err(ChargeError::InvalidArgument(
                "a payment method is required".into(),
            ));
        }

        let request = AuthorizationRequest {
            customer_id: customer_id.to_string(),
            payment_method_id: payment_method_id.to_string(),
            amount,
            currency: currency.to_string(),
            metadata,
            idempotency_key: idempotency_key.to_string(),
        };
        let auth = self.processor.authorize(&request).await?;

        if auth.status != AuthorizationStatus::RequiresCapture {
            warn!(
                authorization_id = %auth.authorization_id,
                status = auth.status.as_str(),
                "Authorization is not capturable, releasing it"
            );
            let release_key = format!("{}:release", idempotency_key);
            if let Err(e) = self
                .processor
                .cancel(&auth.authorization_id, &release_key)
                .await
            {
                warn!(authorization_id = %auth.authorization_id, error = %e, "Release failed");
            }
            return Err(ChargeError::gateway(
                "authorize",
                format!(
                    "authorization {} ended in status {}",
                    auth.authorization_id,
                    auth.status.as_str()
                ),
            ));
        }

        info!(
            authorization_id = %auth.authorization_id,
            amount,
            currency,
            processor = self.processor.name(),
            "Payment authorized"
        );
        Ok(auth)
    }

    /// Capture `amount` (or the whole hold). Capturing less than the hold
    /// releases the remainder.
    pub async fn capture(
        &self,
        authorization_id: &str,
        amount: Option<i64>,
        idempotency_key: &str,
    ) -> DomainResult<CaptureOutcome> {
        if let Some(amount) = amount {
            if amount <= 0 {
                return Err(ChargeError::InvalidArgument(format!(
                    "capture amount must be positive, got {}",
                    amount
                )));
            }
        }
        let outcome = self
            .processor
            .capture(authorization_id, amount, idempotency_key)
            .await
            .inspect_err(|e| log_invalid_state("capture", authorization_id, e))?;

        let result = if outcome.status == AuthorizationStatus::Captured {
            "captured"
        } else {
            "unexpected"
        };
        metrics::counter!("payment_captures_total", "result" => result).increment(1);
        info!(
            authorization_id,
            captured = outcome.captured_amount,
            status = outcome.status.as_str(),
            "Payment captured"
        );
        Ok(outcome)
    }

    pub async fn cancel(
        &self,
        authorization_id: &str,
        idempotency_key: &str,
    ) -> DomainResult<AuthorizationStatus> {
        let status = self
            .processor
            .cancel(authorization_id, idempotency_key)
            .await
            .inspect_err(|e| log_invalid_state("cancel", authorization_id, e))?;
        metrics::counter!("payment_cancellations_total").increment(1);
        info!(authorization_id, status = status.as_str(), "Authorization cancelled");
        Ok(status)
    }

    pub async fn refund(
        &self,
        authorization_id: &str,
        amount: Option<i64>,
        reason: &str,
        idempotency_key: &str,
    ) -> DomainResult<RefundOutcome> {
        if let Some(amount) = amount {
            if amount <= 0 {
                return Err(ChargeError::InvalidArgument(format!(
                    "refund amount must be positive, got {}",
                    amount
                )));
            }
        }
        let outcome = self
            .processor
            .refund(authorization_id, amount, reason, idempotency_key)
            .await
            .inspect_err(|e| log_invalid_state("refund", authorization_id, e))?;
        info!(
            authorization_id,
            refund_id = %outcome.refund_id,
            refunded = outcome.refunded_amount,
            "Payment refunded"
        );
        Ok(outcome)
    }

    // ── Payment methods ────────────────────────────────────────

    /// Saved cards for a user, read from the processor (retried once on a
    /// transient failure) and mirrored locally.
    pub async fn list_payment_methods(
        &self,
        user_id: &str,
        customer_id: &str,
    ) -> DomainResult<Vec<PaymentMethod>> {
        let processor = self.processor.clone();
        let cards = retry_with_backoff(
            self.read_retry.clone(),
            || {
                let processor = processor.clone();
                async move { processor.list_payment_methods(customer_id).await }
            },
            |err: &ChargeError| err.is_retryable(),
            "list_payment_methods",
        )
        .await?;

        let default_id = self
            .repos
            .payment_methods()
            .find_default(user_id)
            .await?
            .map(|pm| pm.id);

        let mut methods = Vec::with_capacity(cards.len());
        for card in cards {
            let is_default = default_id.as_deref() == Some(card.id.as_str());
            let method = to_payment_method(user_id, card, is_default);
            self.repos.payment_methods().upsert(method.clone()).await?;
            methods.push(method);
        }
        Ok(methods)
    }

    /// Attach a tokenised card to the customer and store it. The first
    /// saved card becomes the default.
    pub async fn save_payment_method(
        &self,
        user_id: &str,
        customer_id: &str,
        payment_method_id: &str,
        make_default: bool,
    ) -> DomainResult<PaymentMethod> {
        if payment_method_id.trim().is_empty() {
            return Err(ChargeError::InvalidArgument(
                "payment method id is required".into(),
            ));
        }
        let card = self
            .processor
            .attach_payment_method(customer_id, payment_method_id)
            .await?;
        let method = to_payment_method(user_id, card, false);
        self.repos.payment_methods().upsert(method.clone()).await?;

        let has_default = self
            .repos
            .payment_methods()
            .find_default(user_id)
            .await?
            .is_some();
        if make_default || !has_default {
            return self
                .set_default_payment_method(user_id, customer_id, &method.id)
                .await;
        }
        Ok(method)
    }

    /// Make one saved card the user's only default, remotely then locally.
    pub async fn set_default_payment_method(
        &self,
        user_id: &str,
        customer_id: &str,
        payment_method_id: &str,
    ) -> DomainResult<PaymentMethod> {
        let method = self.owned_method(user_id, payment_method_id).await?;
        self.processor
            .set_default_payment_method(customer_id, &method.id)
            .await?;
        self.repos
            .payment_methods()
            .set_default(user_id, &method.id)
            .await?;
        info!(user_id, payment_method_id, "Default payment method changed");
        Ok(PaymentMethod {
            is_default: true,
            ..method
        })
    }

    pub async fn delete_payment_method(
        &self,
        user_id: &str,
        payment_method_id: &str,
    ) -> DomainResult<()> {
        let method = self.owned_method(user_id, payment_method_id).await?;
        self.processor.detach_payment_method(&method.id).await?;
        self.repos.payment_methods().delete(&method.id).await?;
        info!(user_id, payment_method_id, "Payment method removed");
        Ok(())
    }

    async fn owned_method(&self, user_id: &str, id: &str) -> DomainResult<PaymentMethod> {
        self.repos
            .payment_methods()
            .find_by_id(id)
            .await?
            .filter(|pm| pm.user_id == user_id)
            .ok_or_else(|| ChargeError::not_found("PaymentMethod", "id", id))
    }
}

fn to_payment_method(user_id: &str, card: CardSummary, is_default: bool) -> PaymentMethod {
    PaymentMethod {
        id: card.id,
        user_id: user_id.to_string(),
        customer_id: card.customer_id,
        brand: card.brand,
        last4: card.last4,
        exp_month: card.exp_month,
        exp_year: card.exp_year,
        is_default,
        created_at: Utc::now(),
    }
}

fn log_invalid_state(operation: &'static str, authorization_id: &str, err: &ChargeError) {
    if matches!(err, ChargeError::InvalidState(_)) {
        error!(operation, authorization_id, error = %err, "Authorization in incompatible state");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use crate::infrastructure::payments::simulated::{ProcessorCall, SimulatedProcessor};
    use crate::infrastructure::storage::InMemoryRepositories;

    fn setup() -> (PaymentGatewayClient, Arc<SimulatedProcessor>) {
        let processor = Arc::new(SimulatedProcessor::new());
        let client = PaymentGatewayClient::new(
            processor.clone(),
            Arc::new(InMemoryRepositories::new()),
            50,
        )
        .with_read_retry(RetryConfig {
            initial_delay: Duration::from_millis(1),
            ..RetryConfig::read_once()
        });
        (client, processor)
    }

    fn card(id: &str) -> CardSummary {
        CardSummary {
            id: id.into(),
            customer_id: "cus_1".into(),
            brand: "visa".into(),
            last4: "4242".into(),
            exp_month: 12,
            exp_year: 2030,
        }
    }

    async fn hold(client: &PaymentGatewayClient, amount: i64) -> Authorization {
        client
            .authorize("cus_1", "pm_1", amount, "usd", HashMap::new(), "sess-1:authorize")
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn rejects_amounts_below_minimum_before_calling_out() {
        let (client, processor) = setup();
        let err = client
            .authorize("cus_1", "pm_1", 49, "usd", HashMap::new(), "k")
            .await
            .unwrap_err();
        assert!(matches!(err, ChargeError::InvalidAmount { amount: 49, minimum: 50 }));
        assert!(processor.calls().is_empty());
    }

    #[tokio::test]
    async fn second_capture_is_invalid_state() {
        let (client, processor) = setup();
        let auth = hold(&client, 2000).await;

        let first = client
            .capture(&auth.authorization_id, Some(510), "sess-1:capture")
            .await
            .unwrap();
        assert_eq!(first.captured_amount, 510);

        let second = client
            .capture(&auth.authorization_id, Some(510), "sess-1:capture-retry")
            .await
            .unwrap_err();
        assert!(matches!(second, ChargeError::InvalidState(_)));
        assert_eq!(processor.captured_amount(&auth.authorization_id), Some(510));
    }

    #[tokio::test]
    async fn cancel_after_capture_is_invalid_state() {
        let (client, _) = setup();
        let auth = hold(&client, 1000).await;
        client
            .capture(&auth.authorization_id, None, "sess-1:capture")
            .await
            .unwrap();
        let err = client
            .cancel(&auth.authorization_id, "sess-1:cancel")
            .await
            .unwrap_err();
        assert!(matches!(err, ChargeError::InvalidState(_)));
    }

    #[tokio::test]
    async fn list_is_retried_once() {
        let (client, processor) = setup();
        processor.set_unreachable(true);
        assert!(client.list_payment_methods("user-1", "cus_1").await.is_err());
        let lists = processor
            .calls()
            .iter()
            .filter(|c| matches!(c, ProcessorCall::ListPaymentMethods { .. }))
            .count();
        assert_eq!(lists, 2);
    }

    #[tokio::test]
    async fn first_saved_card_becomes_default() {
        let (client, processor) = setup();
        processor.add_card(card("pm_1"));
        processor.add_card(card("pm_2"));

        let first = client
            .save_payment_method("user-1", "cus_1", "pm_1", false)
            .await
            .unwrap();
        assert!(first.is_default);
        let second = client
            .save_payment_method("user-1", "cus_1", "pm_2", false)
            .await
            .unwrap();
        assert!(!second.is_default);

        client
            .set_default_payment_method("user-1", "cus_1", "pm_2")
            .await
            .unwrap();
        let listed = client.list_payment_methods("user-1", "cus_1").await.unwrap();
        let defaults: Vec<_> = listed.iter().filter(|m| m.is_default).collect();
        assert_eq!(defaults.len(), 1);
        assert_eq!(defaults[0].id, "pm_2");
    }

    #[tokio::test]
    async fn cannot_touch_another_users_card() {
        let (client, processor) = setup();
        processor.add_card(card("pm_1"));
        client
            .save_payment_method("user-1", "cus_1", "pm_1", true)
            .await
            .unwrap();
        let err = client
            .delete_payment_method("user-2", "pm_1")
            .await
            .unwrap_err();
        assert!(matches!(err, ChargeError::NotFound { .. }));
    }
}
