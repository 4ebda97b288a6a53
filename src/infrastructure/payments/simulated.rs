//! In-memory payment processor
//!
//! Tracks each authorization's remote state the way a real processor does,
//! so double capture, capture after cancel and cancel after capture all
//! fail with `InvalidState`. Mutations honour idempotency keys: a replayed
//! key returns the first result without a second effect.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use dashmap::DashMap;
use tracing::debug;

use crate::domain::ports::payments::{
    Authorization, AuthorizationRequest, AuthorizationStatus, CaptureOutcome, CardSummary,
    PaymentProcessor, RefundOutcome,
};
use crate::domain::{ChargeError, DomainResult};

/// One recorded call, in arrival order
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProcessorCall {
    CreateCustomer { user_id: String },
    Authorize { amount: i64, idempotency_key: String },
    Capture { authorization_id: String, amount: Option<i64> },
    Cancel { authorization_id: String },
    Refund { authorization_id: String, amount: Option<i64> },
    ListPaymentMethods { customer_id: String },
}

#[derive(Debug, Clone)]
struct SimIntent {
    amount: i64,
    status: AuthorizationStatus,
    captured: i64,
    refunded: i64,
}

#[derive(Debug, Clone)]
enum Replay {
    Customer(String),
    Authorization(Authorization),
    Capture(CaptureOutcome),
    Cancel(AuthorizationStatus),
    Refund(RefundOutcome),
}

#[derive(Default)]
pub struct SimulatedProcessor {
    intents: DashMap<String, SimIntent>,
    cards: DashMap<String, CardSummary>,
    replays: DashMap<String, Replay>,
    calls: Mutex<Vec<ProcessorCall>>,
    seq: AtomicU64,
    decline_authorizations: AtomicBool,
    fail_captures: AtomicBool,
    unreachable: AtomicBool,
}

impl SimulatedProcessor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Decline every new authorization (card declined).
    pub fn set_decline_authorizations(&self, on: bool) {
        self.decline_authorizations.store(on, Ordering::SeqCst);
    }

    /// Make every capture fail with a non-retryable gateway error.
    pub fn set_fail_captures(&self, on: bool) {
        self.fail_captures.store(on, Ordering::SeqCst);
    }

    /// Fail every call with a transient transport error.
    pub fn set_unreachable(&self, on: bool) {
        self.unreachable.store(on, Ordering::SeqCst);
    }

    /// Register a card the way a client-side tokenization would.
    pub fn add_card(&self, card: CardSummary) {
        self.cards.insert(card.id.clone(), card);
    }

    pub fn calls(&self) -> Vec<ProcessorCall> {
        self.calls.lock().map(|c| c.clone()).unwrap_or_default()
    }

    pub fn authorization_status(&self, authorization_id: &str) -> Option<AuthorizationStatus> {
        self.intents.get(authorization_id).map(|i| i.status.clone())
    }

    pub fn captured_amount(&self, authorization_id: &str) -> Option<i64> {
        self.intents.get(authorization_id).map(|i| i.captured)
    }

    fn record(&self, call: ProcessorCall) {
        if let Ok(mut calls) = self.calls.lock() {
            calls.push(call);
        }
    }

    fn next_id(&self, prefix: &str) -> String {
        format!("{}_sim_{}", prefix, self.seq.fetch_add(1, Ordering::SeqCst) + 1)
    }

    fn check_reachable(&self, operation: &'static str) -> DomainResult<()> {
        if self.unreachable.load(Ordering::SeqCst) {
            return Err(ChargeError::gateway_transient(operation, "connection refused"));
        }
        Ok(())
    }

    fn replay(&self, key: &str) -> Option<Replay> {
        let hit = self.replays.get(key).map(|r| r.clone());
        if hit.is_some() {
            debug!(idempotency_key = key, "Replaying idempotent response");
        }
        hit
    }
}

#[async_trait]
impl PaymentProcessor for SimulatedProcessor {
    fn name(&self) -> &'static str {
        "simulated"
    }

    async fn create_customer(
        &self,
        user_id: &str,
        _email: &str,
        idempotency_key: &str,
    ) -> DomainResult<String> {
        self.check_reachable("create_customer")?;
        if let Some(Replay::Customer(id)) = self.replay(idempotency_key) {
            return Ok(id);
        }
        self.record(ProcessorCall::CreateCustomer {
            user_id: user_id.to_string(),
        });
        let id = self.next_id("cus");
        self.replays
            .insert(idempotency_key.to_string(), Replay::Customer(id.clone()));
        Ok(id)
    }

    async fn authorize(&self, request: &AuthorizationRequest) -> DomainResult<Authorization> {
        self.check_reachable("authorize")?;
        if let Some(Replay::Authorization(auth)) = self.replay(&request.idempotency_key) {
            return Ok(auth);
        }
        self.record(ProcessorCall::Authorize {
            amount: request.amount,
            idempotency_key: request.idempotency_key.clone(),
        });
        if self.decline_authorizations.load(Ordering::SeqCst) {
            return Err(ChargeError::gateway("authorize", "Your card was declined."));
        }

        let id = self.next_id("pi");
        self.intents.insert(
            id.clone(),
            SimIntent {
                amount: request.amount,
                status: AuthorizationStatus::RequiresCapture,
                captured: 0,
                refunded: 0,
            },
        );
        let auth = Authorization {
            client_secret: Some(format!("{}_secret", id)),
            authorization_id: id,
            amount: request.amount,
            status: AuthorizationStatus::RequiresCapture,
        };
        self.replays.insert(
            request.idempotency_key.clone(),
            Replay::Authorization(auth.clone()),
        );
        Ok(auth)
    }

    async fn capture(
        &self,
        authorization_id: &str,
        amount: Option<i64>,
        idempotency_key: &str,
    ) -> DomainResult<CaptureOutcome> {
        self.check_reachable("capture")?;
        if let Some(Replay::Capture(outcome)) = self.replay(idempotency_key) {
            return Ok(outcome);
        }
        self.record(ProcessorCall::Capture {
            authorization_id: authorization_id.to_string(),
            amount,
        });
        if self.fail_captures.load(Ordering::SeqCst) {
            return Err(ChargeError::gateway("capture", "processor rejected capture"));
        }

        let mut intent = self
            .intents
            .get_mut(authorization_id)
            .ok_or_else(|| ChargeError::gateway("capture", "No such payment_intent"))?;
        if intent.status != AuthorizationStatus::RequiresCapture {
            return Err(ChargeError::InvalidState(format!(
                "capture: authorization {} has status {}",
                authorization_id,
                intent.status.as_str()
            )));
        }
        let to_capture = amount.unwrap_or(intent.amount);
        if to_capture <= 0 || to_capture > intent.amount {
            return Err(ChargeError::gateway(
                "capture",
                format!(
                    "amount_to_capture {} must be between 1 and {}",
                    to_capture, intent.amount
                ),
            ));
        }
        intent.status = AuthorizationStatus::Captured;
        intent.captured = to_capture;
        drop(intent);

        let outcome = CaptureOutcome {
            status: AuthorizationStatus::Captured,
            captured_amount: to_capture,
            capture_id: self.next_id("ch"),
        };
        self.replays
            .insert(idempotency_key.to_string(), Replay::Capture(outcome.clone()));
        Ok(outcome)
    }

    async fn cancel(
        &self,
        authorization_id: &str,
        idempotency_key: &str,
    ) -> DomainResult<AuthorizationStatus> {
        self.check_reachable("cancel")?;
        if let Some(Replay::Cancel(status)) = self.replay(idempotency_key) {
            return Ok(status);
        }
        self.record(ProcessorCall::Cancel {
            authorization_id: authorization_id.to_string(),
        });

        let mut intent = self
            .intents
            .get_mut(authorization_id)
            .ok_or_else(|| ChargeError::gateway("cancel", "No such payment_intent"))?;
        if intent.status != AuthorizationStatus::RequiresCapture {
            return Err(ChargeError::InvalidState(format!(
                "cancel: authorization {} has status {}",
                authorization_id,
                intent.status.as_str()
            )));
        }
        intent.status = AuthorizationStatus::Cancelled;
        drop(intent);

        self.replays.insert(
            idempotency_key.to_string(),
            Replay::Cancel(AuthorizationStatus::Cancelled),
        );
        Ok(AuthorizationStatus::Cancelled)
    }

    async fn refund(
        &self,
        authorization_id: &str,
        amount: Option<i64>,
        _reason: &str,
        idempotency_key: &str,
    ) -> DomainResult<RefundOutcome> {
        self.check_reachable("refund")?;
        if let Some(Replay::Refund(outcome)) = self.replay(idempotency_key) {
            return Ok(outcome);
        }
        self.record(ProcessorCall::Refund {
            authorization_id: authorization_id.to_string(),
            amount,
        });

        let mut intent = self
            .intents
            .get_mut(authorization_id)
            .ok_or_else(|| ChargeError::gateway("refund", "No such payment_intent"))?;
        if intent.status != AuthorizationStatus::Captured {
            return Err(ChargeError::InvalidState(format!(
                "refund: authorization {} has status {}",
                authorization_id,
                intent.status.as_str()
            )));
        }
        let remaining = intent.captured - intent.refunded;
        let to_refund = amount.unwrap_or(remaining);
        if to_refund <= 0 || to_refund > remaining {
            return Err(ChargeError::gateway(
                "refund",
                format!("refund amount {} exceeds refundable {}", to_refund, remaining),
            ));
        }
        intent.refunded += to_refund;
        drop(intent);

        let outcome = RefundOutcome {
            refund_id: self.next_id("re"),
            refunded_amount: to_refund,
        };
        self.replays
            .insert(idempotency_key.to_string(), Replay::Refund(outcome.clone()));
        Ok(outcome)
    }

    async fn list_payment_methods(&self, customer_id: &str) -> DomainResult<Vec<CardSummary>> {
        self.record(ProcessorCall::ListPaymentMethods {
            customer_id: customer_id.to_string(),
        });
        self.check_reachable("list_payment_methods")?;
        Ok(self
            .cards
            .iter()
            .filter(|c| c.customer_id == customer_id)
            .map(|c| c.value().clone())
            .collect())
    }

    async fn attach_payment_method(
        &self,
        customer_id: &str,
        payment_method_id: &str,
    ) -> DomainResult<CardSummary> {
        self.check_reachable("attach_payment_method")?;
        let mut card = self.cards.entry(payment_method_id.to_string()).or_insert_with(|| {
            CardSummary {
                id: payment_method_id.to_string(),
                customer_id: customer_id.to_string(),
                brand: "visa".to_string(),
                last4: "4242".to_string(),
                exp_month: 12,
                exp_year: 2030,
            }
        });
        card.customer_id = customer_id.to_string();
        Ok(card.clone())
    }

    async fn set_default_payment_method(
        &self,
        customer_id: &str,
        payment_method_id: &str,
    ) -> DomainResult<()> {
        self.check_reachable("set_default_payment_method")?;
        match self.cards.get(payment_method_id) {
            Some(card) if card.customer_id == customer_id => Ok(()),
            _ => Err(ChargeError::gateway(
                "set_default_payment_method",
                format!("No such payment_method: {}", payment_method_id),
            )),
        }
    }

    async fn detach_payment_method(&self, payment_method_id: &str) -> DomainResult<()> {
        self.check_reachable("detach_payment_method")?;
        self.cards.remove(payment_method_id).ok_or_else(|| {
            ChargeError::gateway(
                "detach_payment_method",
                format!("No such payment_method: {}", payment_method_id),
            )
        })?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn request(key: &str, amount: i64) -> AuthorizationRequest {
        AuthorizationRequest {
            customer_id: "cus_1".into(),
            payment_method_id: "pm_1".into(),
            amount,
            currency: "usd".into(),
            metadata: HashMap::new(),
            idempotency_key: key.into(),
        }
    }

    #[tokio::test]
    async fn partial_capture_then_second_capture_is_invalid_state() {
        let p = SimulatedProcessor::new();
        let auth = p.authorize(&request("s1:authorize", 2000)).await.unwrap();

        let first = p
            .capture(&auth.authorization_id, Some(510), "s1:capture")
            .await
            .unwrap();
        assert_eq!(first.captured_amount, 510);

        let second = p
            .capture(&auth.authorization_id, Some(510), "s1:capture:retry")
            .await
            .unwrap_err();
        assert!(matches!(second, ChargeError::InvalidState(_)));
        assert_eq!(p.captured_amount(&auth.authorization_id), Some(510));
    }

    #[tokio::test]
    async fn replayed_key_has_no_second_effect() {
        let p = SimulatedProcessor::new();
        let a = p.authorize(&request("k", 1500)).await.unwrap();
        let b = p.authorize(&request("k", 1500)).await.unwrap();
        assert_eq!(a.authorization_id, b.authorization_id);
        assert_eq!(
            p.calls()
                .iter()
                .filter(|c| matches!(c, ProcessorCall::Authorize { .. }))
                .count(),
            1
        );
    }

    #[tokio::test]
    async fn cancel_after_capture_and_capture_after_cancel_fail() {
        let p = SimulatedProcessor::new();
        let a = p.authorize(&request("a", 1000)).await.unwrap();
        p.capture(&a.authorization_id, None, "a:capture").await.unwrap();
        assert!(matches!(
            p.cancel(&a.authorization_id, "a:cancel").await,
            Err(ChargeError::InvalidState(_))
        ));

        let b = p.authorize(&request("b", 1000)).await.unwrap();
        p.cancel(&b.authorization_id, "b:cancel").await.unwrap();
        assert!(matches!(
            p.capture(&b.authorization_id, Some(100), "b:capture").await,
            Err(ChargeError::InvalidState(_))
        ));
    }

    #[tokio::test]
    async fn refund_is_bounded_by_captured_amount() {
        let p = SimulatedProcessor::new();
        let a = p.authorize(&request("a", 1000)).await.unwrap();
        p.capture(&a.authorization_id, Some(600), "a:capture")
            .await
            .unwrap();
        assert!(p
            .refund(&a.authorization_id, Some(700), "too much", "a:refund")
            .await
            .is_err());
        let refund = p
            .refund(&a.authorization_id, None, "requested", "a:refund:2")
            .await
            .unwrap();
        assert_eq!(refund.refunded_amount, 600);
    }
}
