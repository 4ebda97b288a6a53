//! Stripe payment-intent adapter
//!
//! Plain REST over `reqwest`: form-encoded requests, bearer secret key,
//! manual-capture payment intents. Every mutating call carries an
//! `Idempotency-Key` header.

use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use tracing::{debug, warn};

use crate::config::PaymentsConfig;
use crate::domain::ports::payments::{
    Authorization, AuthorizationRequest, AuthorizationStatus, CaptureOutcome, CardSummary,
    PaymentProcessor, RefundOutcome,
};
use crate::domain::{ChargeError, DomainResult};

pub struct StripeProcessor {
    client: reqwest::Client,
    api_base: String,
    secret_key: String,
}

// ── Wire types ────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
struct ErrorEnvelope {
    error: StripeError,
}

#[derive(Debug, Deserialize)]
struct StripeError {
    #[serde(default)]
    code: Option<String>,
    #[serde(default)]
    message: Option<String>,
    #[serde(rename = "type", default)]
    kind: Option<String>,
}

#[derive(Debug, Deserialize)]
struct CustomerObject {
    id: String,
}

#[derive(Debug, Deserialize)]
struct PaymentIntentObject {
    id: String,
    status: String,
    amount: i64,
    #[serde(default)]
    amount_received: i64,
    #[serde(default)]
    client_secret: Option<String>,
    #[serde(default)]
    latest_charge: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RefundObject {
    id: String,
    amount: i64,
}

#[derive(Debug, Deserialize)]
struct CardObject {
    brand: String,
    last4: String,
    exp_month: u32,
    exp_year: u32,
}

#[derive(Debug, Deserialize)]
struct PaymentMethodObject {
    id: String,
    #[serde(default)]
    customer: Option<String>,
    card: Option<CardObject>,
}

#[derive(Debug, Deserialize)]
struct ListObject<T> {
    data: Vec<T>,
}

impl PaymentMethodObject {
    fn into_summary(self, fallback_customer: &str) -> CardSummary {
        let card = self.card.unwrap_or(CardObject {
            brand: "unknown".to_string(),
            last4: String::new(),
            exp_month: 0,
            exp_year: 0,
        });
        CardSummary {
            id: self.id,
            customer_id: self
                .customer
                .unwrap_or_else(|| fallback_customer.to_string()),
            brand: card.brand,
            last4: card.last4,
            exp_month: card.exp_month,
            exp_year: card.exp_year,
        }
    }
}

// ── Error mapping ─────────────────────────────────────────────

fn transport_error(operation: &'static str, e: reqwest::Error) -> ChargeError {
    if e.is_timeout() || e.is_connect() || e.is_request() {
        ChargeError::gateway_transient(operation, e.to_string())
    } else {
        ChargeError::gateway(operation, e.to_string())
    }
}

fn api_error(operation: &'static str, status: reqwest::StatusCode, body: &str) -> ChargeError {
    let parsed = serde_json::from_str::<ErrorEnvelope>(body).ok().map(|e| e.error);
    let code = parsed.as_ref().and_then(|e| e.code.clone()).unwrap_or_default();
    let message = parsed
        .as_ref()
        .and_then(|e| e.message.clone())
        .unwrap_or_else(|| body.chars().take(200).collect());
    let kind = parsed.and_then(|e| e.kind).unwrap_or_default();

    if code == "payment_intent_unexpected_state" || code == "charge_already_captured" {
        return ChargeError::InvalidState(format!("{}: {}", operation, message));
    }
    if status.is_server_error() || status == reqwest::StatusCode::TOO_MANY_REQUESTS {
        return ChargeError::gateway_transient(operation, format!("{} ({})", message, status));
    }
    ChargeError::gateway(
        operation,
        format!("{} [{} {}] ({})", message, kind, code, status),
    )
}

impl StripeProcessor {
    pub fn new(cfg: &PaymentsConfig) -> DomainResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(cfg.request_timeout_secs))
            .build()
            .map_err(|e| ChargeError::gateway("client", e.to_string()))?;
        Ok(Self {
            client,
            api_base: cfg.api_base.trim_end_matches('/').to_string(),
            secret_key: cfg.secret_key.clone(),
        })
    }

    async fn send<T: for<'de> Deserialize<'de>>(
        &self,
        operation: &'static str,
        request: reqwest::RequestBuilder,
    ) -> DomainResult<T> {
        let response = request
            .bearer_auth(&self.secret_key)
            .send()
            .await
            .map_err(|e| transport_error(operation, e))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| transport_error(operation, e))?;

        if !status.is_success() {
            let err = api_error(operation, status, &body);
            warn!(operation, %status, error = %err, "Stripe request failed");
            return Err(err);
        }
        serde_json::from_str(&body)
            .map_err(|e| ChargeError::gateway(operation, format!("Unexpected response: {}", e)))
    }

    async fn post<T: for<'de> Deserialize<'de>>(
        &self,
        operation: &'static str,
        path: &str,
        form: &[(String, String)],
        idempotency_key: Option<&str>,
    ) -> DomainResult<T> {
        let url = format!("{}{}", self.api_base, path);
        debug!(operation, url = %url, "Stripe POST");
        let mut request = self.client.post(&url).form(form);
        if let Some(key) = idempotency_key {
            request = request.header("Idempotency-Key", key);
        }
        self.send(operation, request).await
    }

    async fn get<T: for<'de> Deserialize<'de>>(
        &self,
        operation: &'static str,
        path: &str,
        query: &[(&str, &str)],
    ) -> DomainResult<T> {
        let url = format!("{}{}", self.api_base, path);
        self.send(operation, self.client.get(&url).query(query)).await
    }
}

fn pair(k: &str, v: impl ToString) -> (String, String) {
    (k.to_string(), v.to_string())
}

#[async_trait]
impl PaymentProcessor for StripeProcessor {
    fn name(&self) -> &'static str {
        "stripe"
    }

    async fn create_customer(
        &self,
        user_id: &str,
        email: &str,
        idempotency_key: &str,
    ) -> DomainResult<String> {
        let form = vec![pair("email", email), pair("metadata[user_id]", user_id)];
        let customer: CustomerObject = self
            .post("create_customer", "/v1/customers", &form, Some(idempotency_key))
            .await?;
        Ok(customer.id)
    }

    async fn authorize(&self, request: &AuthorizationRequest) -> DomainResult<Authorization> {
        let mut form = vec![
            pair("amount", request.amount),
            pair("currency", &request.currency),
            pair("customer", &request.customer_id),
            pair("payment_method", &request.payment_method_id),
            pair("capture_method", "manual"),
            pair("confirm", "true"),
            pair("off_session", "true"),
        ];
        for (k, v) in &request.metadata {
            form.push(pair(&format!("metadata[{}]", k), v));
        }

        let intent: PaymentIntentObject = self
            .post(
                "authorize",
                "/v1/payment_intents",
                &form,
                Some(&request.idempotency_key),
            )
            .await?;
        Ok(Authorization {
            status: AuthorizationStatus::from_processor(&intent.status),
            authorization_id: intent.id,
            client_secret: intent.client_secret,
            amount: intent.amount,
        })
    }

    async fn capture(
        &self,
        authorization_id: &str,
        amount: Option<i64>,
        idempotency_key: &str,
    ) -> DomainResult<CaptureOutcome> {
        let mut form = Vec::new();
        if let Some(amount) = amount {
            form.push(pair("amount_to_capture", amount));
        }
        let intent: PaymentIntentObject = self
            .post(
                "capture",
                &format!("/v1/payment_intents/{}/capture", authorization_id),
                &form,
                Some(idempotency_key),
            )
            .await?;
        Ok(CaptureOutcome {
            status: AuthorizationStatus::from_processor(&intent.status),
            captured_amount: intent.amount_received,
            capture_id: intent.latest_charge.unwrap_or(intent.id),
        })
    }

    async fn cancel(
        &self,
        authorization_id: &str,
        idempotency_key: &str,
    ) -> DomainResult<AuthorizationStatus> {
        let intent: PaymentIntentObject = self
            .post(
                "cancel",
                &format!("/v1/payment_intents/{}/cancel", authorization_id),
                &[],
                Some(idempotency_key),
            )
            .await?;
        Ok(AuthorizationStatus::from_processor(&intent.status))
    }

    async fn refund(
        &self,
        authorization_id: &str,
        amount: Option<i64>,
        reason: &str,
        idempotency_key: &str,
    ) -> DomainResult<RefundOutcome> {
        let mut form = vec![
            pair("payment_intent", authorization_id),
            pair("reason", "requested_by_customer"),
            pair("metadata[reason]", reason),
        ];
        if let Some(amount) = amount {
            form.push(pair("amount", amount));
        }
        let refund: RefundObject = self
            .post("refund", "/v1/refunds", &form, Some(idempotency_key))
            .await?;
        Ok(RefundOutcome {
            refund_id: refund.id,
            refunded_amount: refund.amount,
        })
    }

    async fn list_payment_methods(&self, customer_id: &str) -> DomainResult<Vec<CardSummary>> {
        let list: ListObject<PaymentMethodObject> = self
            .get(
                "list_payment_methods",
                "/v1/payment_methods",
                &[("customer", customer_id), ("type", "card")],
            )
            .await?;
        Ok(list
            .data
            .into_iter()
            .map(|pm| pm.into_summary(customer_id))
            .collect())
    }

    async fn attach_payment_method(
        &self,
        customer_id: &str,
        payment_method_id: &str,
    ) -> DomainResult<CardSummary> {
        let form = vec![pair("customer", customer_id)];
        let pm: PaymentMethodObject = self
            .post(
                "attach_payment_method",
                &format!("/v1/payment_methods/{}/attach", payment_method_id),
                &form,
                Some(&format!("{}:attach:{}", customer_id, payment_method_id)),
            )
            .await?;
        Ok(pm.into_summary(customer_id))
    }

    async fn set_default_payment_method(
        &self,
        customer_id: &str,
        payment_method_id: &str,
    ) -> DomainResult<()> {
        let form = vec![pair(
            "invoice_settings[default_payment_method]",
            payment_method_id,
        )];
        let _: CustomerObject = self
            .post(
                "set_default_payment_method",
                &format!("/v1/customers/{}", customer_id),
                &form,
                None,
            )
            .await?;
        Ok(())
    }

    async fn detach_payment_method(&self, payment_method_id: &str) -> DomainResult<()> {
        let _: PaymentMethodObject = self
            .post(
                "detach_payment_method",
                &format!("/v1/payment_methods/{}/detach", payment_method_id),
                &[],
                None,
            )
            .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unexpected_state_maps_to_invalid_state() {
        let body = r#"{"error":{"code":"payment_intent_unexpected_state","message":"This PaymentIntent could not be captured because it has a status of canceled.","type":"invalid_request_error"}}"#;
        let err = api_error("capture", reqwest::StatusCode::BAD_REQUEST, body);
        assert!(matches!(err, ChargeError::InvalidState(_)));
    }

    #[test]
    fn server_errors_are_transient() {
        let err = api_error(
            "list_payment_methods",
            reqwest::StatusCode::BAD_GATEWAY,
            "upstream down",
        );
        assert!(err.is_retryable());
    }

    #[test]
    fn card_declines_are_permanent() {
        let body = r#"{"error":{"code":"card_declined","message":"Your card was declined.","type":"card_error"}}"#;
        let err = api_error("authorize", reqwest::StatusCode::PAYMENT_REQUIRED, body);
        assert!(matches!(err, ChargeError::Gateway { transient: false, .. }));
        assert!(err.to_string().contains("declined"));
    }

    #[test]
    fn payment_method_summary_parsing() {
        let pm: PaymentMethodObject = serde_json::from_str(
            r#"{"id":"pm_1","customer":"cus_1","card":{"brand":"visa","last4":"4242","exp_month":12,"exp_year":2030}}"#,
        )
        .unwrap();
        let summary = pm.into_summary("cus_fallback");
        assert_eq!(summary.customer_id, "cus_1");
        assert_eq!(summary.last4, "4242");
    }
}
