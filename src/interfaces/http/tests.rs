use std::sync::Arc;
use std::time::Instant;

use axum::body::{to_bytes, Body};
use axum::http::{header, Request, StatusCode};
use axum::Router;
use chrono::Utc;
use rust_decimal::Decimal;
use serde_json::{json, Value};
use tower::ServiceExt;

use super::middleware::AuthState;
use super::{create_api_router, ApiState};
use crate::application::{
    ChargingCoordinator, CoordinatorConfig, CustomerResolver, PaymentGatewayClient,
    PaymentWebhookHandler, ReceiptDispatcher, RefundService, SessionStore,
};
use crate::config::SimulatorConfig;
use crate::domain::{
    CustomerRecord, PaymentMethod, RepositoryProvider, Station, StationStatus,
};
use crate::infrastructure::crypto::jwt::{create_token, JwtConfig, TokenClaims};
use crate::infrastructure::crypto::webhook_signature::signature_header;
use crate::infrastructure::hardware::StationSimulator;
use crate::infrastructure::mail::LogMailer;
use crate::infrastructure::payments::SimulatedProcessor;
use crate::infrastructure::storage::InMemoryRepositories;
use crate::notifications::ChangeFeed;

const JWT_SECRET: &str = "test-secret";
const WEBHOOK_SECRET: &str = "whsec_test";

fn jwt_config() -> JwtConfig {
    JwtConfig {
        secret: JWT_SECRET.into(),
        issuer: None,
    }
}

fn token(user_id: &str) -> String {
    let config = jwt_config();
    let claims = TokenClaims::new(
        user_id,
        &format!("{}@example.com", user_id),
        chrono::Duration::hours(1),
        &config,
    );
    create_token(&claims, &config).unwrap()
}

struct TestApp {
    router: Router,
    repos: Arc<InMemoryRepositories>,
}

async fn app() -> TestApp {
    let repos = Arc::new(InMemoryRepositories::new());
    let now = Utc::now();
    repos
        .stations()
        .save(Station {
            id: "st-1".into(),
            name: "Harbor Depot".into(),
            owner_id: "owner-1".into(),
            latitude: 41.31,
            longitude: 69.24,
            address: "1 Harbor Rd".into(),
            status: StationStatus::Available,
            max_power_kw: 50.0,
            price_per_kwh: Decimal::from(28),
            currency: "usd".into(),
            created_at: now,
            updated_at: now,
        })
        .await
        .unwrap();
    repos
        .customers()
        .insert_if_absent(CustomerRecord::new("user-1", "cus_1", "user-1@example.com"))
        .await
        .unwrap();
    repos
        .payment_methods()
        .upsert(PaymentMethod {
            id: "pm_1".into(),
            user_id: "user-1".into(),
            customer_id: "cus_1".into(),
            brand: "visa".into(),
            last4: "4242".into(),
            exp_month: 12,
            exp_year: 2030,
            is_default: true,
            created_at: now,
        })
        .await
        .unwrap();

    // Ticks far apart: no energy flows while a test runs
    let hardware = Arc::new(StationSimulator::new(SimulatorConfig {
        tick_interval_ms: 3_600_000,
        ..SimulatorConfig::default()
    }));
    hardware.register_station("st-1", 50.0);

    let processor = Arc::new(SimulatedProcessor::new());
    let store = Arc::new(SessionStore::new(repos.clone(), Arc::new(ChangeFeed::new())));
    let gateway = Arc::new(PaymentGatewayClient::new(processor.clone(), repos.clone(), 50));
    let customers = Arc::new(CustomerResolver::new(repos.clone(), processor));
    let receipts = Arc::new(ReceiptDispatcher::new(
        store.clone(),
        Arc::new(LogMailer::new()),
        "receipts@chargeflow.test".into(),
    ));
    let coordinator = ChargingCoordinator::new(
        store.clone(),
        gateway.clone(),
        customers.clone(),
        hardware,
        receipts.clone(),
        CoordinatorConfig::default(),
    );

    let state = ApiState {
        coordinator,
        refunds: Arc::new(RefundService::new(gateway.clone(), store.clone())),
        webhooks: Arc::new(PaymentWebhookHandler::new(
            store.clone(),
            WEBHOOK_SECRET.into(),
            300,
        )),
        store,
        gateway,
        customers,
        receipts,
        auth: AuthState {
            jwt_config: jwt_config(),
        },
        assumed_energy_kwh: 30.0,
        started_at: Instant::now(),
    };

    TestApp {
        router: create_api_router(state, None),
        repos,
    }
}

impl TestApp {
    async fn send(
        &self,
        method: &str,
        uri: &str,
        user: Option<&str>,
        body: Option<Value>,
    ) -> (StatusCode, Value) {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(user) = user {
            builder = builder.header(header::AUTHORIZATION, format!("Bearer {}", token(user)));
        }
        let body = match body {
            Some(json) => {
                builder = builder.header(header::CONTENT_TYPE, "application/json");
                Body::from(json.to_string())
            }
            None => Body::empty(),
        };
        let response = self
            .router
            .clone()
            .oneshot(builder.body(body).unwrap())
            .await
            .unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let value = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
        (status, value)
    }
}

#[tokio::test]
async fn health_is_public() {
    let app = app().await;
    let (status, body) = app.send("GET", "/health", None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
    assert_eq!(body["live_sessions"], 0);
    assert_eq!(body["payment_processor"], "simulated");
}

#[tokio::test]
async fn api_requires_bearer_token() {
    let app = app().await;
    let (status, body) = app.send("GET", "/api/v1/sessions", None, None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["success"], false);

    let response = app
        .router
        .clone()
        .oneshot(
            Request::builder()
                .uri("/api/v1/sessions")
                .header(header::AUTHORIZATION, "Bearer not-a-jwt")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn estimate_uses_station_rate() {
    let app = app().await;
    let (status, body) = app
        .send(
            "POST",
            "/api/v1/estimate",
            Some("user-1"),
            Some(json!({ "station_id": "st-1", "energy_kwh": 30.0 })),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["estimated_cost"], 840);
    assert_eq!(body["data"]["estimated_cost_display"], "$8.40");

    let (status, _) = app
        .send(
            "POST",
            "/api/v1/estimate",
            Some("user-1"),
            Some(json!({ "station_id": "nowhere" })),
        )
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn session_lifecycle_over_http() {
    let app = app().await;
    let (status, body) = app
        .send(
            "POST",
            "/api/v1/sessions",
            Some("user-1"),
            Some(json!({ "station_id": "st-1", "estimated_cost": 2000 })),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["data"]["status"], "active");
    assert_eq!(body["data"]["authorized_amount"], 2000);
    let id = body["data"]["id"].as_str().unwrap().to_string();

    let (status, body) = app
        .send("GET", &format!("/api/v1/sessions/{}", id), Some("user-1"), None)
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["monitored"], true);

    // A second driver cannot see or stop it
    let (status, _) = app
        .send("GET", &format!("/api/v1/sessions/{}", id), Some("user-2"), None)
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    let (status, _) = app
        .send("POST", &format!("/api/v1/sessions/{}/stop", id), Some("user-2"), None)
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    // Station is busy while the session runs
    let (status, _) = app
        .send(
            "POST",
            "/api/v1/sessions",
            Some("user-1"),
            Some(json!({ "station_id": "st-1", "estimated_cost": 2000 })),
        )
        .await;
    assert_eq!(status, StatusCode::CONFLICT);

    let (status, body) = app
        .send("POST", &format!("/api/v1/sessions/{}/stop", id), Some("user-1"), None)
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["status"], "completed");
    assert_eq!(body["data"]["final_amount"], 0);

    let (status, body) = app
        .send("GET", "/api/v1/sessions", Some("user-1"), None)
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["total"], 1);

    let (status, body) = app
        .send("GET", "/api/v1/transactions", Some("user-1"), None)
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["items"][0]["status"], "cancelled");
}

#[tokio::test]
async fn start_validates_body() {
    let app = app().await;
    let (status, _) = app
        .send(
            "POST",
            "/api/v1/sessions",
            Some("user-1"),
            Some(json!({ "station_id": "st-1", "current_limit_a": 500.0 })),
        )
        .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);

    let (status, _) = app
        .send(
            "POST",
            "/api/v1/sessions",
            Some("user-1"),
            Some(json!({ "station_id": "st-1", "estimated_cost": 10 })),
        )
        .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
}

#[tokio::test]
async fn saved_card_becomes_default() {
    let app = app().await;
    let (status, body) = app
        .send(
            "POST",
            "/api/v1/payment-methods",
            Some("user-2"),
            Some(json!({ "payment_method_id": "pm_card_visa", "make_default": true })),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["data"]["id"], "pm_card_visa");

    let (status, body) = app
        .send("GET", "/api/v1/payment-methods", Some("user-2"), None)
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"][0]["id"], "pm_card_visa");
    assert_eq!(body["data"][0]["is_default"], true);
    assert!(app
        .repos
        .customers()
        .find_by_user("user-2")
        .await
        .unwrap()
        .is_some());
}

#[tokio::test]
async fn webhook_rejects_bad_signature() {
    let app = app().await;
    let payload = json!({
        "id": "evt_1",
        "type": "payment_intent.succeeded",
        "data": { "object": { "id": "pi_unknown" } }
    })
    .to_string();

    let send = |signature: String| {
        app.router.clone().oneshot(
            Request::builder()
                .method("POST")
                .uri("/api/v1/webhooks/payments")
                .header("stripe-signature", signature)
                .body(Body::from(payload.clone()))
                .unwrap(),
        )
    };

    let forged = signature_header("wrong", Utc::now().timestamp(), payload.as_bytes());
    assert_eq!(send(forged).await.unwrap().status(), StatusCode::BAD_REQUEST);

    let valid = signature_header(WEBHOOK_SECRET, Utc::now().timestamp(), payload.as_bytes());
    assert_eq!(send(valid).await.unwrap().status(), StatusCode::OK);
}

#[tokio::test]
async fn foreign_transactions_are_hidden() {
    let app = app().await;
    let (_, body) = app
        .send(
            "POST",
            "/api/v1/sessions",
            Some("user-1"),
            Some(json!({ "station_id": "st-1", "estimated_cost": 2000 })),
        )
        .await;
    let id = body["data"]["id"].as_str().unwrap().to_string();
    app.send("POST", &format!("/api/v1/sessions/{}/stop", id), Some("user-1"), None)
        .await;

    let (_, body) = app
        .send("GET", "/api/v1/transactions", Some("user-1"), None)
        .await;
    let tx_id = body["data"]["items"][0]["id"].as_str().unwrap().to_string();

    let (status, _) = app
        .send(
            "POST",
            &format!("/api/v1/transactions/{}/refund", tx_id),
            Some("user-2"),
            Some(json!({ "reason": "duplicate" })),
        )
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    // Owner view lists the station's transactions
    let (status, body) = app
        .send("GET", "/api/v1/stations/transactions", Some("owner-1"), None)
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["total"], 1);
}
