//! API Router with Swagger UI

use std::sync::Arc;
use std::time::Instant;

use axum::{
    extract::FromRef,
    middleware,
    routing::{delete, get, post, put},
    Router,
};
use metrics_exporter_prometheus::PrometheusHandle;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use utoipa::openapi::security::{HttpAuthScheme, HttpBuilder, SecurityScheme};
use utoipa::{Modify, OpenApi};
use utoipa_swagger_ui::SwaggerUi;

use crate::application::{
    ChargingCoordinator, CustomerResolver, PaymentGatewayClient, PaymentWebhookHandler,
    ReceiptDispatcher, RefundService, SessionStore,
};

use super::common::{ApiResponse, EmptyData};
use super::middleware::{auth_middleware, AuthState};
use super::modules::estimate::{self, EstimateRequest, EstimateResponse};
use super::modules::health::{self, HealthResponse};
use super::modules::metrics::{http_metrics_middleware, prometheus_metrics, MetricsState};
use super::modules::payment_methods::{self, PaymentMethodResponse, SavePaymentMethodRequest};
use super::modules::request_id::request_id_middleware;
use super::modules::sessions::{self, SessionResponse, StartSessionRequest};
use super::modules::transactions::{
    self, ReceiptResponse, RefundRequest, StationTransactionResponse, TransactionResponse,
};
use super::modules::webhooks::{self, WebhookAck};
use super::modules::{PaginatedResponse, PaginationParams};

/// Unified state shared by every API route.
/// The auth middleware pulls its own slice via `FromRef`.
#[derive(Clone)]
pub struct ApiState {
    pub coordinator: Arc<ChargingCoordinator>,
    pub store: Arc<SessionStore>,
    pub gateway: Arc<PaymentGatewayClient>,
    pub customers: Arc<CustomerResolver>,
    pub receipts: Arc<ReceiptDispatcher>,
    pub refunds: Arc<RefundService>,
    pub webhooks: Arc<PaymentWebhookHandler>,
    pub auth: AuthState,
    /// Energy assumed for estimates when the caller gives none
    pub assumed_energy_kwh: f64,
    pub started_at: Instant,
}

impl FromRef<ApiState> for AuthState {
    fn from_ref(s: &ApiState) -> Self {
        s.auth.clone()
    }
}

/// Security scheme modifier for OpenAPI
struct SecurityAddon;

impl Modify for SecurityAddon {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        if let Some(components) = openapi.components.as_mut() {
            components.add_security_scheme(
                "bearer_auth",
                SecurityScheme::Http(
                    HttpBuilder::new()
                        .scheme(HttpAuthScheme::Bearer)
                        .bearer_format("JWT")
                        .description(Some("Identity provider access token"))
                        .build(),
                ),
            );
        }
    }
}

/// OpenAPI documentation
#[derive(OpenApi)]
#[openapi(
    paths(
        // Health
        health::health_check,
        // Estimates + sessions
        estimate::estimate_session,
        sessions::start_session,
        sessions::list_sessions,
        sessions::get_session,
        sessions::stop_session,
        sessions::cancel_session,
        // Transactions
        transactions::list_transactions,
        transactions::list_station_transactions,
        transactions::resend_receipt,
        transactions::refund_transaction,
        // Payment methods
        payment_methods::list_payment_methods,
        payment_methods::save_payment_method,
        payment_methods::set_default_payment_method,
        payment_methods::delete_payment_method,
        // Webhooks
        webhooks::payment_webhook,
    ),
    components(
        schemas(
            // Common
            ApiResponse<String>,
            EmptyData,
            PaginationParams,
            PaginatedResponse<SessionResponse>,
            PaginatedResponse<TransactionResponse>,
            PaginatedResponse<StationTransactionResponse>,
            HealthResponse,
            // Sessions
            EstimateRequest,
            EstimateResponse,
            StartSessionRequest,
            SessionResponse,
            // Transactions
            TransactionResponse,
            StationTransactionResponse,
            RefundRequest,
            ReceiptResponse,
            // Payment methods
            PaymentMethodResponse,
            SavePaymentMethodRequest,
            // Webhooks
            WebhookAck,
        )
    ),
    modifiers(&SecurityAddon),
    tags(
        (name = "Health", description = "Liveness probe with uptime and live session count."),
        (name = "Sessions", description = "Pay-per-session charging. Starting a session places a hold on the card, the station then delivers energy, and stopping captures the actual cost (never more than the hold). Amounts are in minor currency units."),
        (name = "Transactions", description = "Payment history for drivers, per-station history with the projected owner/platform split for station owners, receipts and refunds."),
        (name = "Payment Methods", description = "Saved cards. Card numbers never reach this service; only processor tokens and display details are stored."),
        (name = "Webhooks", description = "Asynchronous payment processor events, verified by the `stripe-signature` header."),
    ),
    info(
        title = "ChargeFlow Payment Coordinator API",
        version = "1.0.0",
        description = "REST API for paying for EV charging sessions.

## Authentication

Every `/api/v1` route except the webhook expects `Authorization: Bearer <token>` issued by the identity provider.

## Response format

All REST responses are wrapped in a standard envelope:
```json
{\"success\": true, \"data\": {...}}
```

On error:
```json
{\"success\": false, \"data\": null, \"error\": \"description\"}
```

## Pagination

List endpoints accept `page` (from 1) and `limit` (default 20, max 100).",
        license(
            name = "MIT"
        )
    )
)]
pub struct ApiDoc;

/// Create the API router with all routes
pub fn create_api_router(state: ApiState, metrics: Option<PrometheusHandle>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let protected_routes = Router::new()
        .route("/estimate", post(estimate::estimate_session))
        .route(
            "/sessions",
            get(sessions::list_sessions).post(sessions::start_session),
        )
        .route("/sessions/{id}", get(sessions::get_session))
        .route("/sessions/{id}/stop", post(sessions::stop_session))
        .route("/sessions/{id}/cancel", post(sessions::cancel_session))
        .route("/transactions", get(transactions::list_transactions))
        .route(
            "/transactions/{id}/receipt",
            post(transactions::resend_receipt),
        )
        .route(
            "/transactions/{id}/refund",
            post(transactions::refund_transaction),
        )
        .route(
            "/stations/transactions",
            get(transactions::list_station_transactions),
        )
        .route(
            "/payment-methods",
            get(payment_methods::list_payment_methods).post(payment_methods::save_payment_method),
        )
        .route(
            "/payment-methods/{id}",
            delete(payment_methods::delete_payment_method),
        )
        .route(
            "/payment-methods/{id}/default",
            put(payment_methods::set_default_payment_method),
        )
        .route_layer(middleware::from_fn_with_state(
            state.auth.clone(),
            auth_middleware,
        ));

    // Webhook deliveries are signature-verified, not JWT-authenticated
    let public_routes = Router::new().route("/webhooks/payments", post(webhooks::payment_webhook));

    let api_routes = Router::new()
        .route("/health", get(health::health_check))
        .nest("/api/v1", protected_routes.merge(public_routes))
        .with_state(state);

    let swagger_routes = SwaggerUi::new("/docs").url("/api-doc/openapi.json", ApiDoc::openapi());

    let mut router = Router::new().merge(swagger_routes).merge(api_routes);

    if let Some(handle) = metrics {
        let metrics_routes = Router::new()
            .route("/metrics", get(prometheus_metrics))
            .with_state(MetricsState { handle });
        router = router.merge(metrics_routes);
    }

    router
        .layer(middleware::from_fn(http_metrics_middleware))
        .layer(middleware::from_fn(request_id_middleware))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
}
