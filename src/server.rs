//! Reusable service runtime.
//!
//! Provides [`ServerHandle`], which owns the full lifecycle: database
//! init, migrations, payment/hardware/mail adapters, the charging
//! coordinator, the orphan sweeper, the REST API, metrics and graceful
//! shutdown.

use std::sync::{Arc, OnceLock};
use std::time::Instant;

use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use sea_orm::DatabaseConnection;
use tracing::{error, info, warn};

use crate::application::{
    ChargingCoordinator, CoordinatorConfig, CustomerResolver, OrphanSweeper,
    PaymentGatewayClient, PaymentWebhookHandler, ReceiptDispatcher, RefundService, SessionStore,
    SweeperConfig,
};
use crate::config::{AppConfig, LogFormat};
use crate::domain::RepositoryProvider;
use crate::infrastructure::crypto::jwt::JwtConfig;
use crate::infrastructure::hardware::build_hardware;
use crate::infrastructure::mail::build_mailer;
use crate::infrastructure::payments::build_processor;
use crate::infrastructure::{init_database, SeaOrmRepositoryProvider};
use crate::interfaces::http::middleware::AuthState;
use crate::interfaces::http::{create_api_router, ApiState};
use crate::notifications::ChangeFeed;
use crate::shared::shutdown::{ShutdownCoordinator, ShutdownSignal};

// ── Options ────────────────────────────────────────────────────────

/// Options for starting the service.
pub struct ServerOptions {
    pub config: AppConfig,
    /// Run database migrations on startup (default: true).
    pub auto_migrate: bool,
}

impl Default for ServerOptions {
    fn default() -> Self {
        Self {
            config: AppConfig::default(),
            auto_migrate: true,
        }
    }
}

// ── ServerHandle ───────────────────────────────────────────────────

/// Handle to a running service.
///
/// # Examples
///
/// ```rust,no_run
/// use chargeflow::server::{ServerHandle, ServerOptions};
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let handle = ServerHandle::start(ServerOptions::default()).await?;
///     handle.install_signal_handler();
///     handle.wait().await;
///     Ok(())
/// }
/// ```
pub struct ServerHandle {
    pub repos: Arc<dyn RepositoryProvider>,
    pub coordinator: Arc<ChargingCoordinator>,
    /// The configuration the server was started with.
    pub config: AppConfig,
    pub api_port: u16,

    db: DatabaseConnection,
    shutdown: ShutdownCoordinator,
    api_task: tokio::task::JoinHandle<()>,
    sweeper_task: tokio::task::JoinHandle<()>,
}

impl ServerHandle {
    /// Start the service with the given options.
    ///
    /// 1. Install the Prometheus recorder
    /// 2. Connect to the database and run migrations
    /// 3. Build the payment processor, station driver and mail transport
    /// 4. Start the orphan sweeper (its first pass recovers sessions
    ///    left behind by a previous process)
    /// 5. Start the REST API with Swagger UI
    pub async fn start(opts: ServerOptions) -> Result<Self, Box<dyn std::error::Error>> {
        let app_cfg = opts.config;
        app_cfg.validate()?;

        info!("Starting ChargeFlow payment coordinator...");

        let prometheus_handle = prometheus_handle()?;

        // ── Database ───────────────────────────────────────────
        let db = init_database(&app_cfg.database.url, opts.auto_migrate).await?;
        let repos: Arc<dyn RepositoryProvider> =
            Arc::new(SeaOrmRepositoryProvider::new(db.clone()));

        // ── Adapters ───────────────────────────────────────────
        let processor = build_processor(&app_cfg.payments)?;
        let stations = repos.stations().find_all().await?;
        let hardware = build_hardware(&app_cfg.hardware, &stations)?;
        let mailer = build_mailer(&app_cfg.receipts)?;
        info!(
            processor = processor.name(),
            driver = ?app_cfg.hardware.driver,
            "Adapters ready"
        );

        // ── Application services ───────────────────────────────
        let feed = Arc::new(ChangeFeed::new());
        let store = Arc::new(
            SessionStore::new(repos.clone(), feed)
                .with_owner_share_bps(app_cfg.sessions.owner_share_bps),
        );
        let gateway = Arc::new(PaymentGatewayClient::new(
            processor.clone(),
            repos.clone(),
            app_cfg.payments.minimum_amount,
        ));
        let customers = Arc::new(CustomerResolver::new(repos.clone(), processor));
        let receipts = Arc::new(ReceiptDispatcher::new(
            store.clone(),
            mailer,
            app_cfg.receipts.from_address.clone(),
        ));
        let refunds = Arc::new(RefundService::new(gateway.clone(), store.clone()));
        let webhooks = Arc::new(PaymentWebhookHandler::new(
            store.clone(),
            app_cfg.payments.webhook_secret.clone(),
            app_cfg.payments.webhook_tolerance_secs,
        ));
        let coordinator = ChargingCoordinator::new(
            store.clone(),
            gateway.clone(),
            customers.clone(),
            hardware,
            receipts.clone(),
            CoordinatorConfig::from(&app_cfg),
        );

        // ── Shutdown coordinator ───────────────────────────────
        let shutdown = ShutdownCoordinator::new(app_cfg.server.shutdown_timeout);
        let shutdown_signal = shutdown.signal();

        // ── Background tasks ───────────────────────────────────
        let sweeper = Arc::new(
            OrphanSweeper::new(coordinator.clone(), store.clone())
                .with_config(SweeperConfig::from(&app_cfg)),
        );
        let sweeper_task = sweeper.start(shutdown_signal.clone());

        // ── REST API server ────────────────────────────────────
        let state = ApiState {
            coordinator: coordinator.clone(),
            store,
            gateway,
            customers,
            receipts,
            refunds,
            webhooks,
            auth: AuthState {
                jwt_config: JwtConfig::from(&app_cfg.security),
            },
            assumed_energy_kwh: app_cfg.sessions.default_assumed_energy_kwh,
            started_at: Instant::now(),
        };
        let api_router = create_api_router(state, Some(prometheus_handle));

        let api_port = app_cfg.server.api_port;
        let api_addr = app_cfg.api_address();
        let listener = tokio::net::TcpListener::bind(&api_addr).await?;
        info!("REST API server listening on http://{}", api_addr);
        info!("Swagger UI available at http://{}/docs/", api_addr);

        let api_shutdown = shutdown_signal.clone();
        let api_server = axum::serve(listener, api_router).with_graceful_shutdown(async move {
            api_shutdown.wait().await;
            info!("🛑 REST API server received shutdown signal");
        });

        let api_task = tokio::spawn(async move {
            if let Err(e) = api_server.await {
                error!("REST API server error: {}", e);
            }
        });

        info!("🚀 Service started.");

        Ok(Self {
            repos,
            coordinator,
            config: app_cfg,
            api_port,
            db,
            shutdown,
            api_task,
            sweeper_task,
        })
    }

    pub fn shutdown_signal(&self) -> ShutdownSignal {
        self.shutdown.signal()
    }

    /// Install OS signal listeners (SIGTERM, SIGINT) that trigger shutdown.
    pub fn install_signal_handler(&self) {
        self.shutdown.start_signal_listener();
    }

    /// Trigger graceful shutdown (non-blocking).
    pub fn trigger_shutdown(&self) {
        self.shutdown.signal().trigger();
    }

    /// Wait for shutdown to be triggered, then for every task to stop.
    ///
    /// Live session monitors are aborted rather than settled: their
    /// sessions stay active in the database and the next process's first
    /// sweep recovers them.
    pub async fn wait(self) {
        let Self {
            coordinator,
            db,
            shutdown,
            api_task,
            sweeper_task,
            ..
        } = self;

        let completed = shutdown
            .shutdown_with_cleanup(|| async move {
                info!("⏳ Waiting for server tasks to complete...");
                match api_task.await {
                    Ok(()) => info!("REST API server stopped"),
                    Err(e) => error!("REST API server task panicked: {}", e),
                }
                if let Err(e) = sweeper_task.await {
                    error!("Orphan sweeper task panicked: {}", e);
                }
            })
            .await;
        if !completed {
            warn!("Some tasks did not stop before the shutdown timeout");
        }

        coordinator.shutdown();

        if let Err(e) = db.close().await {
            warn!("Error closing database connection: {}", e);
        } else {
            info!("✅ Database connection closed");
        }

        info!("👋 ChargeFlow shutdown complete");
    }

    /// Trigger shutdown and wait for completion.
    pub async fn shutdown(self) {
        info!("🛑 Shutting down...");
        self.trigger_shutdown();
        self.wait().await;
    }

    pub fn is_running(&self) -> bool {
        !self.api_task.is_finished()
    }
}

// ── Helpers ────────────────────────────────────────────────────────

/// The global recorder can only be installed once per process; a restart
/// within the same process reuses it.
fn prometheus_handle() -> Result<PrometheusHandle, Box<dyn std::error::Error>> {
    static PROM_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

    if let Some(handle) = PROM_HANDLE.get() {
        return Ok(handle.clone());
    }
    let handle = PrometheusBuilder::new().install_recorder()?;
    info!("📊 Prometheus metrics recorder installed");
    Ok(PROM_HANDLE.get_or_init(|| handle).clone())
}

/// Initialize tracing (logging) from the application config.
///
/// Call this once at process startup (before [`ServerHandle::start`]).
/// `RUST_LOG` overrides the configured level.
pub fn init_tracing(config: &AppConfig) {
    use tracing_subscriber::layer::SubscriberExt;
    use tracing_subscriber::util::SubscriberInitExt;

    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&config.logging.level));

    match config.logging.format {
        LogFormat::Json => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(tracing_subscriber::fmt::layer().json())
                .init();
        }
        LogFormat::Text => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(tracing_subscriber::fmt::layer())
                .init();
        }
    }
}
