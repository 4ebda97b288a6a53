//! Orphan session sweeper
//!
//! Periodically settles sessions that are still open in the store but that
//! no monitor in this process owns, e.g. after a crash or restart.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::application::charging::ChargingCoordinator;
use crate::application::store::SessionStore;
use crate::config::AppConfig;
use crate::domain::{ChargingSession, DomainResult, SessionStatus};
use crate::shared::shutdown::ShutdownSignal;

#[derive(Debug, Clone)]
pub struct SweeperConfig {
    pub interval: Duration,
    /// Heartbeat age after which an active session counts as orphaned
    pub heartbeat_timeout_secs: i64,
    /// Age after which an authorized session that never started is released
    pub authorized_grace_secs: i64,
}

impl Default for SweeperConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(30),
            heartbeat_timeout_secs: 90,
            authorized_grace_secs: 300,
        }
    }
}

impl From<&AppConfig> for SweeperConfig {
    fn from(cfg: &AppConfig) -> Self {
        let timeout = cfg.sessions.heartbeat_timeout_secs as i64;
        Self {
            interval: Duration::from_secs(cfg.sessions.sweep_interval_secs),
            heartbeat_timeout_secs: timeout,
            authorized_grace_secs: (timeout * 2).max(300),
        }
    }
}

/// Result of one sweep
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct SweepReport {
    pub examined: usize,
    pub recovered: usize,
    pub failed: usize,
}

pub struct OrphanSweeper {
    coordinator: Arc<ChargingCoordinator>,
    store: Arc<SessionStore>,
    config: SweeperConfig,
    running: Arc<AtomicBool>,
}

impl OrphanSweeper {
    pub fn new(coordinator: Arc<ChargingCoordinator>, store: Arc<SessionStore>) -> Self {
        Self {
            coordinator,
            store,
            config: SweeperConfig::default(),
            running: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn with_config(mut self, config: SweeperConfig) -> Self {
        self.config = config;
        self
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Spawn the sweep loop; it exits when `shutdown` fires.
    pub fn start(self: &Arc<Self>, shutdown: ShutdownSignal) -> JoinHandle<()> {
        let sweeper = self.clone();
        tokio::spawn(async move {
            sweeper.running.store(true, Ordering::SeqCst);
            info!(
                interval_secs = sweeper.config.interval.as_secs(),
                heartbeat_timeout_secs = sweeper.config.heartbeat_timeout_secs,
                "🧹 Orphan sweeper started"
            );

            let mut interval = tokio::time::interval(sweeper.config.interval);
            loop {
                tokio::select! {
                    _ = interval.tick() => {
                        if let Err(e) = sweeper.sweep_once().await {
                            warn!("Orphan sweep error: {}", e);
                        }
                    }
                    _ = shutdown.notified().wait() => {
                        info!("🧹 Orphan sweeper shutting down");
                        break;
                    }
                }
            }

            sweeper.running.store(false, Ordering::SeqCst);
            info!("🧹 Orphan sweeper stopped");
        })
    }

    /// Settle every orphaned session found in the store right now.
    pub async fn sweep_once(&self) -> DomainResult<SweepReport> {
        let mut report = SweepReport::default();
        for session in self.candidates().await? {
            report.examined += 1;
            if !self.is_orphaned(&session) {
                continue;
            }
            let session_id = session.id.clone();
            match self.coordinator.recover_orphan(session).await {
                Ok(settled) => {
                    info!(session_id = %session_id, status = %settled.status, "Orphan settled");
                    report.recovered += 1;
                }
                // The degraded path reports its own cause; the session is
                // still closed out.
                Err(failure) if failure.last_status.is_some_and(|s| s.is_terminal()) => {
                    warn!(session_id = %session_id, error = %failure, "Orphan settled on degraded path");
                    report.recovered += 1;
                }
                Err(failure) => {
                    warn!(session_id = %session_id, error = %failure, "Orphan recovery failed");
                    report.failed += 1;
                }
            }
        }
        if report.recovered + report.failed > 0 {
            metrics::counter!("orphan_sessions_recovered_total").increment(report.recovered as u64);
        }
        debug!(?report, "Orphan sweep finished");
        Ok(report)
    }

    async fn candidates(&self) -> DomainResult<Vec<ChargingSession>> {
        let sessions = self.store.repos().sessions();
        let mut found = Vec::new();
        for status in [
            SessionStatus::Authorized,
            SessionStatus::Active,
            SessionStatus::Completing,
        ] {
            found.extend(sessions.find_by_status(status).await?);
        }
        Ok(found)
    }

    fn is_orphaned(&self, session: &ChargingSession) -> bool {
        if self.coordinator.is_live(&session.id) {
            return false;
        }
        let now = Utc::now();
        match session.status {
            SessionStatus::Authorized => {
                (now - session.created_at).num_seconds() >= self.config.authorized_grace_secs
            }
            SessionStatus::Active | SessionStatus::Completing => {
                session.is_heartbeat_stale(now, self.config.heartbeat_timeout_secs)
            }
            _ => false,
        }
    }
}
