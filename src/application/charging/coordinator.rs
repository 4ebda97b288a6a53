//! Charging session coordinator
//!
//! Drives one session through authorize → start → monitor → stop →
//! capture/cancel. Every side effect is awaited before the next step and
//! persisted state only changes after the remote call it represents has
//! succeeded.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use dashmap::DashMap;
use futures_util::StreamExt;
use thiserror::Error;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::application::customers::CustomerResolver;
use crate::application::gateway::PaymentGatewayClient;
use crate::application::receipts::ReceiptDispatcher;
use crate::application::store::SessionStore;
use crate::config::AppConfig;
use crate::domain::ports::{StationHardware, TelemetryStream};
use crate::domain::pricing::{energy_cost, estimate, CaptureDecision};
use crate::domain::session::NewSession;
use crate::domain::transaction::NewTransaction;
use crate::domain::{
    ChargeError, ChargingSession, DomainResult, HardwareStatus, SessionPatch, SessionStatus,
    Station, StationStatus, Transaction, TransactionPatch, TransactionStatus,
};

use super::live::LiveSession;

#[derive(Debug, Clone)]
pub struct CoordinatorConfig {
    /// Maximum gap between telemetry ticks while active
    pub heartbeat_timeout: Duration,
    pub default_current_limit_a: f64,
    /// Energy used to size the hold when the caller gives no estimate
    pub assumed_energy_kwh: f64,
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            heartbeat_timeout: Duration::from_secs(90),
            default_current_limit_a: 32.0,
            assumed_energy_kwh: 30.0,
        }
    }
}

impl From<&AppConfig> for CoordinatorConfig {
    fn from(cfg: &AppConfig) -> Self {
        Self {
            heartbeat_timeout: Duration::from_secs(cfg.sessions.heartbeat_timeout_secs),
            default_current_limit_a: cfg.hardware.default_current_limit_a,
            assumed_energy_kwh: cfg.sessions.default_assumed_energy_kwh,
        }
    }
}

/// Everything the caller supplies to begin charging
#[derive(Debug, Clone)]
pub struct StartRequest {
    pub user_id: String,
    pub email: String,
    pub station_id: String,
    /// Saved card to charge; the user's default when absent
    pub payment_method_id: Option<String>,
    /// Hold amount in minor units; estimated from the station when absent
    pub estimated_cost: Option<i64>,
    pub current_limit_a: Option<f64>,
}

/// A coordinator failure with enough context to reconcile by hand
#[derive(Debug, Error)]
#[error(
    "session {session_id} failed (last status: {}): {source}",
    .last_status.map(|s| s.as_str()).unwrap_or("none")
)]
pub struct SessionFailure {
    pub session_id: String,
    /// `None` when the session record was never created
    pub last_status: Option<SessionStatus>,
    pub source: ChargeError,
}

impl SessionFailure {
    fn new(session_id: &str, last_status: Option<SessionStatus>, source: ChargeError) -> Self {
        Self {
            session_id: session_id.to_string(),
            last_status,
            source,
        }
    }
}

/// Snapshot plus values derived for display
#[derive(Debug, Clone)]
pub struct LiveView {
    pub session: ChargingSession,
    pub live_cost: i64,
    pub elapsed_secs: i64,
    /// Whether a monitor in this process owns the session
    pub monitored: bool,
}

fn idempotency_key(session_id: &str, operation: &str) -> String {
    format!("{}:{}", session_id, operation)
}

fn finished(outcome: &'static str) {
    metrics::counter!("charging_sessions_finished_total", "outcome" => outcome).increment(1);
}

pub struct ChargingCoordinator {
    store: Arc<SessionStore>,
    gateway: Arc<PaymentGatewayClient>,
    customers: Arc<CustomerResolver>,
    hardware: Arc<dyn StationHardware>,
    receipts: Arc<ReceiptDispatcher>,
    config: CoordinatorConfig,
    live: DashMap<String, Arc<LiveSession>>,
    /// station id → session id holding it
    claims: DashMap<String, String>,
}

impl ChargingCoordinator {
    pub fn new(
        store: Arc<SessionStore>,
        gateway: Arc<PaymentGatewayClient>,
        customers: Arc<CustomerResolver>,
        hardware: Arc<dyn StationHardware>,
        receipts: Arc<ReceiptDispatcher>,
        config: CoordinatorConfig,
    ) -> Arc<Self> {
        Arc::new(Self {
            store,
            gateway,
            customers,
            hardware,
            receipts,
            config,
            live: DashMap::new(),
            claims: DashMap::new(),
        })
    }

    pub fn config(&self) -> &CoordinatorConfig {
        &self.config
    }

    pub fn is_live(&self, session_id: &str) -> bool {
        self.live.contains_key(session_id)
    }

    pub fn live_count(&self) -> usize {
        self.live.len()
    }

    // ── Start ──────────────────────────────────────────────────

    /// Authorize, record, then start the station. A failed hardware start
    /// cancels the authorization before returning.
    pub async fn start_session(
        self: &Arc<Self>,
        request: StartRequest,
    ) -> Result<ChargingSession, SessionFailure> {
        let session_id = Uuid::new_v4().to_string();

        let (station, amount) = self
            .prepare(&request)
            .await
            .map_err(|e| SessionFailure::new(&session_id, None, e))?;
        self.claim_station(&station.id, &session_id)
            .map_err(|e| SessionFailure::new(&session_id, None, e))?;

        let result = self.start_claimed(&session_id, &request, &station, amount).await;
        if result.is_err() {
            self.release_claim(&station.id, &session_id);
        }
        result
    }

    async fn prepare(&self, request: &StartRequest) -> DomainResult<(Station, i64)> {
        if request.user_id.trim().is_empty() {
            return Err(ChargeError::InvalidArgument("user id is required".into()));
        }
        if request.station_id.trim().is_empty() {
            return Err(ChargeError::InvalidArgument("station id is required".into()));
        }
        let station = self
            .store
            .repos()
            .stations()
            .find_by_id(&request.station_id)
            .await?
            .ok_or_else(|| ChargeError::not_found("Station", "id", &request.station_id))?;
        if !station.is_available() {
            return Err(ChargeError::StationUnavailable {
                station_id: station.id.clone(),
                status: station.status.as_str().to_string(),
            });
        }

        let amount = match request.estimated_cost {
            Some(amount) => amount,
            None => {
                estimate(
                    station.max_power_kw,
                    station.price_per_kwh,
                    self.config.assumed_energy_kwh,
                )?
                .estimated_cost
            }
        };
        Ok((station, amount))
    }

    async fn start_claimed(
        self: &Arc<Self>,
        session_id: &str,
        request: &StartRequest,
        station: &Station,
        amount: i64,
    ) -> Result<ChargingSession, SessionFailure> {
        let fail = |e| SessionFailure::new(session_id, None, e);

        let customer_id = self
            .customers
            .resolve_customer(&request.user_id, &request.email)
            .await
            .map_err(fail)?;
        let payment_method_id = self.payment_method_for(request).await.map_err(fail)?;

        let metadata = HashMap::from([
            ("session_id".to_string(), session_id.to_string()),
            ("station_id".to_string(), station.id.clone()),
            ("user_id".to_string(), request.user_id.clone()),
        ]);
        let auth = self
            .gateway
            .authorize(
                &customer_id,
                &payment_method_id,
                amount,
                &station.currency,
                metadata,
                &idempotency_key(session_id, "authorize"),
            )
            .await
            .map_err(fail)?;

        let session = ChargingSession::new(NewSession {
            id: session_id.to_string(),
            user_id: request.user_id.clone(),
            station_id: station.id.clone(),
            authorization_id: auth.authorization_id.clone(),
            currency: station.currency.clone(),
            price_per_kwh: station.price_per_kwh,
            authorized_amount: auth.amount,
        });
        if let Err(e) = self.store.create_session(session.clone()).await {
            self.release_hold(session_id, &auth.authorization_id).await;
            return Err(fail(e));
        }

        let live = Arc::new(LiveSession::new(session));
        self.live.insert(session_id.to_string(), live.clone());
        let _guard = live.transitions.lock().await;

        let transaction = Transaction::pending(NewTransaction {
            id: Uuid::new_v4().to_string(),
            session_id: session_id.to_string(),
            user_id: request.user_id.clone(),
            station_id: station.id.clone(),
            station_name: station.name.clone(),
            station_owner_id: station.owner_id.clone(),
            amount: auth.amount,
            currency: station.currency.clone(),
            authorization_id: auth.authorization_id.clone(),
            payment_method_id: payment_method_id.clone(),
        });
        if let Err(e) = self.store.create_transaction(transaction).await {
            return Err(self.abort_start(&live, e, false).await);
        }

        // Subscribe before starting so the first ticks are not lost
        let telemetry = match self.hardware.telemetry(&station.id).await {
            Ok(stream) => stream,
            Err(e) => {
                let cause = ChargeError::HardwareStartFailed {
                    station_id: station.id.clone(),
                    reason: format!("telemetry unavailable: {}", e),
                };
                return Err(self.abort_start(&live, cause, false).await);
            }
        };

        let limit = request
            .current_limit_a
            .unwrap_or(self.config.default_current_limit_a);
        if let Err(e) = self.hardware.start(&station.id, limit).await {
            return Err(self.abort_start(&live, e, false).await);
        }

        let now = Utc::now();
        let active = match self.commit(&live, |s| s.transition(SessionStatus::Active, now)).await {
            Ok(active) => active,
            Err(e) => return Err(self.abort_start(&live, e, true).await),
        };

        self.mark_station(&station.id, StationStatus::InUse).await;
        live.start_persister(self.store.clone());
        let monitor = tokio::spawn(self.clone().monitor(live.clone(), telemetry));
        live.set_monitor(monitor);

        metrics::counter!("charging_sessions_started_total").increment(1);
        info!(
            session_id,
            station_id = %station.id,
            authorization_id = %auth.authorization_id,
            authorized_amount = auth.amount,
            "Charging session active"
        );
        Ok(active)
    }

    async fn payment_method_for(&self, request: &StartRequest) -> DomainResult<String> {
        if let Some(id) = request.payment_method_id.as_ref().filter(|id| !id.is_empty()) {
            return Ok(id.clone());
        }
        self.store
            .repos()
            .payment_methods()
            .find_default(&request.user_id)
            .await?
            .map(|pm| pm.id)
            .ok_or_else(|| ChargeError::InvalidArgument("no payment method on file".into()))
    }

    /// Compensate a start that got past authorization: stop the station if
    /// it was started, release the hold and close the records.
    async fn abort_start(
        &self,
        live: &LiveSession,
        cause: ChargeError,
        stop_hardware: bool,
    ) -> SessionFailure {
        let session = live.current();
        warn!(session_id = %session.id, error = %cause, "Session start failed, compensating");

        if stop_hardware {
            if let Err(e) = self.hardware.stop(&session.station_id).await {
                error!(session_id = %session.id, error = %e, "Compensating stop failed");
            }
        }

        let released = self
            .gateway
            .cancel(
                &session.authorization_id,
                &idempotency_key(&session.id, "cancel"),
            )
            .await;
        let (status, tx_status, note) = match released {
            Ok(_) => (SessionStatus::Cancelled, TransactionStatus::Cancelled, None),
            Err(e) => {
                error!(
                    session_id = %session.id,
                    authorization_id = %session.authorization_id,
                    error = %e,
                    "Could not release authorization after failed start"
                );
                (
                    SessionStatus::Error,
                    TransactionStatus::Failed,
                    Some(format!("hold release failed: {}", e)),
                )
            }
        };

        let now = Utc::now();
        let message = cause.to_string();
        if let Err(e) = self
            .commit(live, |s| {
                s.transition(status, now)?;
                s.error_message = Some(message);
                Ok(())
            })
            .await
        {
            error!(session_id = %session.id, error = %e, "Could not record failed start");
        }
        self.settle_transaction(
            &session.id,
            tx_status,
            TransactionPatch {
                amount: Some(0),
                needs_reconciliation: note.as_ref().map(|_| true),
                reconciliation_note: note,
                ..Default::default()
            },
        )
        .await;

        self.retire(live, false);
        finished("start_failed");
        SessionFailure::new(&session.id, Some(live.current().status), cause)
    }

    /// Best-effort release of a hold that never got a session record.
    async fn release_hold(&self, session_id: &str, authorization_id: &str) {
        if let Err(e) = self
            .gateway
            .cancel(authorization_id, &idempotency_key(session_id, "cancel"))
            .await
        {
            error!(session_id, authorization_id, error = %e, "Orphaned authorization");
        }
    }

    // ── Monitoring ─────────────────────────────────────────────

    async fn monitor(self: Arc<Self>, live: Arc<LiveSession>, mut telemetry: TelemetryStream) {
        let session_id = live.id();
        let timeout = self.config.heartbeat_timeout;

        loop {
            match tokio::time::timeout(timeout, telemetry.next()).await {
                Ok(Some(frame)) => {
                    metrics::counter!("telemetry_ticks_total").increment(1);
                    let Some(patch) = live.record_tick(&frame, Utc::now()) else {
                        break;
                    };
                    live.queue(patch);

                    match frame.state {
                        HardwareStatus::Finished => {
                            info!(session_id = %session_id, "Station reported charging finished");
                            let _guard = live.transitions.lock().await;
                            let _ = self.complete_locked(&live, true).await;
                            break;
                        }
                        HardwareStatus::Faulted => {
                            let session = live.current();
                            let cause = ChargeError::StationUnavailable {
                                station_id: session.station_id,
                                status: "faulted".to_string(),
                            };
                            let _guard = live.transitions.lock().await;
                            let _ = self.degrade_locked(&live, cause, true).await;
                            break;
                        }
                        _ => {}
                    }
                }
                Ok(None) => {
                    // Closed stream: the heartbeat window still applies
                    warn!(session_id = %session_id, "Telemetry stream closed");
                    telemetry = Box::pin(futures_util::stream::pending());
                }
                Err(_) => {
                    warn!(
                        session_id = %session_id,
                        timeout_secs = timeout.as_secs(),
                        "Heartbeat timeout"
                    );
                    let cause = ChargeError::StationUnavailable {
                        station_id: live.current().station_id,
                        status: format!("no telemetry for {}s", timeout.as_secs()),
                    };
                    let _guard = live.transitions.lock().await;
                    let _ = self.degrade_locked(&live, cause, true).await;
                    break;
                }
            }
        }
    }

    // ── Stop / cancel ──────────────────────────────────────────

    /// User-initiated stop. Before the station has confirmed start this is
    /// the cancel path; on a finished session it returns the final record.
    pub async fn stop_session(&self, session_id: &str) -> Result<ChargingSession, SessionFailure> {
        let live = self.owned(session_id).await?;
        let _guard = live.transitions.lock().await;
        let session = live.current();
        match session.status {
            SessionStatus::Authorized => self.cancel_locked(&live).await,
            SessionStatus::Active => self.complete_locked(&live, false).await,
            SessionStatus::Completing => {
                let cause = ChargeError::InvalidState(format!(
                    "session {} was left completing",
                    session_id
                ));
                self.degrade_locked(&live, cause, false).await
            }
            _ => {
                self.retire(&live, false);
                Ok(session)
            }
        }
    }

    /// Cancel before any energy was delivered. Only legal while authorized.
    pub async fn cancel_session(&self, session_id: &str) -> Result<ChargingSession, SessionFailure> {
        let live = self.owned(session_id).await?;
        let _guard = live.transitions.lock().await;
        let session = live.current();
        if session.status != SessionStatus::Authorized {
            let err = ChargeError::InvalidState(format!(
                "session {} is {}; only authorized sessions can be cancelled",
                session_id, session.status
            ));
            error!(session_id, error = %err, "Cancel rejected");
            if session.status.is_terminal() {
                self.retire(&live, false);
            }
            return Err(SessionFailure::new(session_id, Some(session.status), err));
        }
        self.cancel_locked(&live).await
    }

    /// Settle a non-terminal session that no monitor owns (found by the
    /// sweeper after a restart).
    pub async fn recover_orphan(
        &self,
        session: ChargingSession,
    ) -> Result<ChargingSession, SessionFailure> {
        let session_id = session.id.clone();
        let live = self.adopt(session);
        let _guard = live.transitions.lock().await;
        // The caller's snapshot may predate a settlement that just landed
        let stored = self
            .store
            .get_session(&session_id)
            .await
            .map_err(|e| SessionFailure::new(&session_id, None, e))?;
        if stored.status.is_terminal() {
            debug!(session_id = %session_id, status = %stored.status, "Session already settled");
            self.retire(&live, false);
            return Ok(stored);
        }
        live.replace(stored);
        let current = live.current();
        match current.status {
            SessionStatus::Authorized => self.cancel_locked(&live).await,
            SessionStatus::Active | SessionStatus::Completing => {
                let cause = ChargeError::StationUnavailable {
                    station_id: current.station_id.clone(),
                    status: "no live monitor; telemetry lost".to_string(),
                };
                warn!(session_id = %session_id, "Recovering orphaned session");
                self.degrade_locked(&live, cause, false).await
            }
            _ => {
                self.retire(&live, false);
                Ok(current)
            }
        }
    }

    async fn owned(&self, session_id: &str) -> Result<Arc<LiveSession>, SessionFailure> {
        if let Some(live) = self.live.get(session_id) {
            return Ok(live.clone());
        }
        let session = self
            .store
            .get_session(session_id)
            .await
            .map_err(|e| SessionFailure::new(session_id, None, e))?;
        Ok(self.adopt(session))
    }

    fn adopt(&self, session: ChargingSession) -> Arc<LiveSession> {
        self.live
            .entry(session.id.clone())
            .or_insert_with(|| Arc::new(LiveSession::new(session)))
            .clone()
    }

    async fn cancel_locked(&self, live: &LiveSession) -> Result<ChargingSession, SessionFailure> {
        let session = live.current();
        self.gateway
            .cancel(
                &session.authorization_id,
                &idempotency_key(&session.id, "cancel"),
            )
            .await
            .map_err(|e| SessionFailure::new(&session.id, Some(session.status), e))?;

        let now = Utc::now();
        let cancelled = self
            .commit(live, |s| s.transition(SessionStatus::Cancelled, now))
            .await
            .map_err(|e| SessionFailure::new(&session.id, Some(session.status), e))?;
        self.settle_transaction(
            &session.id,
            TransactionStatus::Cancelled,
            TransactionPatch {
                amount: Some(0),
                ..Default::default()
            },
        )
        .await;

        self.retire(live, false);
        finished("cancelled");
        info!(session_id = %session.id, "Session cancelled before charging");
        Ok(cancelled)
    }

    /// Stop the station, bill the delivered energy (clamped to the hold)
    /// and close the records.
    async fn complete_locked(
        &self,
        live: &LiveSession,
        from_monitor: bool,
    ) -> Result<ChargingSession, SessionFailure> {
        let session = live.current();
        if session.status != SessionStatus::Active {
            return Ok(session);
        }
        let id = session.id.clone();

        live.flush_and_close().await;
        let now = Utc::now();
        if let Err(e) = self
            .commit(live, |s| s.transition(SessionStatus::Completing, now))
            .await
        {
            // Nothing changed remotely; keep the session live and monitored
            live.start_persister(self.store.clone());
            return Err(SessionFailure::new(&id, Some(SessionStatus::Active), e));
        }

        if let Err(e) = self.hardware.stop(&session.station_id).await {
            return self.degrade_locked(live, e, from_monitor).await;
        }

        let energy = self.final_energy(live).await;
        let final_cost = energy_cost(energy, session.price_per_kwh);
        let decision = CaptureDecision::clamp(final_cost, session.authorized_amount);
        if decision.has_overage() {
            warn!(
                session_id = %id,
                final_cost,
                authorized = session.authorized_amount,
                overage = decision.overage_amount,
                "Final cost exceeds hold; capturing the hold only"
            );
        }

        // Nothing delivered: release the hold instead of capturing zero
        if decision.capture_amount == 0 {
            if let Err(e) = self
                .gateway
                .cancel(&session.authorization_id, &idempotency_key(&id, "cancel"))
                .await
            {
                return Err(self.fail_settlement(live, e, energy, from_monitor).await);
            }
            let ended = Utc::now();
            let completed = self
                .commit(live, |s| {
                    s.energy_delivered_kwh = s.energy_delivered_kwh.max(energy);
                    s.final_amount = Some(0);
                    s.transition(SessionStatus::Completed, ended)
                })
                .await
                .map_err(|e| SessionFailure::new(&id, Some(SessionStatus::Completing), e))?;
            self.settle_transaction(
                &id,
                TransactionStatus::Cancelled,
                TransactionPatch {
                    amount: Some(0),
                    session_started_at: completed.started_at,
                    session_ended_at: completed.ended_at,
                    energy_delivered_kwh: Some(completed.energy_delivered_kwh),
                    ..Default::default()
                },
            )
            .await;
            self.mark_station(&session.station_id, StationStatus::Available).await;
            self.retire(live, from_monitor);
            finished("completed");
            info!(session_id = %id, "Session ended with no energy delivered");
            return Ok(completed);
        }

        let outcome = match self
            .gateway
            .capture(
                &session.authorization_id,
                Some(decision.capture_amount),
                &idempotency_key(&id, "capture"),
            )
            .await
        {
            Ok(outcome) => outcome,
            Err(e) => return Err(self.fail_settlement(live, e, energy, from_monitor).await),
        };
        let captured = outcome.captured_amount.min(session.authorized_amount);

        let ended = Utc::now();
        let committed = self
            .commit(live, |s| {
                s.energy_delivered_kwh = s.energy_delivered_kwh.max(energy);
                s.final_amount = Some(captured);
                s.transition(SessionStatus::Completed, ended)
            })
            .await;

        let settled = self
            .settle_transaction(
                &id,
                TransactionStatus::Succeeded,
                TransactionPatch {
                    amount: Some(captured),
                    capture_id: Some(outcome.capture_id.clone()),
                    session_started_at: session.started_at,
                    session_ended_at: Some(ended),
                    energy_delivered_kwh: Some(energy.max(session.energy_delivered_kwh)),
                    needs_reconciliation: decision.has_overage().then_some(true),
                    reconciliation_note: decision.has_overage().then(|| {
                        format!(
                            "uncaptured overage of {} minor units",
                            decision.overage_amount
                        )
                    }),
                    ..Default::default()
                },
            )
            .await;

        self.mark_station(&session.station_id, StationStatus::Available).await;
        self.retire(live, from_monitor);

        let completed = committed.map_err(|e| {
            error!(
                session_id = %id,
                captured,
                error = %e,
                "Payment captured but session record not updated"
            );
            SessionFailure::new(&id, Some(SessionStatus::Completing), e)
        })?;
        finished("completed");
        info!(
            session_id = %id,
            energy_kwh = completed.energy_delivered_kwh,
            captured,
            released = decision.released_amount,
            "Charging session completed"
        );
        if let Some(tx) = settled {
            self.receipts.dispatch(tx.id);
        }
        Ok(completed)
    }

    /// Capture or cancel failed after the station stopped.
    async fn fail_settlement(
        &self,
        live: &LiveSession,
        cause: ChargeError,
        energy: f64,
        from_monitor: bool,
    ) -> SessionFailure {
        let session = live.current();
        error!(
            session_id = %session.id,
            authorization_id = %session.authorization_id,
            error = %cause,
            "Settlement failed; session needs manual review"
        );
        let now = Utc::now();
        let message = format!("settlement failed: {}", cause);
        if let Err(e) = self
            .commit(live, |s| {
                s.energy_delivered_kwh = s.energy_delivered_kwh.max(energy);
                s.transition(SessionStatus::Error, now)?;
                s.error_message = Some(message.clone());
                Ok(())
            })
            .await
        {
            error!(session_id = %session.id, error = %e, "Could not record settlement failure");
        }
        self.settle_transaction(
            &session.id,
            TransactionStatus::Failed,
            TransactionPatch {
                session_started_at: session.started_at,
                session_ended_at: Some(now),
                energy_delivered_kwh: Some(energy.max(session.energy_delivered_kwh)),
                needs_reconciliation: Some(true),
                reconciliation_note: Some(message),
                ..Default::default()
            },
        )
        .await;
        self.mark_station(&session.station_id, StationStatus::Available).await;
        self.retire(live, from_monitor);
        finished("error");
        SessionFailure::new(&session.id, Some(live.current().status), cause)
    }

    /// Degraded-but-safe path: mark the session as errored, try to stop the
    /// station, then bill the last known energy and flag the transaction.
    async fn degrade_locked(
        &self,
        live: &LiveSession,
        cause: ChargeError,
        from_monitor: bool,
    ) -> Result<ChargingSession, SessionFailure> {
        let session = live.current();
        if session.status.is_terminal() {
            self.retire(live, from_monitor);
            return Ok(session);
        }
        let id = session.id.clone();
        error!(session_id = %id, error = %cause, "Session degraded");

        live.flush_and_close().await;
        let session = live.current();
        let now = Utc::now();
        let message = cause.to_string();
        if let Err(e) = self
            .commit(live, |s| {
                s.transition(SessionStatus::Error, now)?;
                s.error_message = Some(message.clone());
                Ok(())
            })
            .await
        {
            error!(session_id = %id, error = %e, "Could not record degraded session");
        }

        if !matches!(cause, ChargeError::HardwareStopFailed { .. }) {
            if let Err(e) = self.hardware.stop(&session.station_id).await {
                warn!(session_id = %id, error = %e, "Best-effort stop failed");
            }
        }

        let energy = session.energy_delivered_kwh;
        let decision = CaptureDecision::clamp(
            energy_cost(energy, session.price_per_kwh),
            session.authorized_amount,
        );
        let note = format!("degraded settlement ({}): {}", cause.code(), message);
        let base = TransactionPatch {
            session_started_at: session.started_at,
            session_ended_at: Some(now),
            energy_delivered_kwh: Some(energy),
            needs_reconciliation: Some(true),
            ..Default::default()
        };

        if decision.capture_amount == 0 {
            let released = self
                .gateway
                .cancel(&session.authorization_id, &idempotency_key(&id, "cancel"))
                .await;
            let (status, note) = match released {
                Ok(_) => (TransactionStatus::Cancelled, note),
                Err(e) => (TransactionStatus::Failed, format!("{}; release failed: {}", note, e)),
            };
            self.settle_transaction(
                &id,
                status,
                TransactionPatch {
                    amount: Some(0),
                    reconciliation_note: Some(note),
                    ..base
                },
            )
            .await;
        } else {
            match self
                .gateway
                .capture(
                    &session.authorization_id,
                    Some(decision.capture_amount),
                    &idempotency_key(&id, "capture"),
                )
                .await
            {
                Ok(outcome) => {
                    let captured = outcome.captured_amount.min(session.authorized_amount);
                    warn!(session_id = %id, captured, "Best-effort capture of last known energy");
                    let settled = self
                        .settle_transaction(
                            &id,
                            TransactionStatus::Succeeded,
                            TransactionPatch {
                                amount: Some(captured),
                                capture_id: Some(outcome.capture_id),
                                reconciliation_note: Some(note),
                                ..base
                            },
                        )
                        .await;
                    if let Some(tx) = settled {
                        self.receipts.dispatch(tx.id);
                    }
                }
                Err(e) => {
                    error!(session_id = %id, error = %e, "Best-effort capture failed");
                    self.settle_transaction(
                        &id,
                        TransactionStatus::Failed,
                        TransactionPatch {
                            reconciliation_note: Some(format!("{}; capture failed: {}", note, e)),
                            ..base
                        },
                    )
                    .await;
                }
            }
        }

        self.mark_station(&session.station_id, StationStatus::Offline).await;
        self.retire(live, from_monitor);
        finished("error");
        Err(SessionFailure::new(&id, Some(live.current().status), cause))
    }

    // ── Helpers ────────────────────────────────────────────────

    /// Write the mutated snapshot, then adopt the stored copy in memory.
    async fn commit<F>(&self, live: &LiveSession, mutate: F) -> DomainResult<ChargingSession>
    where
        F: FnOnce(&mut ChargingSession) -> DomainResult<()>,
    {
        let mut next = live.current();
        let expected = next.status;
        mutate(&mut next)?;
        match self
            .store
            .transition_session(&next.id, expected, SessionPatch::snapshot(&next))
            .await
        {
            Ok(stored) => {
                live.replace(stored);
                Ok(live.current())
            }
            Err(e @ ChargeError::InvalidState(_)) => {
                // Someone else moved the record; adopt theirs
                if let Ok(stored) = self.store.get_session(&next.id).await {
                    live.replace(stored);
                }
                Err(e)
            }
            Err(e) => Err(e),
        }
    }

    /// Energy reading after stop; never lower than what ticks reported.
    async fn final_energy(&self, live: &LiveSession) -> f64 {
        let session = live.current();
        match self.hardware.status(&session.station_id).await {
            Ok(frame) if frame.energy_kwh.is_finite() => {
                frame.energy_kwh.max(session.energy_delivered_kwh)
            }
            Ok(_) => session.energy_delivered_kwh,
            Err(e) => {
                warn!(session_id = %session.id, error = %e, "Final status read failed; using last tick");
                session.energy_delivered_kwh
            }
        }
    }

    async fn settle_transaction(
        &self,
        session_id: &str,
        next: TransactionStatus,
        patch: TransactionPatch,
    ) -> Option<Transaction> {
        let tx = match self.store.transaction_for_session(session_id).await {
            Ok(tx) => tx,
            Err(e) => {
                warn!(session_id, error = %e, "No transaction to settle");
                return None;
            }
        };
        match self.store.ledger().transition(&tx.id, next, patch).await {
            Ok(updated) => Some(updated),
            Err(e) => {
                error!(
                    session_id,
                    transaction_id = %tx.id,
                    status = %next,
                    error = %e,
                    "Transaction update failed"
                );
                None
            }
        }
    }

    async fn mark_station(&self, station_id: &str, status: StationStatus) {
        if let Err(e) = self
            .store
            .repos()
            .stations()
            .update_status(station_id, status)
            .await
        {
            warn!(station_id, status = status.as_str(), error = %e, "Station status update failed");
        }
    }

    fn claim_station(&self, station_id: &str, session_id: &str) -> DomainResult<()> {
        match self.claims.entry(station_id.to_string()) {
            dashmap::mapref::entry::Entry::Occupied(_) => Err(ChargeError::StationUnavailable {
                station_id: station_id.to_string(),
                status: "busy".to_string(),
            }),
            dashmap::mapref::entry::Entry::Vacant(slot) => {
                slot.insert(session_id.to_string());
                Ok(())
            }
        }
    }

    fn release_claim(&self, station_id: &str, session_id: &str) {
        self.claims
            .remove_if(station_id, |_, holder| holder == session_id);
    }

    /// Drop a finished session from the registry. The monitor is aborted
    /// unless it is the caller.
    fn retire(&self, live: &LiveSession, from_monitor: bool) {
        let session = live.current();
        self.live.remove(&session.id);
        self.release_claim(&session.station_id, &session.id);
        if !from_monitor {
            live.abort_monitor();
        }
    }

    // ── Queries ────────────────────────────────────────────────

    /// In-memory snapshot when this process owns the session, otherwise
    /// the stored record.
    pub async fn live_view(&self, session_id: &str) -> DomainResult<LiveView> {
        let (session, monitored) = match self.live.get(session_id) {
            Some(live) => (live.current(), true),
            None => (self.store.get_session(session_id).await?, false),
        };
        let now = Utc::now();
        Ok(LiveView {
            live_cost: session.live_cost(),
            elapsed_secs: session.elapsed_secs(now),
            session,
            monitored,
        })
    }

    /// Abort every monitor. Sessions stay active in the store and are
    /// picked up by the sweeper after a restart.
    pub fn shutdown(&self) {
        let count = self.live.len();
        for entry in self.live.iter() {
            entry.value().abort_all();
        }
        self.live.clear();
        self.claims.clear();
        info!(live_sessions = count, "Charging coordinator stopped");
    }
}
