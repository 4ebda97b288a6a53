//! In-memory state for a session owned by this process

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use chrono::{DateTime, Utc};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::warn;

use crate::application::store::SessionStore;
use crate::domain::ports::TelemetryFrame;
use crate::domain::{ChargingSession, SessionPatch, SessionStatus};

pub(super) struct LiveSession {
    snapshot: Mutex<ChargingSession>,
    /// Held for the whole of every lifecycle transition
    pub(super) transitions: tokio::sync::Mutex<()>,
    persist: Mutex<Option<watch::Sender<Option<SessionPatch>>>>,
    persister: Mutex<Option<JoinHandle<()>>>,
    monitor: Mutex<Option<JoinHandle<()>>>,
}

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}

impl LiveSession {
    pub(super) fn new(session: ChargingSession) -> Self {
        Self {
            snapshot: Mutex::new(session),
            transitions: tokio::sync::Mutex::new(()),
            persist: Mutex::new(None),
            persister: Mutex::new(None),
            monitor: Mutex::new(None),
        }
    }

    pub(super) fn current(&self) -> ChargingSession {
        lock(&self.snapshot).clone()
    }

    pub(super) fn id(&self) -> String {
        lock(&self.snapshot).id.clone()
    }

    /// Replace the snapshot with a stored copy, keeping telemetry that
    /// arrived while the write was in flight.
    pub(super) fn replace(&self, mut stored: ChargingSession) {
        let mut current = lock(&self.snapshot);
        if current.energy_delivered_kwh > stored.energy_delivered_kwh {
            stored.energy_delivered_kwh = current.energy_delivered_kwh;
        }
        if current.last_heartbeat > stored.last_heartbeat {
            stored.last_heartbeat = current.last_heartbeat;
        }
        *current = stored;
    }

    /// Fold a tick into the snapshot. Returns the telemetry patch to
    /// persist, or `None` once the session has left `Active` (energy for
    /// billing is frozen from that point).
    pub(super) fn record_tick(
        &self,
        frame: &TelemetryFrame,
        at: DateTime<Utc>,
    ) -> Option<SessionPatch> {
        let mut session = lock(&self.snapshot);
        if session.status != SessionStatus::Active {
            return None;
        }
        session.record_telemetry(frame.power_kw, frame.energy_kwh, frame.state, at);
        Some(SessionPatch::telemetry(&session))
    }

    /// Start the background writer for telemetry patches. Only the latest
    /// pending patch is kept, so a slow store never delays the next tick.
    pub(super) fn start_persister(&self, store: Arc<SessionStore>) {
        let (tx, mut rx) = watch::channel::<Option<SessionPatch>>(None);
        let session_id = self.id();
        let handle = tokio::spawn(async move {
            while rx.changed().await.is_ok() {
                let patch = rx.borrow_and_update().clone();
                if let Some(patch) = patch {
                    if let Err(e) = store.update_session(&session_id, patch).await {
                        warn!(session_id = %session_id, error = %e, "Telemetry write failed");
                    }
                }
            }
        });
        *lock(&self.persist) = Some(tx);
        *lock(&self.persister) = Some(handle);
    }

    pub(super) fn queue(&self, patch: SessionPatch) {
        if let Some(tx) = lock(&self.persist).as_ref() {
            tx.send_replace(Some(patch));
        }
    }

    /// Stop accepting telemetry writes and wait for the last one to land.
    pub(super) async fn flush_and_close(&self) {
        drop(lock(&self.persist).take());
        let handle = lock(&self.persister).take();
        if let Some(handle) = handle {
            let _ = handle.await;
        }
    }

    pub(super) fn set_monitor(&self, handle: JoinHandle<()>) {
        *lock(&self.monitor) = Some(handle);
    }

    pub(super) fn abort_monitor(&self) {
        if let Some(handle) = lock(&self.monitor).take() {
            handle.abort();
        }
    }

    pub(super) fn abort_all(&self) {
        self.abort_monitor();
        drop(lock(&self.persist).take());
        if let Some(handle) = lock(&self.persister).take() {
            handle.abort();
        }
    }
}
