//! Broadcast change feed for session and transaction snapshots
//!
//! Uses a tokio broadcast channel. Delivery is at-least-once from the
//! subscriber's point of view: a lagged subscriber skips ahead and the next
//! snapshot corrects it.

use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;

use chrono::Utc;
use log::{debug, info, warn};
use tokio::sync::broadcast;

use super::events::{ChangeEvent, ChangeMessage};
use crate::domain::ChargingSession;

/// Default channel capacity
const DEFAULT_CAPACITY: usize = 1024;

#[derive(Clone)]
pub struct ChangeFeed {
    sender: broadcast::Sender<ChangeMessage>,
    subscriber_count: Arc<AtomicUsize>,
    seq: Arc<AtomicU64>,
}

impl ChangeFeed {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self {
            sender,
            subscriber_count: Arc::new(AtomicUsize::new(0)),
            seq: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Publish a snapshot to all subscribers
    pub fn publish(&self, event: ChangeEvent) {
        let event_type = event.event_type();
        let session_id = event.session_id().to_string();
        let message = ChangeMessage {
            seq: self.seq.fetch_add(1, Ordering::SeqCst) + 1,
            published_at: Utc::now(),
            event,
        };

        match self.sender.send(message) {
            Ok(count) => debug!(
                "Change published: type={}, session={}, subscribers={}",
                event_type, session_id, count
            ),
            Err(_) => debug!(
                "Change published (no subscribers): type={}, session={}",
                event_type, session_id
            ),
        }
    }

    /// Subscribe to every change
    pub fn subscribe(&self) -> FeedSubscriber {
        let receiver = self.sender.subscribe();
        let count = self.subscriber_count.fetch_add(1, Ordering::SeqCst) + 1;
        info!("New change feed subscriber, total: {}", count);

        FeedSubscriber {
            receiver,
            subscriber_count: self.subscriber_count.clone(),
        }
    }

    /// Subscribe to one session. The first item is `initial`, followed by
    /// every later session snapshot for the same id.
    pub fn subscribe_session(&self, initial: ChargingSession) -> SessionSubscription {
        SessionSubscription::from_subscriber(self.subscribe(), initial)
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscriber_count.load(Ordering::SeqCst)
    }
}

impl Default for ChangeFeed {
    fn default() -> Self {
        Self::new()
    }
}

/// Receives every change published on the feed
pub struct FeedSubscriber {
    receiver: broadcast::Receiver<ChangeMessage>,
    subscriber_count: Arc<AtomicUsize>,
}

impl FeedSubscriber {
    pub async fn recv(&mut self) -> Option<ChangeMessage> {
        loop {
            match self.receiver.recv().await {
                Ok(msg) => return Some(msg),
                Err(broadcast::error::RecvError::Lagged(count)) => {
                    warn!("Change feed subscriber lagged, {} changes missed", count);
                    continue;
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }
}

impl Drop for FeedSubscriber {
    fn drop(&mut self) {
        let prev = self.subscriber_count.fetch_sub(1, Ordering::SeqCst);
        debug!("Change feed subscriber dropped, remaining: {}", prev.saturating_sub(1));
    }
}

/// Snapshots of a single session. Dropping it unsubscribes.
pub struct SessionSubscription {
    session_id: String,
    pending: Option<ChargingSession>,
    inner: FeedSubscriber,
}

impl SessionSubscription {
    /// Wrap a subscriber taken before `initial` was read, so no write
    /// between the read and the subscription is lost.
    pub fn from_subscriber(inner: FeedSubscriber, initial: ChargingSession) -> Self {
        Self {
            session_id: initial.id.clone(),
            pending: Some(initial),
            inner,
        }
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    pub async fn next(&mut self) -> Option<ChargingSession> {
        if let Some(initial) = self.pending.take() {
            return Some(initial);
        }
        loop {
            let msg = self.inner.recv().await?;
            if let ChangeEvent::SessionUpdated(session) = msg.event {
                if session.id == self.session_id {
                    return Some(session);
                }
            }
        }
    }
}

pub type SharedChangeFeed = Arc<ChangeFeed>;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::session::NewSession;
    use rust_decimal::Decimal;
    use std::time::Duration;

    fn session(id: &str) -> ChargingSession {
        ChargingSession::new(NewSession {
            id: id.into(),
            user_id: "u1".into(),
            station_id: "st-1".into(),
            authorization_id: format!("pi_{}", id),
            currency: "usd".into(),
            price_per_kwh: Decimal::from(28),
            authorized_amount: 2000,
        })
    }

    #[tokio::test]
    async fn session_subscription_yields_snapshot_then_filtered_updates() {
        let feed = ChangeFeed::new();
        let mut sub = feed.subscribe_session(session("a"));

        let first = sub.next().await.unwrap();
        assert_eq!(first.id, "a");

        feed.publish(ChangeEvent::SessionUpdated(session("b")));
        let mut updated = session("a");
        updated.energy_delivered_kwh = 2.5;
        feed.publish(ChangeEvent::SessionUpdated(updated));

        let next = tokio::time::timeout(Duration::from_millis(100), sub.next())
            .await
            .expect("timeout")
            .unwrap();
        assert_eq!(next.id, "a");
        assert_eq!(next.energy_delivered_kwh, 2.5);
    }

    #[tokio::test]
    async fn dropping_subscription_unsubscribes() {
        let feed = ChangeFeed::new();
        let sub = feed.subscribe_session(session("a"));
        let other = feed.subscribe();
        assert_eq!(feed.subscriber_count(), 2);
        drop(sub);
        assert_eq!(feed.subscriber_count(), 1);
        drop(other);
        assert_eq!(feed.subscriber_count(), 0);
    }
}
