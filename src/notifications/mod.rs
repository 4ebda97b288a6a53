//! Change notifications
//!
//! Every confirmed session or transaction write is published on a
//! broadcast change feed. Consumers (HTTP event streams, tests) subscribe
//! per session and receive full snapshots, never deltas.

pub mod change_feed;
pub mod events;

pub use change_feed::{ChangeFeed, FeedSubscriber, SessionSubscription, SharedChangeFeed};
pub use events::{ChangeEvent, ChangeMessage};
