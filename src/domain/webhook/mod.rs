//! Processed webhook event log (dedup by event id)

pub mod repository;

pub use repository::WebhookEventRepository;
