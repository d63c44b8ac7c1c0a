//! Participant notifications
//!
//! Best-effort push sink invoked by the indexer on each observed
//! transition. Delivery is fire-and-forget: one attempt, failures logged
//! by the caller and never retried.

use async_trait::async_trait;
use serde::Serialize;
use std::time::Duration;

/// Kind of escrow event a notification describes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationKind {
    Created,
    Funded,
    Released,
    Refunded,
    Disputed,
    Cancelled,
}

/// Payload pushed to the sink.
#[derive(Debug, Clone, Serialize)]
pub struct Notification {
    pub participant: String,
    pub kind: NotificationKind,
    pub chain_id: u64,
    pub escrow_id: u64,
    pub details: serde_json::Value,
}

/// Push sink keyed by participant address.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(&self, notification: Notification) -> anyhow::Result<()>;
}

/// Notifier that POSTs each notification to a configured webhook URL.
pub struct WebhookNotifier {
    client: reqwest::Client,
    sink_url: String,
}

impl WebhookNotifier {
    pub fn new(sink_url: String) -> Self {
        Self {
            client: reqwest::Client::builder()
                .timeout(Duration::from_secs(10))
                .build()
                .unwrap_or_else(|_| reqwest::Client::new()),
            sink_url,
        }
    }
}

#[async_trait]
impl Notifier for WebhookNotifier {
    async fn notify(&self, notification: Notification) -> anyhow::Result<()> {
        self.client
            .post(&self.sink_url)
            .json(&notification)
            .send()
            .await?
            .error_for_status()?;
        Ok(())
    }
}

/// Notifier used when no sink is configured.
#[derive(Debug, Default, Clone)]
pub struct NullNotifier;

#[async_trait]
impl Notifier for NullNotifier {
    async fn notify(&self, _notification: Notification) -> anyhow::Result<()> {
        Ok(())
    }
}
