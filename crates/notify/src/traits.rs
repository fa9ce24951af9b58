//! Notifier traits and shared error types.

use std::collections::HashMap;

use heatwatch_core::Alert;

/// Errors that can occur during notification delivery.
#[derive(Debug, thiserror::Error)]
pub enum NotifyError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Template rendering failed: {0}")]
    Template(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Delivery rejected: {0}")]
    Rejected(String),
}

/// A rendered notification ready for delivery.
#[derive(Debug, Clone, serde::Serialize)]
pub struct Notification {
    /// The rendered subject/title.
    pub subject: String,
    /// The rendered body content.
    pub body: String,
    /// Additional metadata (e.g., severity, device id).
    pub metadata: HashMap<String, String>,
}

/// A single delivery channel.
#[async_trait::async_trait]
pub trait Notifier: Send + Sync {
    /// Deliver a notification through this channel.
    async fn send(&self, notification: &Notification) -> Result<(), NotifyError>;

    /// Human-readable name for this channel (e.g., "webhook").
    fn channel_name(&self) -> &str;
}

/// Push side of the alert engine: called once for every newly opened alert.
///
/// Delivery is best effort. Implementations log their own failures and
/// must not panic; callers never act on the returned results beyond logging.
#[async_trait::async_trait]
pub trait AlertNotifier: Send + Sync {
    async fn send_alert_notification(&self, alert: &Alert) -> Vec<DispatchResult>;
}

/// Result of dispatching a notification to a single channel.
#[derive(Debug, Clone)]
pub struct DispatchResult {
    pub channel: String,
    pub alert_id: String,
    pub success: bool,
    pub error: Option<String>,
    pub duration_ms: u64,
}
