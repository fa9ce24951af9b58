//! Routes alert notifications to configured channels.
//!
//! The dispatcher renders a notification for a newly opened alert and
//! delivers it to every channel configured for the alert's rule, or to the
//! default channels when the rule has none. Individual channel failures
//! don't block other channels.

use std::collections::HashMap;

use chrono::Utc;
use heatwatch_core::Alert;
use uuid::Uuid;

use crate::templating::{
    TemplateContext, TemplateRenderer, DEFAULT_BODY_TEMPLATE, DEFAULT_SUBJECT_TEMPLATE,
};
use crate::traits::{AlertNotifier, DispatchResult, Notification, Notifier, NotifyError};

pub struct Dispatcher {
    /// Rule ID → channels for that rule.
    rule_channels: HashMap<Uuid, Vec<Box<dyn Notifier>>>,
    /// Fallback channels used when no rule-specific channels exist.
    default_channels: Vec<Box<dyn Notifier>>,
    renderer: TemplateRenderer,
    subject_template: String,
    body_template: String,
}

impl Dispatcher {
    /// Create an empty dispatcher.
    pub fn empty() -> Self {
        Self::with_defaults(Vec::new())
    }

    /// Create a dispatcher with channels shared across all rules.
    pub fn with_defaults(channels: Vec<Box<dyn Notifier>>) -> Self {
        Self {
            rule_channels: HashMap::new(),
            default_channels: channels,
            renderer: TemplateRenderer::new(),
            subject_template: DEFAULT_SUBJECT_TEMPLATE.to_string(),
            body_template: DEFAULT_BODY_TEMPLATE.to_string(),
        }
    }

    /// Override the subject/body templates. Both are syntax-checked first.
    pub fn with_templates(
        mut self,
        subject: Option<String>,
        body: Option<String>,
    ) -> Result<Self, NotifyError> {
        if let Some(subject) = subject {
            self.renderer.validate(&subject)?;
            self.subject_template = subject;
        }
        if let Some(body) = body {
            self.renderer.validate(&body)?;
            self.body_template = body;
        }
        Ok(self)
    }

    /// Replace all channels for a specific rule.
    pub fn set_rule_channels(&mut self, rule_id: Uuid, channels: Vec<Box<dyn Notifier>>) {
        self.rule_channels.insert(rule_id, channels);
    }

    fn channels_for(&self, rule_id: Option<Uuid>) -> &[Box<dyn Notifier>] {
        rule_id
            .and_then(|id| self.rule_channels.get(&id))
            .unwrap_or(&self.default_channels)
    }

    /// Render the notification for a newly opened alert.
    ///
    /// A template that fails at render time falls back to the alert message
    /// so the operator still gets something.
    pub fn render(&self, alert: &Alert) -> Notification {
        let ctx = TemplateContext::trigger(alert, Utc::now());

        let subject = self
            .renderer
            .render(&self.subject_template, &ctx)
            .unwrap_or_else(|e| {
                tracing::warn!(alert_id = %alert.id, error = %e, "subject template failed");
                format!("[{}] heat pump alert", alert.severity.as_str().to_uppercase())
            });
        let body = self
            .renderer
            .render(&self.body_template, &ctx)
            .unwrap_or_else(|e| {
                tracing::warn!(alert_id = %alert.id, error = %e, "body template failed");
                alert.message.clone()
            });

        let mut metadata = HashMap::from([
            ("alert_id".to_string(), alert.id.to_string()),
            ("device_id".to_string(), alert.device_id.to_string()),
            ("severity".to_string(), alert.severity.to_string()),
            ("type".to_string(), alert.alert_type.clone()),
            ("event".to_string(), "trigger".to_string()),
        ]);
        if let Some(rule_id) = alert.rule_id {
            metadata.insert("rule_id".to_string(), rule_id.to_string());
        }
        if let Some(site_id) = alert.site_id {
            metadata.insert("site_id".to_string(), site_id.to_string());
        }

        Notification {
            subject,
            body,
            metadata,
        }
    }

    /// Deliver a rendered notification to every channel routed for `rule_id`.
    pub async fn dispatch(
        &self,
        rule_id: Option<Uuid>,
        notification: &Notification,
    ) -> Vec<DispatchResult> {
        let channels = self.channels_for(rule_id);

        if channels.is_empty() {
            tracing::debug!(rule_id = ?rule_id, "No notification channels configured");
            return Vec::new();
        }

        let alert_id = notification
            .metadata
            .get("alert_id")
            .cloned()
            .unwrap_or_default();
        let mut results = Vec::with_capacity(channels.len());

        for channel in channels {
            let start = std::time::Instant::now();
            let result = channel.send(notification).await;
            let duration_ms = start.elapsed().as_millis() as u64;

            let (success, error) = match result {
                Ok(()) => {
                    tracing::info!(
                        alert_id = %alert_id,
                        channel = channel.channel_name(),
                        duration_ms,
                        "Notification delivered"
                    );
                    (true, None)
                }
                Err(e) => {
                    tracing::warn!(
                        alert_id = %alert_id,
                        channel = channel.channel_name(),
                        error = %e,
                        duration_ms,
                        "Notification delivery failed"
                    );
                    (false, Some(e.to_string()))
                }
            };

            results.push(DispatchResult {
                channel: channel.channel_name().to_string(),
                alert_id: alert_id.clone(),
                success,
                error,
                duration_ms,
            });
        }

        results
    }
}

#[async_trait::async_trait]
impl AlertNotifier for Dispatcher {
    async fn send_alert_notification(&self, alert: &Alert) -> Vec<DispatchResult> {
        let notification = self.render(alert);
        self.dispatch(alert.rule_id, &notification).await
    }
}
