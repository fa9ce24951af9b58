//! Minijinja rendering of alert notification text.
//!
//! Subject and body templates are plain strings supplied by configuration,
//! rendered against a [`TemplateContext`] built from the alert row.

use heatwatch_core::Alert;

use crate::traits::NotifyError;

/// Subject used when no template is configured.
pub const DEFAULT_SUBJECT_TEMPLATE: &str =
    "[{{ alert.severity | upper }}] Heat pump alert on device {{ alert.device_id }}";

/// Body used when no template is configured.
pub const DEFAULT_BODY_TEMPLATE: &str = "{{ alert.message }}\n\n\
Device: {{ alert.device_id }}\n\
{% if alert.site_id %}Site: {{ alert.site_id }}\n{% endif %}\
Severity: {{ alert.severity }}\n\
First seen: {{ alert.first_seen_at }}";

/// Context data available to notification templates.
#[derive(Debug, Clone, serde::Serialize)]
pub struct TemplateContext {
    pub alert: AlertContext,
    /// Event type. Only `"trigger"` is emitted today.
    pub event: String,
    /// Current timestamp in ISO 8601 format.
    pub now: String,
}

/// Alert fields exposed to templates.
#[derive(Debug, Clone, serde::Serialize)]
pub struct AlertContext {
    pub id: String,
    pub device_id: String,
    pub site_id: Option<String>,
    pub rule_id: Option<String>,
    #[serde(rename = "type")]
    pub alert_type: String,
    pub severity: String,
    pub message: String,
    pub first_seen_at: String,
}

impl TemplateContext {
    pub fn trigger(alert: &Alert, now: chrono::DateTime<chrono::Utc>) -> Self {
        Self {
            alert: AlertContext {
                id: alert.id.to_string(),
                device_id: alert.device_id.to_string(),
                site_id: alert.site_id.map(|s| s.to_string()),
                rule_id: alert.rule_id.map(|r| r.to_string()),
                alert_type: alert.alert_type.clone(),
                severity: alert.severity.to_string(),
                message: alert.message.clone(),
                first_seen_at: alert.first_seen_at.to_rfc3339(),
            },
            event: "trigger".to_string(),
            now: now.to_rfc3339(),
        }
    }
}

/// Renders notification templates using minijinja.
///
/// A fresh [`minijinja::Environment`] is created per render call since
/// templates are dynamic strings, not pre-registered files.
#[derive(Debug)]
pub struct TemplateRenderer {
    _private: (),
}

impl TemplateRenderer {
    pub fn new() -> Self {
        Self { _private: () }
    }

    fn build_env() -> minijinja::Environment<'static> {
        let mut env = minijinja::Environment::new();
        env.add_filter("round", round_filter);
        env.add_filter("upper", upper_filter);
        env
    }

    /// Render a template string with the given context.
    ///
    /// # Errors
    ///
    /// Returns [`NotifyError::Template`] if the template is invalid or
    /// rendering fails.
    pub fn render(&self, template_str: &str, ctx: &TemplateContext) -> Result<String, NotifyError> {
        let env = Self::build_env();
        env.render_str(template_str, ctx)
            .map_err(|e| NotifyError::Template(e.to_string()))
    }

    /// Check template syntax without evaluating it.
    pub fn validate(&self, template_str: &str) -> Result<(), NotifyError> {
        let env = Self::build_env();
        env.template_from_str(template_str)
            .map_err(|e| NotifyError::Template(e.to_string()))?;
        Ok(())
    }
}

impl Default for TemplateRenderer {
    fn default() -> Self {
        Self::new()
    }
}

fn round_filter(value: f64, decimals: Option<u32>) -> String {
    let n = decimals.unwrap_or(0);
    format!("{:.prec$}", value, prec = n as usize)
}

fn upper_filter(value: String) -> String {
    value.to_uppercase()
}
