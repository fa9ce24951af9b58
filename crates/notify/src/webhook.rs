//! HTTP webhook channel.
//!
//! Posts the rendered [`Notification`] as JSON to a configured endpoint,
//! e.g. an on-call bridge or a chat incoming-webhook.

use std::collections::HashMap;
use std::time::Duration;

use crate::traits::{Notification, Notifier, NotifyError};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug)]
pub struct WebhookNotifier {
    /// Target URL (env vars already resolved).
    url: String,
    method: reqwest::Method,
    /// Custom headers to include on every request.
    headers: HashMap<String, String>,
    client: reqwest::Client,
}

impl WebhookNotifier {
    /// Create a new webhook notifier.
    ///
    /// `${VAR_NAME}` references in `url` and header values are resolved
    /// eagerly; a missing variable is a [`NotifyError::Config`].
    pub fn new(
        url: &str,
        method: Option<reqwest::Method>,
        headers: HashMap<String, String>,
    ) -> Result<Self, NotifyError> {
        let resolved_url = resolve_env_vars(url)?;
        if !resolved_url.starts_with("http://") && !resolved_url.starts_with("https://") {
            return Err(NotifyError::Config(format!(
                "webhook url must be http(s): {resolved_url}"
            )));
        }

        let mut resolved_headers = HashMap::with_capacity(headers.len());
        for (key, value) in &headers {
            resolved_headers.insert(key.clone(), resolve_env_vars(value)?);
        }

        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()?;

        Ok(Self {
            url: resolved_url,
            method: method.unwrap_or(reqwest::Method::POST),
            headers: resolved_headers,
            client,
        })
    }

    /// Build from config-level strings. `method` is case-insensitive.
    pub fn from_config(
        url: &str,
        method: Option<&str>,
        headers: Option<HashMap<String, String>>,
    ) -> Result<Self, NotifyError> {
        let parsed_method = match method {
            Some(m) => Some(
                m.to_uppercase()
                    .parse::<reqwest::Method>()
                    .map_err(|_| NotifyError::Config(format!("invalid HTTP method: {m}")))?,
            ),
            None => None,
        };

        Self::new(url, parsed_method, headers.unwrap_or_default())
    }
}

#[async_trait::async_trait]
impl Notifier for WebhookNotifier {
    async fn send(&self, notification: &Notification) -> Result<(), NotifyError> {
        let mut request = self
            .client
            .request(self.method.clone(), &self.url)
            .json(notification);

        for (key, value) in &self.headers {
            request = request.header(key.as_str(), value.as_str());
        }

        let response = request.send().await?;
        let status = response.status();

        if !status.is_success() {
            let body_text = response
                .text()
                .await
                .unwrap_or_else(|_| "<unreadable body>".to_string());
            tracing::warn!(
                url = %self.url,
                %status,
                body = %body_text,
                "webhook returned non-2xx status"
            );
            return Err(NotifyError::Rejected(format!(
                "webhook returned {status}: {body_text}"
            )));
        }

        tracing::debug!(url = %self.url, %status, "webhook notification delivered");
        Ok(())
    }

    fn channel_name(&self) -> &str {
        "webhook"
    }
}

/// Resolve `${VAR_NAME}` patterns in a string using `std::env::var`.
fn resolve_env_vars(input: &str) -> Result<String, NotifyError> {
    let mut result = String::with_capacity(input.len());
    let mut chars = input.chars().peekable();

    while let Some(ch) = chars.next() {
        if ch == '$' && chars.peek() == Some(&'{') {
            chars.next();
            let mut var_name = String::new();
            let mut closed = false;
            for c in chars.by_ref() {
                if c == '}' {
                    closed = true;
                    break;
                }
                var_name.push(c);
            }
            if !closed {
                return Err(NotifyError::Config(format!(
                    "unclosed env var reference in: {input}"
                )));
            }
            let value = std::env::var(&var_name)
                .map_err(|_| NotifyError::Config(format!("env var not found: {var_name}")))?;
            result.push_str(&value);
        } else {
            result.push(ch);
        }
    }

    Ok(result)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolves_env_references_in_url() {
        std::env::set_var("HW_HOOK_HOST", "alerts.example.com");
        let n = WebhookNotifier::from_config("https://${HW_HOOK_HOST}/hook", None, None).unwrap();
        assert_eq!(n.url, "https://alerts.example.com/hook");
        std::env::remove_var("HW_HOOK_HOST");
    }

    #[test]
    fn missing_env_reference_is_config_error() {
        match WebhookNotifier::from_config("https://${HW_NEVER_SET_8812}/hook", None, None) {
            Err(NotifyError::Config(msg)) => assert!(msg.contains("HW_NEVER_SET_8812")),
            other => panic!("expected Config error, got: {other:?}"),
        }
    }

    #[test]
    fn unclosed_reference_is_rejected() {
        let err = resolve_env_vars("https://${UNCLOSED/hook").unwrap_err();
        assert!(err.to_string().contains("unclosed"));
    }

    #[test]
    fn method_defaults_to_post_and_is_case_insensitive() {
        let n = WebhookNotifier::from_config("https://example.com", None, None).unwrap();
        assert_eq!(n.method, reqwest::Method::POST);
        let n = WebhookNotifier::from_config("https://example.com", Some("put"), None).unwrap();
        assert_eq!(n.method, reqwest::Method::PUT);
        assert!(
            WebhookNotifier::from_config("https://example.com", Some("NOT A METHOD"), None)
                .is_err()
        );
    }

    #[test]
    fn non_http_url_rejected() {
        assert!(WebhookNotifier::from_config("ftp://example.com", None, None).is_err());
    }

    #[test]
    fn header_values_resolve_env() {
        std::env::set_var("HW_HOOK_TOKEN", "s3cret");
        let headers = HashMap::from([
            ("Authorization".to_string(), "Bearer ${HW_HOOK_TOKEN}".to_string()),
            ("X-Source".to_string(), "heatwatch".to_string()),
        ]);
        let n = WebhookNotifier::from_config("https://example.com", None, Some(headers)).unwrap();
        assert_eq!(n.headers["Authorization"], "Bearer s3cret");
        assert_eq!(n.headers["X-Source"], "heatwatch");
        assert_eq!(n.channel_name(), "webhook");
        std::env::remove_var("HW_HOOK_TOKEN");
    }
}
