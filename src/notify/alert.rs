//! Best-effort operator alerts.

use crate::error::{Result, SyncError};
use async_trait::async_trait;
use reqwest::Client;
use serde_json::{Value as JsonValue, json};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

/// One alert, ready for delivery.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AlertEvent {
    /// Identifies the host that raised the alert.
    pub host_label: String,
    /// Alert text.
    pub message: String,
}

impl AlertEvent {
    /// Plain-text rendering: host label on the first line, message below.
    pub fn render(&self) -> String {
        format!("{}\n{}", self.host_label, self.message)
    }
}

/// Delivers alerts to an operator channel.
#[async_trait]
pub trait AlertTransport: Send + Sync {
    /// Deliver one alert.
    ///
    /// # Errors
    ///
    /// Returns `SyncError::AlertError` if delivery failed.
    async fn send(&self, event: &AlertEvent) -> Result<()>;
}

/// Posts alerts as text messages to a chat webhook.
///
/// The payload follows the group-robot format
/// `{"msgtype": "text", "text": {"content": "..."}}`. A non-2xx status or a
/// non-zero `errcode` in the response body counts as a failed delivery.
pub struct WebhookTransport {
    url: String,
    client: Client,
}

impl WebhookTransport {
    /// Create a transport posting to `url`.
    ///
    /// # Errors
    ///
    /// Returns `SyncError::ClientError` if the HTTP client cannot be constructed.
    pub fn new(url: impl Into<String>, timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| SyncError::ClientError(format!("Failed to create HTTP client: {}", e)))?;
        Ok(Self {
            url: url.into(),
            client,
        })
    }
}

#[async_trait]
impl AlertTransport for WebhookTransport {
    async fn send(&self, event: &AlertEvent) -> Result<()> {
        let payload = json!({
            "msgtype": "text",
            "text": { "content": event.render() },
        });

        let response = self
            .client
            .post(&self.url)
            .json(&payload)
            .send()
            .await
            .map_err(|e| SyncError::AlertError(format!("HTTP request failed: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            return Err(SyncError::AlertError(format!(
                "webhook returned status {}",
                status
            )));
        }

        // Some webhooks answer with an empty body; only an explicit errcode fails.
        let body: JsonValue = response.json().await.unwrap_or(JsonValue::Null);
        match body.get("errcode").and_then(JsonValue::as_i64) {
            Some(0) | None => Ok(()),
            Some(code) => Err(SyncError::AlertError(format!(
                "webhook rejected alert: errcode {} ({})",
                code,
                body.get("errmsg")
                    .and_then(JsonValue::as_str)
                    .unwrap_or("no message")
            ))),
        }
    }
}

/// Sends operator alerts without ever blocking or failing the caller.
///
/// When disabled, [`AlertNotifier::notify`] does nothing. When enabled, each
/// alert is delivered on its own task and delivery failures are only logged.
///
/// # Examples
///
/// ```rust,no_run
/// use proxy_config_sync::notify::{AlertNotifier, WebhookTransport};
/// use std::sync::Arc;
/// use std::time::Duration;
///
/// # async fn example() -> proxy_config_sync::error::Result<()> {
/// let transport =
///     WebhookTransport::new("https://hooks.example.com/send", Duration::from_secs(5))?;
/// let alerts = AlertNotifier::new(Arc::new(transport), "edge-01");
/// alerts.notify("nginx reload succeeded");
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct AlertNotifier {
    transport: Option<Arc<dyn AlertTransport>>,
    host_label: String,
}

impl AlertNotifier {
    /// Create an enabled notifier.
    pub fn new(transport: Arc<dyn AlertTransport>, host_label: impl Into<String>) -> Self {
        Self {
            transport: Some(transport),
            host_label: host_label.into(),
        }
    }

    /// Create a notifier that drops every alert.
    pub fn disabled() -> Self {
        Self {
            transport: None,
            host_label: String::new(),
        }
    }

    /// Whether alerts are delivered.
    pub fn is_enabled(&self) -> bool {
        self.transport.is_some()
    }

    /// Label prefixed to every alert.
    pub fn host_label(&self) -> &str {
        &self.host_label
    }

    /// Queue an alert for delivery.
    ///
    /// Returns the delivery task when alerting is enabled, so callers that
    /// care (tests, mostly) can wait for it. Must be called within a tokio
    /// runtime when enabled.
    pub fn notify(&self, message: impl Into<String>) -> Option<JoinHandle<()>> {
        let transport = Arc::clone(self.transport.as_ref()?);
        let event = AlertEvent {
            host_label: self.host_label.clone(),
            message: message.into(),
        };

        Some(tokio::spawn(async move {
            match transport.send(&event).await {
                Ok(()) => debug!(message = %event.message, "alert delivered"),
                Err(e) => warn!(message = %event.message, error = %e, "alert delivery failed"),
            }
        }))
    }
}

impl Default for AlertNotifier {
    fn default() -> Self {
        Self::disabled()
    }
}

/// Best-guess host name for alert labels.
pub fn local_hostname() -> String {
    std::env::var("HOSTNAME")
        .ok()
        .filter(|name| !name.is_empty())
        .or_else(|| {
            std::fs::read_to_string("/etc/hostname")
                .ok()
                .map(|name| name.trim().to_string())
                .filter(|name| !name.is_empty())
        })
        .unwrap_or_else(|| "unknown".to_string())
}
