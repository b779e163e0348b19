//! Alert delivery to chat webhooks.

use std::time::Duration;

use opsboard_core::{Alert, Severity};
use reqwest::Client;
use serde_json::{json, Value};
use tracing::{debug, warn};

use crate::config::NotifierConfig;
use crate::error::{ServerError, ServerResult};

const WEBHOOK_TIMEOUT: Duration = Duration::from_secs(10);
const BOT_NAME: &str = "opsboard";

/// Posts alerts to Discord and/or Slack incoming webhooks.
#[derive(Clone)]
pub struct Notifier {
    client: Client,
    discord_url: Option<String>,
    slack_url: Option<String>,
}

impl Notifier {
    /// Returns `None` when no webhook is configured.
    pub fn from_config(config: &NotifierConfig) -> ServerResult<Option<Self>> {
        if !config.is_enabled() {
            return Ok(None);
        }
        let client = Client::builder()
            .timeout(WEBHOOK_TIMEOUT)
            .build()
            .map_err(|e| ServerError::Webhook(format!("Failed to create HTTP client: {e}")))?;

        let non_empty = |s: &str| (!s.is_empty()).then(|| s.to_string());
        Ok(Some(Self {
            client,
            discord_url: non_empty(&config.discord_webhook_url),
            slack_url: non_empty(&config.slack_webhook_url),
        }))
    }

    /// Deliver one alert to every configured webhook. Failures are logged.
    pub async fn notify(&self, alert: &Alert) {
        if let Some(url) = &self.discord_url {
            if let Err(e) = self.post(url, &discord_payload(alert)).await {
                warn!(alert_id = %alert.id, error = %e, "Discord webhook failed");
            }
        }
        if let Some(url) = &self.slack_url {
            if let Err(e) = self.post(url, &slack_payload(alert)).await {
                warn!(alert_id = %alert.id, error = %e, "Slack webhook failed");
            }
        }
    }

    async fn post(&self, url: &str, body: &Value) -> ServerResult<()> {
        let response = self
            .client
            .post(url)
            .json(body)
            .send()
            .await
            .map_err(|e| ServerError::Webhook(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(ServerError::Webhook(format!("HTTP {status}")));
        }
        debug!(status = %status, "Webhook delivered");
        Ok(())
    }
}

fn discord_color(severity: Severity) -> u32 {
    match severity {
        Severity::Info => 0x3b82f6,
        Severity::Warning => 0xf59e0b,
        Severity::Error => 0xef4444,
        Severity::Critical => 0x991b1b,
    }
}

fn slack_color(severity: Severity) -> &'static str {
    match severity {
        Severity::Info => "#3b82f6",
        Severity::Warning => "#f59e0b",
        Severity::Error => "#ef4444",
        Severity::Critical => "#991b1b",
    }
}

pub fn discord_payload(alert: &Alert) -> Value {
    json!({
        "username": BOT_NAME,
        "embeds": [{
            "title": alert.title,
            "description": alert.message,
            "color": discord_color(alert.severity),
            "fields": [
                {"name": "Severity", "value": alert.severity.as_str().to_uppercase(), "inline": true},
                {"name": "Source", "value": alert.source, "inline": true},
            ],
            "timestamp": alert.timestamp.to_rfc3339(),
            "footer": {"text": BOT_NAME},
        }],
    })
}

pub fn slack_payload(alert: &Alert) -> Value {
    json!({
        "username": BOT_NAME,
        "attachments": [{
            "color": slack_color(alert.severity),
            "title": alert.title,
            "text": alert.message,
            "fields": [
                {"title": "Severity", "value": alert.severity.as_str().to_uppercase(), "short": true},
                {"title": "Source", "value": alert.source, "short": true},
            ],
            "footer": BOT_NAME,
            "ts": alert.timestamp.timestamp(),
        }],
    })
}
