//! Discord-compatible webhook sink.

use deltamon_core::{AlertEvent, Classification};
use reqwest::Client;
use serde_json::{json, Value};
use std::time::Duration;
use tracing::{debug, warn};

use crate::error::{AlertError, AlertResult};
use crate::sink::{AlertSink, BoxFuture, DeliveryResult, NoticeLevel, SystemNotice};

const COLOR_HIGH: u32 = 0x00ff00;
const COLOR_LOW: u32 = 0xff0000;

/// Posts alerts as embeds to a webhook URL. Any 2xx status is a delivery.
#[derive(Debug, Clone)]
pub struct WebhookSink {
    client: Client,
    url: String,
    username: String,
}

impl WebhookSink {
    pub fn new(url: impl Into<String>, username: impl Into<String>, timeout: Duration) -> AlertResult<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| AlertError::HttpClient(format!("Failed to create HTTP client: {e}")))?;

        Ok(Self {
            client,
            url: url.into(),
            username: username.into(),
        })
    }

    fn post(&self, payload: Value) -> BoxFuture<'static, DeliveryResult> {
        let client = self.client.clone();
        let url = self.url.clone();
        Box::pin(async move {
            match client.post(&url).json(&payload).send().await {
                Ok(response) if response.status().is_success() => {
                    debug!(status = %response.status(), "Webhook delivered");
                    DeliveryResult::Delivered
                }
                Ok(response) => {
                    let status = response.status();
                    let body = response.text().await.unwrap_or_default();
                    warn!(%status, %body, "Webhook rejected payload");
                    DeliveryResult::Failed(format!("HTTP {status}: {body}"))
                }
                Err(e) => DeliveryResult::Failed(format!("request failed: {e}")),
            }
        })
    }
}

impl AlertSink for WebhookSink {
    fn name(&self) -> &'static str {
        "webhook"
    }

    fn send_alert(&self, alert: AlertEvent) -> BoxFuture<'static, DeliveryResult> {
        self.post(alert_payload(&alert, &self.username))
    }

    fn send_notice(&self, notice: SystemNotice) -> BoxFuture<'static, DeliveryResult> {
        self.post(notice_payload(&notice, &self.username))
    }
}

/// Webhook body for a delta alert.
pub fn alert_payload(alert: &AlertEvent, username: &str) -> Value {
    let (direction, color) = match alert.classification {
        Classification::Low => ("below", COLOR_LOW),
        _ => ("above", COLOR_HIGH),
    };
    let delta = if alert.delta.inner().is_sign_positive() && !alert.delta.is_zero() {
        format!("+{}", alert.delta)
    } else {
        alert.delta.to_string()
    };

    json!({
        "username": username,
        "embeds": [{
            "title": format!("Delta Alert - {}", alert.account),
            "description": format!("Delta value {direction} threshold"),
            "color": color,
            "fields": [
                {"name": "Account", "value": format!("```{}```", alert.account), "inline": true},
                {"name": "Delta", "value": format!("```{delta}```"), "inline": true},
                {"name": "Threshold", "value": format!("```{}```", alert.threshold), "inline": true},
            ],
            "footer": {"text": format!("DeltaMon - alert {}", alert.id)},
            "timestamp": alert.timestamp.to_rfc3339(),
        }]
    })
}

/// Webhook body for a system notice.
pub fn notice_payload(notice: &SystemNotice, username: &str) -> Value {
    let color: u32 = match notice.level {
        NoticeLevel::Info => 0x3498db,
        NoticeLevel::Success => 0x2ecc71,
        NoticeLevel::Warning => 0xf39c12,
        NoticeLevel::Error => 0xe74c3c,
    };
    json!({
        "username": username,
        "embeds": [{
            "title": "DeltaMon System",
            "description": notice.message,
            "color": color,
            "footer": {"text": "DeltaMon System"},
            "timestamp": notice.timestamp.to_rfc3339(),
        }]
    })
}
