//! Alert delivery configuration.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Alert delivery configuration (`[alerts]`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AlertsConfig {
    /// Discord-compatible webhook. Without one, alerts are only logged.
    #[serde(default)]
    pub webhook_url: Option<String>,
    /// Display name used for webhook posts.
    #[serde(default = "default_username")]
    pub username: String,
    #[serde(default = "default_delivery_timeout_secs")]
    pub delivery_timeout_secs: u64,
    /// Alert decisions kept for the snapshot.
    #[serde(default = "default_history_size")]
    pub history_size: usize,
    /// Send startup and shutdown notices through the sink.
    #[serde(default = "default_send_lifecycle_notices")]
    pub send_lifecycle_notices: bool,
}

fn default_username() -> String {
    "DeltaMon Bot".to_string()
}

fn default_delivery_timeout_secs() -> u64 {
    10
}

fn default_history_size() -> usize {
    1000
}

fn default_send_lifecycle_notices() -> bool {
    true
}

impl Default for AlertsConfig {
    fn default() -> Self {
        Self {
            webhook_url: None,
            username: default_username(),
            delivery_timeout_secs: default_delivery_timeout_secs(),
            history_size: default_history_size(),
            send_lifecycle_notices: default_send_lifecycle_notices(),
        }
    }
}

impl AlertsConfig {
    /// Validate configuration values.
    pub fn validate(&self) -> Result<(), String> {
        if let Some(url) = self.webhook() {
            if !(url.starts_with("https://") || url.starts_with("http://")) {
                return Err(format!("webhook_url ({url}) must be an http(s) URL"));
            }
        }
        if self.delivery_timeout_secs == 0 {
            return Err("delivery_timeout_secs must be at least 1".to_string());
        }
        if self.history_size == 0 {
            return Err("history_size must be at least 1".to_string());
        }
        Ok(())
    }

    pub fn delivery_timeout(&self) -> Duration {
        Duration::from_secs(self.delivery_timeout_secs)
    }

    /// Webhook URL, ignoring blank values.
    pub fn webhook(&self) -> Option<&str> {
        self.webhook_url
            .as_deref()
            .map(str::trim)
            .filter(|u| !u.is_empty())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_valid_and_log_only() {
        let config = AlertsConfig::default();
        assert!(config.validate().is_ok());
        assert!(config.webhook().is_none());
    }

    #[test]
    fn test_rejects_non_http_webhook() {
        let config = AlertsConfig {
            webhook_url: Some("discord.com/api/webhooks/1".to_string()),
            ..Default::default()
        };
        assert!(config.validate().unwrap_err().contains("http"));
    }

    #[test]
    fn test_blank_webhook_is_none() {
        let config = AlertsConfig {
            webhook_url: Some("   ".to_string()),
            ..Default::default()
        };
        assert!(config.webhook().is_none());
    }
}
