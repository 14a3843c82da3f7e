//! Alert delivery seam.
//!
//! The dispatcher hands dispatched alerts to an `AlertSink`. Delivery runs on
//! a spawned task, so sinks return `'static` futures that own what they need.

use chrono::{DateTime, Utc};
use deltamon_core::AlertEvent;
use serde::Serialize;
use std::pin::Pin;
use tracing::{info, warn};

/// Boxed future for dyn-compatible async trait methods.
pub type BoxFuture<'a, T> = Pin<Box<dyn std::future::Future<Output = T> + Send + 'a>>;

/// Result of a delivery attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeliveryResult {
    Delivered,
    Failed(String),
}

impl DeliveryResult {
    #[must_use]
    pub fn is_success(&self) -> bool {
        matches!(self, DeliveryResult::Delivered)
    }
}

/// Severity of a system notice.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum NoticeLevel {
    Info,
    Success,
    Warning,
    Error,
}

/// Operator-facing status message (startup, shutdown, test).
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SystemNotice {
    pub level: NoticeLevel,
    pub message: String,
    pub timestamp: DateTime<Utc>,
}

impl SystemNotice {
    pub fn new(level: NoticeLevel, message: impl Into<String>) -> Self {
        Self {
            level,
            message: message.into(),
            timestamp: Utc::now(),
        }
    }
}

/// Delivers alerts and notices to an external channel.
pub trait AlertSink: Send + Sync {
    /// Short name for logs.
    fn name(&self) -> &'static str;

    fn send_alert(&self, alert: AlertEvent) -> BoxFuture<'static, DeliveryResult>;

    fn send_notice(&self, notice: SystemNotice) -> BoxFuture<'static, DeliveryResult>;
}

/// Sink that only logs. Used for dry runs and when no webhook is configured.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogSink;

impl AlertSink for LogSink {
    fn name(&self) -> &'static str {
        "log"
    }

    fn send_alert(&self, alert: AlertEvent) -> BoxFuture<'static, DeliveryResult> {
        Box::pin(async move {
            warn!(
                account = %alert.account,
                classification = %alert.classification,
                delta = %alert.delta,
                threshold = %alert.threshold,
                alert_id = %alert.id,
                "DELTA ALERT"
            );
            DeliveryResult::Delivered
        })
    }

    fn send_notice(&self, notice: SystemNotice) -> BoxFuture<'static, DeliveryResult> {
        Box::pin(async move {
            info!(level = ?notice.level, message = %notice.message, "System notice");
            DeliveryResult::Delivered
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use deltamon_core::{AccountId, Classification, Delta};
    use rust_decimal_macros::dec;

    #[tokio::test]
    async fn test_log_sink_always_delivers() {
        let sink = LogSink;
        let alert = AlertEvent::new(
            AccountId::new("ACC_1").unwrap(),
            Classification::Low,
            Delta(dec!(-0.06)),
            dec!(-0.05),
            Utc::now(),
        );
        assert!(sink.send_alert(alert).await.is_success());
        assert!(sink
            .send_notice(SystemNotice::new(NoticeLevel::Info, "started"))
            .await
            .is_success());
    }
}
