//! Alerting for DeltaMon.
//!
//! - `classify`: threshold evaluation
//! - `AlertDispatcher`: per-account cooldown and hourly cap, async delivery
//! - `AlertSink`: delivery seam (`WebhookSink`, `LogSink`)

pub mod config;
pub mod dispatcher;
pub mod error;
pub mod rate_limiter;
pub mod sink;
pub mod threshold;
pub mod webhook;

pub use config::AlertsConfig;
pub use dispatcher::{
    AlertDispatcher, AlertLimits, AlertRecord, AlertStats, DispatchDecision, Submission,
    SuppressReason,
};
pub use error::{AlertError, AlertResult};
pub use rate_limiter::RateLimiter;
pub use sink::{AlertSink, BoxFuture, DeliveryResult, LogSink, NoticeLevel, SystemNotice};
pub use threshold::{classify, crossed_threshold};
pub use webhook::WebhookSink;
