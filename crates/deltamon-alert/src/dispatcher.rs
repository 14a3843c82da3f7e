//! Rate-limited alert dispatch.
//!
//! For each `(account, classification)` pair the dispatcher remembers when an
//! alert was last sent. An alert is suppressed if
//! 1. the same pair was sent less than the cooldown ago, or
//! 2. the hourly cap across all accounts is already used up.
//!
//! The decision and the bookkeeping happen under one lock. Suppressed alerts
//! leave the bookkeeping untouched. Delivery runs on a spawned task with a
//! timeout; a failed delivery still counts against cooldown and cap.

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use deltamon_core::{AccountId, AlertEvent, Classification, MonitorConfig};
use deltamon_telemetry::Metrics;
use parking_lot::Mutex;
use serde::Serialize;
use std::collections::{HashMap, VecDeque};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::rate_limiter::RateLimiter;
use crate::sink::{AlertSink, DeliveryResult};

/// Why an alert was not sent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SuppressReason {
    Cooldown,
    HourlyCap,
}

impl SuppressReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Cooldown => "cooldown",
            Self::HourlyCap => "hourly_cap",
        }
    }
}

impl fmt::Display for SuppressReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Dispatcher decision for one alert.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "decision", content = "reason", rename_all = "snake_case")]
pub enum DispatchDecision {
    Dispatched,
    Suppressed(SuppressReason),
    /// Classification `none`; nothing to do.
    Ignored,
}

impl DispatchDecision {
    pub fn is_dispatched(&self) -> bool {
        matches!(self, Self::Dispatched)
    }
}

/// Rate limits read from the active `MonitorConfig`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AlertLimits {
    pub cooldown: ChronoDuration,
    pub max_per_hour: u32,
}

impl AlertLimits {
    pub fn new(cooldown_minutes: u64, max_per_hour: u32) -> Self {
        Self {
            cooldown: ChronoDuration::minutes(cooldown_minutes as i64),
            max_per_hour,
        }
    }
}

impl From<&MonitorConfig> for AlertLimits {
    fn from(config: &MonitorConfig) -> Self {
        Self::new(config.alert_cooldown_minutes, config.max_alerts_per_hour)
    }
}

/// One entry of the alert history ring.
#[derive(Debug, Clone, Serialize)]
pub struct AlertRecord {
    pub event: AlertEvent,
    pub decision: DispatchDecision,
    /// Set once delivery finishes; `None` while pending or if not dispatched.
    pub delivered: Option<bool>,
}

/// Dispatcher counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct AlertStats {
    pub dispatched: u64,
    pub suppressed_cooldown: u64,
    pub suppressed_cap: u64,
    pub delivered: u64,
    pub delivery_failures: u64,
}

#[derive(Debug, Default)]
struct Counters {
    dispatched: AtomicU64,
    suppressed_cooldown: AtomicU64,
    suppressed_cap: AtomicU64,
    delivered: AtomicU64,
    delivery_failures: AtomicU64,
}

#[derive(Debug)]
struct DispatcherState {
    last_sent: HashMap<(AccountId, Classification), DateTime<Utc>>,
    hourly: RateLimiter,
    history: VecDeque<AlertRecord>,
    sent_per_account: HashMap<AccountId, u64>,
}

/// Outcome of `submit`: the decision, plus the delivery task if dispatched.
#[derive(Debug)]
pub struct Submission {
    pub decision: DispatchDecision,
    pub delivery: Option<JoinHandle<DeliveryResult>>,
}

/// Rate-limits alerts and hands them to the sink.
pub struct AlertDispatcher {
    sink: Arc<dyn AlertSink>,
    state: Arc<Mutex<DispatcherState>>,
    counters: Arc<Counters>,
    delivery_timeout: Duration,
    history_size: usize,
}

impl AlertDispatcher {
    pub fn new(sink: Arc<dyn AlertSink>, delivery_timeout: Duration, history_size: usize) -> Self {
        Self {
            sink,
            state: Arc::new(Mutex::new(DispatcherState {
                last_sent: HashMap::new(),
                hourly: RateLimiter::hourly(0),
                history: VecDeque::with_capacity(history_size.min(1024)),
                sent_per_account: HashMap::new(),
            })),
            counters: Arc::new(Counters::default()),
            delivery_timeout,
            history_size: history_size.max(1),
        }
    }

    pub fn sink(&self) -> Arc<dyn AlertSink> {
        self.sink.clone()
    }

    /// Submit an alert timestamped now.
    pub fn submit(&self, event: AlertEvent, limits: AlertLimits) -> Submission {
        self.submit_at(event, limits, Utc::now())
    }

    /// Submit an alert, deciding as of `now`.
    ///
    /// Must be called within a tokio runtime when the alert can be
    /// dispatched.
    pub fn submit_at(&self, event: AlertEvent, limits: AlertLimits, now: DateTime<Utc>) -> Submission {
        if !event.classification.is_alert() {
            return Submission {
                decision: DispatchDecision::Ignored,
                delivery: None,
            };
        }

        let decision = {
            let mut state = self.state.lock();
            let key = (event.account.clone(), event.classification);
            state.hourly.set_max_events(limits.max_per_hour);

            let in_cooldown = limits.cooldown > ChronoDuration::zero()
                && state
                    .last_sent
                    .get(&key)
                    .is_some_and(|&last| now - last < limits.cooldown);

            let decision = if in_cooldown {
                DispatchDecision::Suppressed(SuppressReason::Cooldown)
            } else if !state.hourly.can_accept(now) {
                DispatchDecision::Suppressed(SuppressReason::HourlyCap)
            } else {
                state.last_sent.insert(key, now);
                state.hourly.record(now);
                *state
                    .sent_per_account
                    .entry(event.account.clone())
                    .or_insert(0) += 1;
                DispatchDecision::Dispatched
            };

            if state.history.len() >= self.history_size {
                state.history.pop_front();
            }
            state.history.push_back(AlertRecord {
                event: event.clone(),
                decision,
                delivered: None,
            });
            decision
        };

        match decision {
            DispatchDecision::Suppressed(reason) => {
                let counter = match reason {
                    SuppressReason::Cooldown => &self.counters.suppressed_cooldown,
                    SuppressReason::HourlyCap => &self.counters.suppressed_cap,
                };
                counter.fetch_add(1, Ordering::Relaxed);
                Metrics::alert_suppressed(reason.as_str());
                debug!(
                    account = %event.account,
                    classification = %event.classification,
                    %reason,
                    "Alert suppressed"
                );
                Submission {
                    decision,
                    delivery: None,
                }
            }
            DispatchDecision::Dispatched => {
                self.counters.dispatched.fetch_add(1, Ordering::Relaxed);
                Metrics::alert_dispatched(event.classification.as_str());
                info!(
                    account = %event.account,
                    classification = %event.classification,
                    delta = %event.delta,
                    threshold = %event.threshold,
                    "Alert dispatched"
                );
                let delivery = self.spawn_delivery(event);
                Submission {
                    decision,
                    delivery: Some(delivery),
                }
            }
            DispatchDecision::Ignored => Submission {
                decision,
                delivery: None,
            },
        }
    }

    fn spawn_delivery(&self, event: AlertEvent) -> JoinHandle<DeliveryResult> {
        let sink = self.sink.clone();
        let state = self.state.clone();
        let counters = self.counters.clone();
        let timeout = self.delivery_timeout;
        let id = event.id;
        let account = event.account.clone();

        tokio::spawn(async move {
            let result = match tokio::time::timeout(timeout, sink.send_alert(event)).await {
                Ok(result) => result,
                Err(_) => DeliveryResult::Failed(format!("timed out after {}ms", timeout.as_millis())),
            };

            let delivered = result.is_success();
            if delivered {
                counters.delivered.fetch_add(1, Ordering::Relaxed);
            } else {
                counters.delivery_failures.fetch_add(1, Ordering::Relaxed);
                Metrics::alert_delivery_failed();
                if let DeliveryResult::Failed(reason) = &result {
                    warn!(%account, sink = sink.name(), %reason, "Alert delivery failed");
                }
            }

            let mut state = state.lock();
            if let Some(record) = state.history.iter_mut().rev().find(|r| r.event.id == id) {
                record.delivered = Some(delivered);
            }
            result
        })
    }

    pub fn stats(&self) -> AlertStats {
        AlertStats {
            dispatched: self.counters.dispatched.load(Ordering::Relaxed),
            suppressed_cooldown: self.counters.suppressed_cooldown.load(Ordering::Relaxed),
            suppressed_cap: self.counters.suppressed_cap.load(Ordering::Relaxed),
            delivered: self.counters.delivered.load(Ordering::Relaxed),
            delivery_failures: self.counters.delivery_failures.load(Ordering::Relaxed),
        }
    }

    /// Most recent alert decisions, newest first.
    pub fn recent(&self, limit: usize) -> Vec<AlertRecord> {
        self.state
            .lock()
            .history
            .iter()
            .rev()
            .take(limit)
            .cloned()
            .collect()
    }

    /// Alerts sent per account since start.
    pub fn sent_per_account(&self) -> HashMap<AccountId, u64> {
        self.state.lock().sent_per_account.clone()
    }

    /// Alerts sent in the hour ending at `now`.
    pub fn sent_last_hour(&self, now: DateTime<Utc>) -> u32 {
        self.state.lock().hourly.current_count(now)
    }
}

impl fmt::Debug for AlertDispatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AlertDispatcher")
            .field("sink", &self.sink.name())
            .field("stats", &self.stats())
            .finish()
    }
}
