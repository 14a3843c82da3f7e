//! Configuration hot reload.
//!
//! Polls the config file's modification time. A changed file is re-loaded and
//! validated; only `[monitor]` is applied to the running engine. An invalid
//! file is rejected and the active configuration stays in place.

use deltamon_core::MonitorConfig;
use deltamon_scanner::MonitorEngine;
use deltamon_telemetry::Metrics;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, SystemTime};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::AppConfig;
use crate::error::AppResult;

/// Result of one reload attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReloadOutcome {
    /// File unchanged since the last check.
    NotModified,
    /// `[monitor]` changed and was applied.
    Applied,
    /// File changed but `[monitor]` is the same.
    Unchanged,
    /// File failed to load or validate.
    Rejected(String),
}

impl ReloadOutcome {
    fn metric_label(&self) -> Option<&'static str> {
        match self {
            Self::NotModified => None,
            Self::Applied => Some("applied"),
            Self::Unchanged => Some("unchanged"),
            Self::Rejected(_) => Some("rejected"),
        }
    }
}

/// Watches one config file on behalf of an engine.
pub struct ConfigWatcher {
    path: PathBuf,
    engine: Arc<MonitorEngine>,
    /// Configuration the process was started with.
    startup: AppConfig,
    last_modified: Option<SystemTime>,
}

impl ConfigWatcher {
    pub fn new(path: impl Into<PathBuf>, engine: Arc<MonitorEngine>, startup: AppConfig) -> Self {
        let path = path.into();
        let last_modified = modified(&path);
        Self {
            path,
            engine,
            startup,
            last_modified,
        }
    }

    /// Reload if the file's modification time moved.
    pub fn poll(&mut self) -> ReloadOutcome {
        let current = modified(&self.path);
        if current.is_none() || current == self.last_modified {
            return ReloadOutcome::NotModified;
        }
        self.last_modified = current;
        self.reload()
    }

    /// Load the file and apply `[monitor]`.
    pub fn reload(&mut self) -> ReloadOutcome {
        let outcome = match self.apply() {
            Ok(true) => ReloadOutcome::Applied,
            Ok(false) => ReloadOutcome::Unchanged,
            Err(e) => {
                warn!(path = %self.path.display(), error = %e, "Config reload rejected, keeping active config");
                ReloadOutcome::Rejected(e.to_string())
            }
        };
        if let Some(label) = outcome.metric_label() {
            Metrics::config_reload(label);
        }
        outcome
    }

    fn apply(&self) -> AppResult<bool> {
        let loaded = AppConfig::load(Some(&self.path))?;

        let restart = self.startup.restart_required_sections(&loaded);
        if !restart.is_empty() {
            warn!(sections = ?restart, "Config sections changed that only apply after a restart");
        }

        let before = self.engine.config().current();
        let applied = self.engine.update_config(loaded.monitor.clone())?;
        if applied {
            log_monitor_change(&before, &loaded.monitor);
        } else {
            debug!("Config file changed, monitor settings unchanged");
        }
        Ok(applied)
    }

    /// Poll every `interval` until cancelled.
    pub async fn run(mut self, interval: Duration, cancel: CancellationToken) {
        info!(path = %self.path.display(), interval_secs = interval.as_secs(), "Watching config for changes");
        let mut ticker = tokio::time::interval(interval);
        ticker.tick().await;
        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = ticker.tick() => {
                    self.poll();
                }
            }
        }
        debug!("Config watcher stopped");
    }
}

fn modified(path: &Path) -> Option<SystemTime> {
    std::fs::metadata(path).and_then(|m| m.modified()).ok()
}

fn log_monitor_change(before: &MonitorConfig, after: &MonitorConfig) {
    info!(
        positive_threshold = %after.positive_threshold,
        negative_threshold = %after.negative_threshold,
        scan_interval_seconds = after.scan_interval_seconds,
        alert_cooldown_minutes = after.alert_cooldown_minutes,
        max_alerts_per_hour = after.max_alerts_per_hour,
        parallel_scan_limit = after.parallel_scan_limit,
        max_consecutive_failures = after.max_consecutive_failures,
        previous_positive = %before.positive_threshold,
        previous_negative = %before.negative_threshold,
        "Monitor config applied, effective next cycle"
    );
}
