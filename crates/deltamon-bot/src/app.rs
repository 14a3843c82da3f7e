//! Application wiring and lifecycle.

use chrono::Utc;
use deltamon_alert::{
    AlertDispatcher, AlertSink, DeliveryResult, LogSink, NoticeLevel, SystemNotice, WebhookSink,
};
use deltamon_core::{AccountId, AlertEvent, Classification, ConfigHandle, Delta};
use deltamon_dashboard::run_server;
use deltamon_registry::DiscoveryReport;
use deltamon_scanner::MonitorEngine;
use deltamon_screen::{RemoteScreen, Screen, ScriptedScreen};
use std::path::PathBuf;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::config::AppConfig;
use crate::error::{AppError, AppResult};
use crate::reload::ConfigWatcher;

/// Accounts shown by the built-in demo screen.
const DEMO_ACCOUNTS: &[(&str, &str)] = &[
    ("DEMO_ALPHA", "0.02"),
    ("DEMO_BETA", "-0,07"),
    ("DEMO_GAMMA", "0.11"),
];

/// Main application.
pub struct Application {
    config: AppConfig,
    config_path: Option<PathBuf>,
    engine: Arc<MonitorEngine>,
    sink: Arc<dyn AlertSink>,
    cancel: CancellationToken,
}

impl Application {
    /// Wire the engine from configuration.
    ///
    /// `dry_run` forces the demo screen and the logging sink regardless of
    /// what is configured. Without it a vision agent must be configured.
    pub fn new(config: AppConfig, config_path: Option<PathBuf>, dry_run: bool) -> AppResult<Self> {
        let screen = Self::build_screen(&config, dry_run)?;
        let sink = Self::build_sink(&config, dry_run)?;
        let dispatcher = Arc::new(AlertDispatcher::new(
            sink.clone(),
            config.alerts.delivery_timeout(),
            config.alerts.history_size,
        ));
        let engine = MonitorEngine::new(
            screen,
            ConfigHandle::new(config.monitor.clone())?,
            config.scan.clone(),
            config.discovery.clone(),
            dispatcher,
        )?;

        Ok(Self {
            config,
            config_path,
            engine: Arc::new(engine),
            sink,
            cancel: CancellationToken::new(),
        })
    }

    /// The demo screen is only wired for dry runs, which also force the
    /// logging sink, so scripted readings never reach a real webhook.
    fn build_screen(config: &AppConfig, dry_run: bool) -> AppResult<Screen> {
        if dry_run {
            warn!("Dry run, using the demo screen");
            let demo = ScriptedScreen::demo(&config.discovery.dropdown_template, DEMO_ACCOUNTS)
                .with_delta_template(config.scan.delta_template.clone());
            return Ok(Screen::from_backend(Arc::new(demo)));
        }
        let Some(url) = config.vision.base_url() else {
            return Err(AppError::Config(
                "vision.base_url is required unless --dry-run is set".to_string(),
            ));
        };
        info!(url, "Using vision agent");
        let remote = RemoteScreen::new(url, Some(config.vision.timeout()))?;
        Ok(Screen::from_backend(Arc::new(remote)))
    }

    fn build_sink(config: &AppConfig, dry_run: bool) -> AppResult<Arc<dyn AlertSink>> {
        match config.alerts.webhook() {
            Some(url) if !dry_run => Ok(Arc::new(WebhookSink::new(
                url,
                config.alerts.username.clone(),
                config.alerts.delivery_timeout(),
            )?)),
            _ => {
                info!("No webhook configured (or dry run), alerts are logged only");
                Ok(Arc::new(LogSink))
            }
        }
    }

    pub fn engine(&self) -> &Arc<MonitorEngine> {
        &self.engine
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    /// Token that stops `run` when cancelled.
    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Run one discovery and return the report.
    pub async fn discover_once(&self) -> AppResult<DiscoveryReport> {
        Ok(self.engine.discover().await?)
    }

    /// Send a synthetic alert straight to the sink, bypassing rate limits.
    pub async fn send_test_alert(&self) -> DeliveryResult {
        let monitor = self.engine.config().current();
        let delta = Delta::new(monitor.positive_threshold + rust_decimal::Decimal::new(1, 2));
        let account = match AccountId::new("TEST_ACCOUNT") {
            Ok(account) => account,
            Err(e) => return DeliveryResult::Failed(e.to_string()),
        };
        let alert = AlertEvent::new(
            account,
            Classification::High,
            delta,
            monitor.positive_threshold,
            Utc::now(),
        );
        info!(sink = self.sink.name(), %delta, "Sending test alert");
        let timeout = self.config.alerts.delivery_timeout();
        match tokio::time::timeout(timeout, self.sink.send_alert(alert)).await {
            Ok(result) => result,
            Err(_) => DeliveryResult::Failed(format!("timed out after {}s", timeout.as_secs())),
        }
    }

    async fn notify(&self, level: NoticeLevel, message: String) {
        if !self.config.alerts.send_lifecycle_notices {
            return;
        }
        let timeout = self.config.alerts.delivery_timeout();
        match tokio::time::timeout(timeout, self.sink.send_notice(SystemNotice::new(level, message))).await {
            Ok(DeliveryResult::Delivered) => {}
            Ok(DeliveryResult::Failed(reason)) => warn!(%reason, "System notice not delivered"),
            Err(_) => warn!("System notice timed out"),
        }
    }

    /// Run until ctrl-c or until the cancel token fires.
    pub async fn run(&self) -> AppResult<()> {
        info!(
            positive_threshold = %self.config.monitor.positive_threshold,
            negative_threshold = %self.config.monitor.negative_threshold,
            interval_secs = self.config.monitor.scan_interval_seconds,
            parallel = self.config.monitor.parallel_scan_limit,
            "Starting application"
        );

        if self.config.dashboard.enabled {
            let engine = self.engine.clone();
            let config = self.config.dashboard.clone();
            let cancel = self.cancel.clone();
            tokio::spawn(async move {
                if let Err(e) = run_server(engine, config, async move { cancel.cancelled().await }).await {
                    error!(error = %e, "Dashboard server failed");
                }
            });
        }

        let watcher = match (&self.config_path, self.config.reload_interval()) {
            (Some(path), Some(interval)) => {
                let watcher = ConfigWatcher::new(path.clone(), self.engine.clone(), self.config.clone());
                Some(tokio::spawn(watcher.run(interval, self.cancel.clone())))
            }
            _ => None,
        };

        match self.engine.discover().await {
            Ok(report) => {
                let names: Vec<String> = report.accounts.iter().map(ToString::to_string).collect();
                self.notify(
                    NoticeLevel::Success,
                    format!(
                        "DeltaMon started. Monitoring {} account(s): {}",
                        names.len(),
                        names.join(", ")
                    ),
                )
                .await;
            }
            Err(e) => {
                warn!(error = %e, "Initial discovery failed, the engine will retry");
                self.notify(NoticeLevel::Warning, format!("DeltaMon started, account discovery failed: {e}"))
                    .await;
            }
        }

        let engine_task = {
            let engine = self.engine.clone();
            let cancel = self.cancel.clone();
            tokio::spawn(async move { engine.run(cancel).await })
        };

        tokio::select! {
            _ = tokio::signal::ctrl_c() => info!("Shutdown signal received"),
            _ = self.cancel.cancelled() => info!("Shutdown requested"),
        }
        self.cancel.cancel();

        if let Err(e) = engine_task.await {
            error!(error = %e, "Engine task failed");
        }
        if let Some(watcher) = watcher {
            let _ = watcher.await;
        }

        let stats = self.engine.stats();
        info!(
            cycles = stats.cycles_completed,
            successful_scans = stats.successful_scans,
            failed_scans = stats.failed_scans,
            alerts_sent = stats.alerts_sent,
            "Shutting down"
        );
        self.notify(
            NoticeLevel::Info,
            format!("DeltaMon stopped after {} cycle(s)", stats.cycles_completed),
        )
        .await;
        Ok(())
    }
}
