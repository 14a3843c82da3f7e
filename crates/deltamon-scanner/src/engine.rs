//! Monitoring engine.
//!
//! Owns everything that lives for the duration of a session: the account
//! registry, the active configuration, cycle statistics and the alert
//! dispatcher. Discovery and scan cycles are serialised by one lock, so a
//! cycle never sees a registry being rebuilt underneath it.
//!
//! ```text
//! idle -> discovering -> monitoring <-> discovering
//!                           |
//!                        stopped
//! ```

use chrono::{DateTime, Utc};
use deltamon_alert::{AlertDispatcher, AlertRecord, AlertStats};
use deltamon_core::{Account, ConfigHandle, MonitorConfig};
use deltamon_registry::{
    AccountRegistry, DiscoveryConfig, DiscoveryReport, DiscoveryStateMachine, HealthCounts,
};
use deltamon_screen::Screen;
use deltamon_telemetry::Metrics;
use parking_lot::Mutex;
use rust_decimal::Decimal;
use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::account_scan::AccountScanner;
use crate::config::ScanConfig;
use crate::cycle::{CycleReport, CycleRunner};
use crate::error::{ScanError, ScannerResult};
use crate::stats::{CycleStats, CycleStatsSnapshot};

/// Recent alerts included in a snapshot.
const SNAPSHOT_RECENT_ALERTS: usize = 20;

/// Engine lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum EngineState {
    Idle,
    Discovering,
    Monitoring,
    Stopped,
}

impl EngineState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Discovering => "discovering",
            Self::Monitoring => "monitoring",
            Self::Stopped => "stopped",
        }
    }
}

impl fmt::Display for EngineState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Read-only view of the engine for observers.
#[derive(Debug, Clone, Serialize)]
pub struct EngineSnapshot {
    pub state: EngineState,
    pub generation: u64,
    pub positive_threshold: Decimal,
    pub negative_threshold: Decimal,
    pub scan_interval_seconds: u64,
    pub accounts: Vec<Account>,
    pub health: HealthCounts,
    pub cycle_stats: CycleStatsSnapshot,
    pub alert_stats: AlertStats,
    pub alerts_sent_per_account: BTreeMap<String, u64>,
    pub recent_alerts: Vec<AlertRecord>,
    pub last_discovery: Option<DiscoveryReport>,
    pub last_discovery_error: Option<String>,
    pub taken_at: DateTime<Utc>,
}

#[derive(Debug, Default)]
struct DiscoveryStatus {
    last_report: Option<DiscoveryReport>,
    last_error: Option<String>,
    last_run: Option<Instant>,
}

/// The monitoring engine.
pub struct MonitorEngine {
    config: ConfigHandle,
    scan_config: ScanConfig,
    registry: Arc<AccountRegistry>,
    discovery: DiscoveryStateMachine,
    runner: CycleRunner,
    dispatcher: Arc<AlertDispatcher>,
    stats: Arc<CycleStats>,
    state: Mutex<EngineState>,
    /// Held for the whole of a discovery or a cycle.
    cycle_lock: tokio::sync::Mutex<()>,
    discovery_status: Mutex<DiscoveryStatus>,
    cycles: AtomicU64,
}

impl MonitorEngine {
    pub fn new(
        screen: Screen,
        config: ConfigHandle,
        scan_config: ScanConfig,
        discovery_config: DiscoveryConfig,
        dispatcher: Arc<AlertDispatcher>,
    ) -> ScannerResult<Self> {
        scan_config.validate().map_err(ScanError::InvalidConfig)?;
        discovery_config.validate().map_err(ScanError::InvalidConfig)?;

        let stats = Arc::new(CycleStats::new());
        let scanner = Arc::new(AccountScanner::new(screen.clone(), scan_config.clone()));
        let runner = CycleRunner::new(scanner, dispatcher.clone(), stats.clone());
        Metrics::engine_state_set(EngineState::Idle.as_str());

        Ok(Self {
            config,
            scan_config,
            registry: Arc::new(AccountRegistry::new()),
            discovery: DiscoveryStateMachine::new(screen, discovery_config),
            runner,
            dispatcher,
            stats,
            state: Mutex::new(EngineState::Idle),
            cycle_lock: tokio::sync::Mutex::new(()),
            discovery_status: Mutex::new(DiscoveryStatus::default()),
            cycles: AtomicU64::new(0),
        })
    }

    // ------------------------------------------------------------------
    // Accessors
    // ------------------------------------------------------------------

    pub fn config(&self) -> &ConfigHandle {
        &self.config
    }

    pub fn scan_config(&self) -> &ScanConfig {
        &self.scan_config
    }

    pub fn registry(&self) -> &Arc<AccountRegistry> {
        &self.registry
    }

    pub fn dispatcher(&self) -> &Arc<AlertDispatcher> {
        &self.dispatcher
    }

    pub fn stats(&self) -> CycleStatsSnapshot {
        self.stats.snapshot()
    }

    pub fn state(&self) -> EngineState {
        *self.state.lock()
    }

    fn set_state(&self, next: EngineState) -> EngineState {
        let prev = std::mem::replace(&mut *self.state.lock(), next);
        if prev != next {
            debug!(from = %prev, to = %next, "Engine state");
            Metrics::engine_state_set(next.as_str());
        }
        prev
    }

    /// Apply a new `[monitor]` config. Takes effect on the next cycle.
    ///
    /// Invalid configs are rejected and the active one is kept.
    pub fn update_config(&self, config: MonitorConfig) -> ScannerResult<bool> {
        Ok(self.config.update(config)?)
    }

    /// Scan tasks from earlier cycles still running.
    pub fn straggler_count(&self) -> usize {
        self.runner.straggler_count()
    }

    /// Let tasks left over from a cycle deadline finish before the screen is
    /// used again. Bounded by the account budget, which caps how long any
    /// one of them can still run.
    async fn settle_stragglers(&self) {
        let leftover = self
            .runner
            .settle_stragglers(self.scan_config.account_timeout())
            .await;
        if leftover > 0 {
            warn!(leftover, "Proceeding with scan tasks still running");
        }
    }

    // ------------------------------------------------------------------
    // Discovery
    // ------------------------------------------------------------------

    /// Run account discovery, waiting for any cycle in progress.
    pub async fn discover(&self) -> ScannerResult<DiscoveryReport> {
        let _exclusive = self.cycle_lock.lock().await;
        self.discover_locked().await
    }

    async fn discover_locked(&self) -> ScannerResult<DiscoveryReport> {
        self.settle_stragglers().await;
        let prev = self.set_state(EngineState::Discovering);
        let result = self.discovery.run(&self.registry).await;
        self.set_state(match prev {
            EngineState::Discovering => EngineState::Idle,
            other => other,
        });

        let mut status = self.discovery_status.lock();
        status.last_run = Some(Instant::now());
        match result {
            Ok(report) => {
                Metrics::discovery_run(true, report.accounts.len());
                info!(
                    generation = report.generation,
                    accounts = report.accounts.len(),
                    stable = report.stable,
                    "Accounts discovered"
                );
                status.last_report = Some(report.clone());
                status.last_error = None;
                Ok(report)
            }
            Err(e) => {
                Metrics::discovery_run(false, 0);
                status.last_error = Some(e.to_string());
                Err(e.into())
            }
        }
    }

    /// Why discovery should run before the next cycle, if it should.
    fn rediscovery_due(&self) -> Option<&'static str> {
        let generation = self.registry.snapshot();
        let status = self.discovery_status.lock();

        if status.last_run.is_none() && generation.is_empty() {
            return Some("initial");
        }
        if self.scan_config.auto_rediscover {
            if generation.is_empty() {
                return Some("registry empty");
            }
            if generation.all_unreachable() {
                return Some("all accounts unreachable");
            }
        }
        let interval = self.scan_config.rediscovery_interval()?;
        match status.last_run {
            Some(last) if last.elapsed() < interval => None,
            _ => Some("periodic"),
        }
    }

    // ------------------------------------------------------------------
    // Scanning
    // ------------------------------------------------------------------

    /// Run one scan cycle over the current registry.
    pub async fn run_cycle(&self) -> CycleReport {
        let _exclusive = self.cycle_lock.lock().await;
        self.run_cycle_locked().await
    }

    async fn run_cycle_locked(&self) -> CycleReport {
        self.settle_stragglers().await;
        let config = self.config.current();
        let generation = self.registry.snapshot();
        let cycle = self.cycles.fetch_add(1, Ordering::Relaxed) + 1;

        let report = self.runner.run(generation, &config, cycle).await;

        let interval_ms = config.scan_interval().as_millis() as u64;
        let overran = report.elapsed_ms > interval_ms;
        if overran {
            self.stats.record_overrun();
            warn!(
                cycle,
                elapsed_ms = report.elapsed_ms,
                interval_ms,
                "Scan cycle overran the scan interval"
            );
        }
        Metrics::cycle_completed(report.elapsed_ms as f64, overran);
        report
    }

    /// Discover and scan until `cancel` fires.
    ///
    /// Cycles start every `scan_interval_seconds` measured from the start of
    /// the previous one; the interval is re-read each cycle. Cancellation is
    /// observed between cycles only.
    pub async fn run(&self, cancel: CancellationToken) {
        info!(
            interval_secs = self.config.current().scan_interval_seconds,
            "Monitoring engine started"
        );

        while !cancel.is_cancelled() {
            let started = Instant::now();
            {
                let _exclusive = self.cycle_lock.lock().await;
                if let Some(reason) = self.rediscovery_due() {
                    info!(reason, "Running account discovery");
                    if let Err(e) = self.discover_locked().await {
                        warn!(error = %e, "Discovery failed, retrying next interval");
                    }
                }

                if self.registry.is_empty() {
                    debug!("No accounts registered, skipping cycle");
                } else {
                    self.set_state(EngineState::Monitoring);
                    self.run_cycle_locked().await;
                }
            }

            let next = started + self.config.current().scan_interval();
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = tokio::time::sleep_until(next) => {}
            }
        }

        self.set_state(EngineState::Stopped);
        info!(
            cycles = self.stats.cycles_completed(),
            "Monitoring engine stopped"
        );
    }

    // ------------------------------------------------------------------
    // Observability
    // ------------------------------------------------------------------

    pub fn snapshot(&self) -> EngineSnapshot {
        let config = self.config.current();
        let generation = self.registry.snapshot();
        let status = self.discovery_status.lock();

        EngineSnapshot {
            state: self.state(),
            generation: generation.generation(),
            positive_threshold: config.positive_threshold,
            negative_threshold: config.negative_threshold,
            scan_interval_seconds: config.scan_interval_seconds,
            accounts: generation.accounts(),
            health: generation.health_counts(),
            cycle_stats: self.stats.snapshot(),
            alert_stats: self.dispatcher.stats(),
            alerts_sent_per_account: self
                .dispatcher
                .sent_per_account()
                .into_iter()
                .map(|(id, n)| (id.to_string(), n))
                .collect(),
            recent_alerts: self.dispatcher.recent(SNAPSHOT_RECENT_ALERTS),
            last_discovery: status.last_report.clone(),
            last_discovery_error: status.last_error.clone(),
            taken_at: Utc::now(),
        }
    }
}

impl fmt::Debug for MonitorEngine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MonitorEngine")
            .field("state", &self.state())
            .field("generation", &self.registry.generation())
            .field("cycles", &self.cycles.load(Ordering::Relaxed))
            .finish_non_exhaustive()
    }
}
