//! Prometheus metrics for DeltaMon.
//!
//! Covers:
//! - Per-account scans by outcome and their duration
//! - Scan cycle duration and overruns
//! - Account health distribution
//! - Alert dispatch, suppression and delivery failures
//! - Discovery runs and configuration reloads
//!
//! # Panics
//!
//! Metric registration uses `unwrap()`. A registration failure means duplicate
//! metric names, which is a startup bug; it can only happen during static
//! initialization.

use once_cell::sync::Lazy;
use prometheus::{
    register_counter_vec, register_gauge_vec, register_histogram, register_histogram_vec,
    register_int_counter, register_int_gauge, CounterVec, Encoder, GaugeVec, Histogram,
    HistogramVec, IntCounter, IntGauge, TextEncoder,
};

use crate::error::{TelemetryError, TelemetryResult};

/// Account scans by outcome.
/// Labels: outcome (ok/ocr_failure/region_not_found/timeout)
pub static SCANS_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "deltamon_scans_total",
        "Total account scans by outcome",
        &["outcome"]
    )
    .unwrap()
});

/// Per-account scan duration in milliseconds.
pub static SCAN_DURATION_MS: Lazy<HistogramVec> = Lazy::new(|| {
    register_histogram_vec!(
        "deltamon_scan_duration_ms",
        "Per-account scan duration in milliseconds",
        &["outcome"],
        vec![50.0, 100.0, 250.0, 500.0, 1000.0, 2000.0, 5000.0, 10000.0, 20000.0]
    )
    .unwrap()
});

/// Scan cycle duration in milliseconds.
pub static CYCLE_DURATION_MS: Lazy<Histogram> = Lazy::new(|| {
    register_histogram!(
        "deltamon_cycle_duration_ms",
        "Scan cycle duration in milliseconds",
        vec![500.0, 1000.0, 2500.0, 5000.0, 10000.0, 20000.0, 30000.0, 45000.0, 60000.0, 120000.0]
    )
    .unwrap()
});

/// Completed scan cycles.
pub static CYCLES_TOTAL: Lazy<IntCounter> = Lazy::new(|| {
    register_int_counter!("deltamon_cycles_total", "Total completed scan cycles").unwrap()
});

/// Cycles that ran longer than the scan interval.
pub static CYCLE_OVERRUNS_TOTAL: Lazy<IntCounter> = Lazy::new(|| {
    register_int_counter!(
        "deltamon_cycle_overruns_total",
        "Scan cycles that overran the scan interval"
    )
    .unwrap()
});

/// Registered accounts by health.
/// Labels: health (healthy/degraded/unreachable)
pub static ACCOUNTS_BY_HEALTH: Lazy<GaugeVec> = Lazy::new(|| {
    register_gauge_vec!(
        "deltamon_accounts",
        "Registered accounts by health status",
        &["health"]
    )
    .unwrap()
});

/// Alerts handed to the delivery sink.
/// Labels: classification (high/low)
pub static ALERTS_DISPATCHED_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "deltamon_alerts_dispatched_total",
        "Total alerts dispatched",
        &["classification"]
    )
    .unwrap()
});

/// Alerts suppressed by rate limiting.
/// Labels: reason (cooldown/hourly_cap)
pub static ALERTS_SUPPRESSED_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "deltamon_alerts_suppressed_total",
        "Total alerts suppressed",
        &["reason"]
    )
    .unwrap()
});

/// Failed alert deliveries.
pub static ALERT_DELIVERY_FAILURES_TOTAL: Lazy<IntCounter> = Lazy::new(|| {
    register_int_counter!(
        "deltamon_alert_delivery_failures_total",
        "Total failed alert deliveries"
    )
    .unwrap()
});

/// Discovery runs by result.
/// Labels: result (complete/failed)
pub static DISCOVERY_RUNS_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "deltamon_discovery_runs_total",
        "Total account discovery runs",
        &["result"]
    )
    .unwrap()
});

/// Accounts in the current registry.
pub static REGISTERED_ACCOUNTS: Lazy<IntGauge> = Lazy::new(|| {
    register_int_gauge!(
        "deltamon_registered_accounts",
        "Accounts in the current registry generation"
    )
    .unwrap()
});

/// Engine state (1 = active).
/// Labels: state (idle/discovering/monitoring/stopped)
pub static ENGINE_STATE: Lazy<GaugeVec> = Lazy::new(|| {
    register_gauge_vec!(
        "deltamon_engine_state",
        "Engine state (1=active, 0=inactive)",
        &["state"]
    )
    .unwrap()
});

/// Configuration reload attempts.
/// Labels: result (applied/unchanged/rejected)
pub static CONFIG_RELOADS_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "deltamon_config_reloads_total",
        "Configuration reload attempts by result",
        &["result"]
    )
    .unwrap()
});

/// Facade over the metric statics.
pub struct Metrics;

impl Metrics {
    /// Record one account scan.
    pub fn scan_completed(outcome: &str, duration_ms: f64) {
        SCANS_TOTAL.with_label_values(&[outcome]).inc();
        SCAN_DURATION_MS
            .with_label_values(&[outcome])
            .observe(duration_ms);
    }

    /// Record one completed cycle.
    pub fn cycle_completed(duration_ms: f64, overran: bool) {
        CYCLES_TOTAL.inc();
        CYCLE_DURATION_MS.observe(duration_ms);
        if overran {
            CYCLE_OVERRUNS_TOTAL.inc();
        }
    }

    /// Set account counts by health.
    pub fn accounts_by_health(healthy: usize, degraded: usize, unreachable: usize) {
        ACCOUNTS_BY_HEALTH
            .with_label_values(&["healthy"])
            .set(healthy as f64);
        ACCOUNTS_BY_HEALTH
            .with_label_values(&["degraded"])
            .set(degraded as f64);
        ACCOUNTS_BY_HEALTH
            .with_label_values(&["unreachable"])
            .set(unreachable as f64);
    }

    pub fn alert_dispatched(classification: &str) {
        ALERTS_DISPATCHED_TOTAL
            .with_label_values(&[classification])
            .inc();
    }

    pub fn alert_suppressed(reason: &str) {
        ALERTS_SUPPRESSED_TOTAL.with_label_values(&[reason]).inc();
    }

    pub fn alert_delivery_failed() {
        ALERT_DELIVERY_FAILURES_TOTAL.inc();
    }

    /// Record a discovery run. `accounts` is only applied on success.
    pub fn discovery_run(success: bool, accounts: usize) {
        let result = if success { "complete" } else { "failed" };
        DISCOVERY_RUNS_TOTAL.with_label_values(&[result]).inc();
        if success {
            REGISTERED_ACCOUNTS.set(accounts as i64);
        }
    }

    /// Set the active engine state; all others are reset to 0.
    pub fn engine_state_set(state: &str) {
        for s in &["idle", "discovering", "monitoring", "stopped"] {
            ENGINE_STATE.with_label_values(&[s]).set(0.0);
        }
        ENGINE_STATE.with_label_values(&[state]).set(1.0);
    }

    pub fn config_reload(result: &str) {
        CONFIG_RELOADS_TOTAL.with_label_values(&[result]).inc();
    }
}

/// Render every registered metric in the Prometheus text format.
pub fn render_metrics() -> TelemetryResult<String> {
    let encoder = TextEncoder::new();
    let families = prometheus::gather();
    let mut buf = Vec::new();
    encoder
        .encode(&families, &mut buf)
        .map_err(|e| TelemetryError::Metrics(e.to_string()))?;
    String::from_utf8(buf).map_err(|e| TelemetryError::Metrics(e.to_string()))
}
