//! Rolling cycle statistics.

use chrono::{DateTime, Utc};
use deltamon_core::ScanOutcome;
use parking_lot::Mutex;
use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};

/// Counters owned by the scan loop. Readers get a `CycleStatsSnapshot`.
#[derive(Debug, Default)]
pub struct CycleStats {
    cycles_completed: AtomicU64,
    successful_scans: AtomicU64,
    failed_scans: AtomicU64,
    ocr_failures: AtomicU64,
    region_not_found: AtomicU64,
    timeouts: AtomicU64,
    skipped_unreachable: AtomicU64,
    alerts_sent: AtomicU64,
    alerts_suppressed: AtomicU64,
    overruns: AtomicU64,
    last_cycle: Mutex<Option<LastCycle>>,
}

#[derive(Debug, Clone, Copy, Serialize)]
pub struct LastCycle {
    pub cycle: u64,
    pub finished_at: DateTime<Utc>,
    pub elapsed_ms: u64,
    pub scanned: usize,
    pub ok: usize,
    pub deadline_hit: bool,
}

/// Read-only view of `CycleStats`.
#[derive(Debug, Clone, Serialize)]
pub struct CycleStatsSnapshot {
    pub cycles_completed: u64,
    pub successful_scans: u64,
    pub failed_scans: u64,
    pub ocr_failures: u64,
    pub region_not_found: u64,
    pub timeouts: u64,
    pub skipped_unreachable: u64,
    pub alerts_sent: u64,
    pub alerts_suppressed: u64,
    pub overruns: u64,
    pub last_cycle: Option<LastCycle>,
}

impl CycleStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_scan(&self, outcome: ScanOutcome) {
        let counter = match outcome {
            ScanOutcome::Ok => {
                self.successful_scans.fetch_add(1, Ordering::Relaxed);
                return;
            }
            ScanOutcome::OcrFailure => &self.ocr_failures,
            ScanOutcome::RegionNotFound => &self.region_not_found,
            ScanOutcome::Timeout => &self.timeouts,
        };
        counter.fetch_add(1, Ordering::Relaxed);
        self.failed_scans.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_skipped(&self, count: usize) {
        self.skipped_unreachable
            .fetch_add(count as u64, Ordering::Relaxed);
    }

    pub fn record_alert(&self, sent: bool) {
        if sent {
            self.alerts_sent.fetch_add(1, Ordering::Relaxed);
        } else {
            self.alerts_suppressed.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub fn record_cycle(&self, last: LastCycle) {
        self.cycles_completed.fetch_add(1, Ordering::Relaxed);
        *self.last_cycle.lock() = Some(last);
    }

    pub fn record_overrun(&self) {
        self.overruns.fetch_add(1, Ordering::Relaxed);
    }

    pub fn cycles_completed(&self) -> u64 {
        self.cycles_completed.load(Ordering::Relaxed)
    }

    pub fn snapshot(&self) -> CycleStatsSnapshot {
        CycleStatsSnapshot {
            cycles_completed: self.cycles_completed.load(Ordering::Relaxed),
            successful_scans: self.successful_scans.load(Ordering::Relaxed),
            failed_scans: self.failed_scans.load(Ordering::Relaxed),
            ocr_failures: self.ocr_failures.load(Ordering::Relaxed),
            region_not_found: self.region_not_found.load(Ordering::Relaxed),
            timeouts: self.timeouts.load(Ordering::Relaxed),
            skipped_unreachable: self.skipped_unreachable.load(Ordering::Relaxed),
            alerts_sent: self.alerts_sent.load(Ordering::Relaxed),
            alerts_suppressed: self.alerts_suppressed.load(Ordering::Relaxed),
            overruns: self.overruns.load(Ordering::Relaxed),
            last_cycle: *self.last_cycle.lock(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scan_counters() {
        let stats = CycleStats::new();
        stats.record_scan(ScanOutcome::Ok);
        stats.record_scan(ScanOutcome::Ok);
        stats.record_scan(ScanOutcome::Timeout);
        stats.record_scan(ScanOutcome::RegionNotFound);
        stats.record_alert(true);
        stats.record_alert(false);

        let snap = stats.snapshot();
        assert_eq!(snap.successful_scans, 2);
        assert_eq!(snap.failed_scans, 2);
        assert_eq!(snap.timeouts, 1);
        assert_eq!(snap.region_not_found, 1);
        assert_eq!(snap.alerts_sent, 1);
        assert_eq!(snap.alerts_suppressed, 1);
        assert!(snap.last_cycle.is_none());
    }

    #[test]
    fn test_record_cycle() {
        let stats = CycleStats::new();
        stats.record_cycle(LastCycle {
            cycle: 1,
            finished_at: Utc::now(),
            elapsed_ms: 1200,
            scanned: 3,
            ok: 3,
            deadline_hit: false,
        });
        assert_eq!(stats.cycles_completed(), 1);
        assert_eq!(stats.snapshot().last_cycle.unwrap().scanned, 3);
    }
}
