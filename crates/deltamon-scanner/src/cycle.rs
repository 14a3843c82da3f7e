//! One scan cycle over a registry generation.
//!
//! Every scannable account gets its own task; a semaphore bounds how many
//! run at once. The cycle waits for all tasks or the cycle deadline,
//! whichever comes first. Tasks still running at the deadline are never
//! aborted, so a capture in progress always completes. They are recorded as
//! `timeout` and parked on the runner until `settle_stragglers` waits them
//! out, which the engine does before touching the screen again.
//!
//! Each task owns a claim flag. Whoever claims it first (the task when it
//! finishes, or the coordinator at the deadline) applies the result, so an
//! account is updated exactly once per cycle.

use chrono::{DateTime, Utc};
use deltamon_alert::{classify, crossed_threshold, AlertDispatcher, AlertLimits, DispatchDecision};
use deltamon_core::{AccountId, AlertEvent, MonitorConfig, ScanOutcome, ScanResult};
use deltamon_registry::RegistryGeneration;
use deltamon_telemetry::Metrics;
use parking_lot::Mutex;
use serde::Serialize;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::account_scan::AccountScanner;
use crate::stats::{CycleStats, LastCycle};

/// Summary of one cycle.
#[derive(Debug, Clone, Serialize)]
pub struct CycleReport {
    pub cycle: u64,
    pub generation: u64,
    pub started_at: DateTime<Utc>,
    pub elapsed_ms: u64,
    /// Accounts attempted this cycle.
    pub scanned: usize,
    /// Unreachable accounts left out.
    pub skipped: usize,
    pub ok: usize,
    /// All non-ok outcomes, timeouts included.
    pub failed: usize,
    pub timed_out: usize,
    pub alerts_dispatched: usize,
    pub alerts_suppressed: usize,
    pub deadline_hit: bool,
    /// Per-account results in dropdown order.
    pub results: Vec<ScanResult>,
}

/// Shared state of one running cycle.
struct CycleContext {
    generation: Arc<RegistryGeneration>,
    config: MonitorConfig,
    dispatcher: Arc<AlertDispatcher>,
    stats: Arc<CycleStats>,
    ok: AtomicUsize,
    failed: AtomicUsize,
    timed_out: AtomicUsize,
    alerts_dispatched: AtomicUsize,
    alerts_suppressed: AtomicUsize,
    results: Mutex<Vec<(usize, ScanResult)>>,
}

impl CycleContext {
    /// Fold one result into the account, the statistics and the dispatcher.
    fn apply(&self, position: usize, result: ScanResult) {
        let now = Utc::now();
        let max_failures = self.config.max_consecutive_failures;
        let success = result.delta.filter(|_| result.outcome.is_ok());

        let transition = self.generation.update(&result.account, |account| match success {
            Some(delta) => account.record_success(delta, now),
            None => account.record_failure(result.outcome, max_failures),
        });

        Metrics::scan_completed(result.outcome.as_str(), result.elapsed.as_secs_f64() * 1000.0);
        self.stats.record_scan(result.outcome);

        match result.outcome {
            ScanOutcome::Ok => self.ok.fetch_add(1, Ordering::Relaxed),
            ScanOutcome::Timeout => {
                self.timed_out.fetch_add(1, Ordering::Relaxed);
                self.failed.fetch_add(1, Ordering::Relaxed)
            }
            _ => self.failed.fetch_add(1, Ordering::Relaxed),
        };

        if let Some(transition) = transition {
            if transition.became_unreachable() {
                warn!(
                    account = %result.account,
                    outcome = %result.outcome,
                    failures = max_failures,
                    "Account unreachable, skipping until next discovery"
                );
            } else if transition.recovered() {
                info!(account = %result.account, from = %transition.from, "Account recovered");
            }
        }

        if let Some(delta) = success {
            let (positive, negative) = self.config.thresholds();
            let classification = classify(delta, positive, negative);
            if let Some(threshold) = crossed_threshold(classification, positive, negative) {
                let event = AlertEvent::new(result.account.clone(), classification, delta, threshold, now);
                let submission = self.dispatcher.submit(event, AlertLimits::from(&self.config));
                match submission.decision {
                    DispatchDecision::Dispatched => {
                        self.alerts_dispatched.fetch_add(1, Ordering::Relaxed);
                        self.stats.record_alert(true);
                    }
                    DispatchDecision::Suppressed(_) => {
                        self.alerts_suppressed.fetch_add(1, Ordering::Relaxed);
                        self.stats.record_alert(false);
                    }
                    DispatchDecision::Ignored => {}
                }
            }
        } else {
            debug!(
                account = %result.account,
                outcome = %result.outcome,
                detail = result.detail.as_deref().unwrap_or(""),
                "Scan failed"
            );
        }

        self.results.lock().push((position, result));
    }
}

struct PendingScan {
    account: AccountId,
    position: usize,
    claimed: Arc<AtomicBool>,
}

fn claim(flag: &AtomicBool) -> bool {
    flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
        .is_ok()
}

/// Runs scan cycles.
///
/// The only state kept between cycles is the set of tasks still running
/// after a cycle deadline.
#[derive(Debug, Clone)]
pub struct CycleRunner {
    scanner: Arc<AccountScanner>,
    dispatcher: Arc<AlertDispatcher>,
    stats: Arc<CycleStats>,
    stragglers: Arc<Mutex<Vec<JoinSet<()>>>>,
}

impl CycleRunner {
    pub fn new(scanner: Arc<AccountScanner>, dispatcher: Arc<AlertDispatcher>, stats: Arc<CycleStats>) -> Self {
        Self {
            scanner,
            dispatcher,
            stats,
            stragglers: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn scanner(&self) -> &AccountScanner {
        &self.scanner
    }

    pub fn stats(&self) -> &Arc<CycleStats> {
        &self.stats
    }

    /// Scan tasks left running by earlier cycle deadlines.
    pub fn straggler_count(&self) -> usize {
        self.stragglers.lock().iter().map(JoinSet::len).sum()
    }

    /// Wait up to `limit` for tasks left running by earlier cycles.
    ///
    /// Returns how many were still running when `limit` ran out; those are
    /// detached and may still hold the screen.
    pub async fn settle_stragglers(&self, limit: Duration) -> usize {
        let sets = std::mem::take(&mut *self.stragglers.lock());
        if sets.is_empty() {
            return 0;
        }

        let waiting: usize = sets.iter().map(JoinSet::len).sum();
        debug!(waiting, limit_ms = limit.as_millis() as u64, "Waiting for straggling scan tasks");

        let deadline = Instant::now() + limit;
        let mut still_running = 0;
        for mut set in sets {
            loop {
                match tokio::time::timeout_at(deadline, set.join_next()).await {
                    Ok(Some(Ok(()))) => {}
                    Ok(Some(Err(e))) => error!(error = %e, "Straggling scan task failed"),
                    Ok(None) => break,
                    Err(_) => {
                        still_running += set.len();
                        set.detach_all();
                        break;
                    }
                }
            }
        }

        if still_running > 0 {
            warn!(still_running, "Scan tasks still running after the straggler wait, detaching");
        }
        still_running
    }

    /// Scan every scannable account of `generation` once.
    pub async fn run(&self, generation: Arc<RegistryGeneration>, config: &MonitorConfig, cycle: u64) -> CycleReport {
        let started = Instant::now();
        let started_at = Utc::now();
        let deadline = started + self.scanner.config().cycle_deadline(config.scan_interval());

        let targets = generation.scannable();
        let skipped = generation.len() - targets.len();
        self.stats.record_skipped(skipped);

        debug!(
            cycle,
            generation = generation.generation(),
            accounts = targets.len(),
            skipped,
            parallel = config.parallel_scan_limit,
            "Scan cycle starting"
        );

        let ctx = Arc::new(CycleContext {
            generation: generation.clone(),
            config: config.clone(),
            dispatcher: self.dispatcher.clone(),
            stats: self.stats.clone(),
            ok: AtomicUsize::new(0),
            failed: AtomicUsize::new(0),
            timed_out: AtomicUsize::new(0),
            alerts_dispatched: AtomicUsize::new(0),
            alerts_suppressed: AtomicUsize::new(0),
            results: Mutex::new(Vec::with_capacity(targets.len())),
        });

        let semaphore = Arc::new(Semaphore::new(config.parallel_scan_limit.max(1)));
        let abandon = CancellationToken::new();
        let mut tasks = JoinSet::new();
        let mut pending = Vec::with_capacity(targets.len());

        for (account, position) in targets.iter().cloned() {
            let claimed = Arc::new(AtomicBool::new(false));
            pending.push(PendingScan {
                account: account.clone(),
                position,
                claimed: claimed.clone(),
            });

            let scanner = self.scanner.clone();
            let semaphore = semaphore.clone();
            let abandon = abandon.clone();
            let ctx = ctx.clone();
            tasks.spawn(async move {
                let permit = tokio::select! {
                    permit = semaphore.acquire_owned() => permit.ok(),
                    _ = abandon.cancelled() => None,
                };
                let result = match permit {
                    Some(permit) => {
                        let result = scanner.scan(&account, position, &abandon).await;
                        drop(permit);
                        result
                    }
                    None => ScanResult::failed(
                        account,
                        ScanOutcome::Timeout,
                        started.elapsed(),
                        "cycle abandoned before scan started",
                    ),
                };
                if claim(&claimed) {
                    ctx.apply(position, result);
                }
            });
        }

        let sleep = tokio::time::sleep_until(deadline);
        tokio::pin!(sleep);
        let deadline_hit = loop {
            tokio::select! {
                joined = tasks.join_next() => match joined {
                    Some(Ok(())) => {}
                    Some(Err(e)) => error!(cycle, error = %e, "Scan task failed"),
                    None => break false,
                },
                _ = &mut sleep => break true,
            }
        };

        if deadline_hit {
            abandon.cancel();
            if !tasks.is_empty() {
                self.stragglers.lock().push(tasks);
            }
        }

        // Whatever is still unclaimed was abandoned at the deadline or panicked.
        let mut abandoned = 0usize;
        for scan in pending {
            if claim(&scan.claimed) {
                abandoned += 1;
                let detail = if deadline_hit {
                    "abandoned at cycle deadline"
                } else {
                    "scan task did not complete"
                };
                ctx.apply(
                    scan.position,
                    ScanResult::failed(scan.account, ScanOutcome::Timeout, started.elapsed(), detail),
                );
            }
        }
        if deadline_hit {
            warn!(cycle, abandoned, "Cycle deadline reached, stragglers recorded as timeout");
        }

        let mut results = std::mem::take(&mut *ctx.results.lock());
        results.sort_by_key(|(position, _)| *position);
        let results: Vec<ScanResult> = results.into_iter().map(|(_, r)| r).collect();

        let health = generation.health_counts();
        Metrics::accounts_by_health(health.healthy, health.degraded, health.unreachable);

        let report = CycleReport {
            cycle,
            generation: generation.generation(),
            started_at,
            elapsed_ms: started.elapsed().as_millis() as u64,
            scanned: targets.len(),
            skipped,
            ok: ctx.ok.load(Ordering::Relaxed),
            failed: ctx.failed.load(Ordering::Relaxed),
            timed_out: ctx.timed_out.load(Ordering::Relaxed),
            alerts_dispatched: ctx.alerts_dispatched.load(Ordering::Relaxed),
            alerts_suppressed: ctx.alerts_suppressed.load(Ordering::Relaxed),
            deadline_hit,
            results,
        };

        self.stats.record_cycle(LastCycle {
            cycle,
            finished_at: Utc::now(),
            elapsed_ms: report.elapsed_ms,
            scanned: report.scanned,
            ok: report.ok,
            deadline_hit,
        });

        info!(
            cycle,
            scanned = report.scanned,
            ok = report.ok,
            failed = report.failed,
            timed_out = report.timed_out,
            alerts = report.alerts_dispatched,
            elapsed_ms = report.elapsed_ms,
            "Scan cycle complete"
        );

        report
    }
}
