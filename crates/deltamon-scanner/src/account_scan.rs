//! Scan of a single account.
//!
//! ```text
//! [gate]  switch account -> settle -> locate cell -> capture   [/gate]
//!         extract text -> confidence check -> parse delta
//! ```
//!
//! Only switch + capture run under the capture gate; OCR and parsing run
//! in parallel with other accounts. Every call is bounded by the call timeout,
//! clipped to what is left of the account budget. Cancellation is honoured
//! between steps, never in the middle of the gated section.

use deltamon_core::{AccountId, ScanOutcome, ScanResult};
use deltamon_screen::{bounded, Screen, ScreenError};
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::config::ScanConfig;

/// Per-account scan procedure.
#[derive(Debug)]
pub struct AccountScanner {
    screen: Screen,
    config: ScanConfig,
}

/// Remaining time of one account's budget.
struct Budget {
    started: Instant,
    deadline: Instant,
    call_timeout: Duration,
}

impl Budget {
    fn new(total: Duration, call_timeout: Duration) -> Self {
        let started = Instant::now();
        Self {
            started,
            deadline: started + total,
            call_timeout,
        }
    }

    fn remaining(&self) -> Duration {
        self.deadline.saturating_duration_since(Instant::now())
    }

    fn exhausted(&self) -> bool {
        self.remaining().is_zero()
    }

    /// Timeout for the next call.
    fn next_call(&self) -> Duration {
        self.call_timeout.min(self.remaining())
    }

    fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }
}

impl AccountScanner {
    pub fn new(screen: Screen, config: ScanConfig) -> Self {
        Self { screen, config }
    }

    pub fn config(&self) -> &ScanConfig {
        &self.config
    }

    pub fn screen(&self) -> &Screen {
        &self.screen
    }

    /// Scan one account. Never fails; problems become the result's outcome.
    pub async fn scan(
        &self,
        account: &AccountId,
        position: usize,
        cancel: &CancellationToken,
    ) -> ScanResult {
        let budget = Budget::new(self.config.account_timeout(), self.config.call_timeout());
        let fail = |outcome: ScanOutcome, detail: String| {
            ScanResult::failed(account.clone(), outcome, budget.elapsed(), detail)
        };

        if cancel.is_cancelled() {
            return fail(ScanOutcome::Timeout, "cycle abandoned before start".to_string());
        }

        // ---- gated: switch + locate + capture ----
        let guard = tokio::select! {
            guard = self.screen.gate.acquire(budget.remaining()) => guard,
            _ = cancel.cancelled() => {
                return fail(ScanOutcome::Timeout, "cycle abandoned waiting for screen".to_string());
            }
        };
        let guard = match guard {
            Ok(guard) => guard,
            Err(e) => return fail(ScanOutcome::Timeout, e.to_string()),
        };

        if let Err(e) = bounded(
            "switch_account",
            budget.next_call(),
            self.screen.ui.switch_account(account, position),
        )
        .await
        {
            warn!(%account, error = %e, "Account switch failed, scanning anyway");
        }
        let settle = self.config.switch_settle().min(budget.remaining());
        if !settle.is_zero() {
            tokio::time::sleep(settle).await;
        }

        let located = bounded(
            "locate",
            budget.next_call(),
            self.screen.locator.locate(&self.config.delta_template),
        )
        .await;
        let cell = match located {
            Ok(Some(found)) if found.confidence >= self.config.min_match_confidence => found,
            Ok(Some(found)) => {
                return fail(
                    ScanOutcome::RegionNotFound,
                    format!("cell match confidence {:.2} below floor", found.confidence),
                );
            }
            Ok(None) => {
                return fail(ScanOutcome::RegionNotFound, "delta cell not on screen".to_string());
            }
            Err(e) => return fail(Self::failure_outcome(&e, ScanOutcome::RegionNotFound), e.to_string()),
        };

        let frame = match bounded(
            "capture",
            budget.next_call(),
            self.screen.capture.capture(cell.bounds),
        )
        .await
        {
            Ok(frame) => frame,
            Err(e) => return fail(Self::failure_outcome(&e, ScanOutcome::OcrFailure), e.to_string()),
        };
        drop(guard);
        // ---- end gated ----

        if cancel.is_cancelled() || budget.exhausted() {
            return fail(ScanOutcome::Timeout, "budget exhausted before extraction".to_string());
        }

        let extracted = match bounded(
            "extract",
            budget.next_call(),
            self.screen.extractor.extract(&frame),
        )
        .await
        {
            Ok(extracted) => extracted,
            Err(e) => return fail(Self::failure_outcome(&e, ScanOutcome::OcrFailure), e.to_string()),
        };

        let text = extracted.text.trim().to_string();
        if extracted.confidence < self.config.min_text_confidence {
            return fail(
                ScanOutcome::OcrFailure,
                format!("text confidence {:.2} below floor", extracted.confidence),
            )
            .with_text(text, extracted.confidence);
        }

        match self.config.plausible_range().parse(&text) {
            Ok(delta) => {
                debug!(%account, %delta, raw = %text, elapsed_ms = budget.elapsed().as_millis() as u64, "Delta read");
                ScanResult::ok(
                    account.clone(),
                    text,
                    delta,
                    extracted.confidence,
                    budget.elapsed(),
                )
            }
            Err(e) => fail(ScanOutcome::OcrFailure, e.to_string()).with_text(text, extracted.confidence),
        }
    }

    /// Timeouts map to `Timeout`, everything else to the step's own outcome.
    fn failure_outcome(error: &ScreenError, otherwise: ScanOutcome) -> ScanOutcome {
        if error.is_timeout() {
            ScanOutcome::Timeout
        } else {
            otherwise
        }
    }
}
