//! Account discovery from the on-screen account dropdown.
//!
//! State flow:
//!
//! ```text
//! idle -> opening_dropdown -> enumerating -> closing_dropdown -> complete
//!              |                   |
//!              +-------------------+----> error
//! ```
//!
//! Enumeration captures the expanded list, OCRs it line by line and
//! accumulates unique cleaned lines in first-seen order. It stops when two
//! consecutive captures show the same set of lines, or at the iteration cap.
//! Closing is best effort. Only a successful run touches the registry.
//!
//! The capture gate is held from before the dropdown is opened until it is
//! closed again, so no scan can switch accounts under an open list.

use chrono::{DateTime, Utc};
use deltamon_core::{AccountId, Rect};
use deltamon_screen::{bounded, Screen, ScreenError, ScreenResult};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashSet};
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

use crate::error::{DiscoveryStage, RegistryError, RegistryResult};
use crate::names::clean_lines;
use crate::registry::AccountRegistry;

// ============================================================================
// Configuration
// ============================================================================

/// Discovery configuration (`[discovery]`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DiscoveryConfig {
    /// Template of the account dropdown trigger.
    #[serde(default = "default_dropdown_template")]
    pub dropdown_template: String,
    /// Locate attempts before `ElementNotFound`.
    #[serde(default = "default_locate_attempts")]
    pub locate_attempts: u32,
    /// Template matches below this confidence count as not found.
    #[serde(default = "default_min_match_confidence")]
    pub min_match_confidence: f64,
    /// Base settle delay; the n-th failed locate waits n times this.
    #[serde(default = "default_settle_delay_ms")]
    pub settle_delay_ms: u64,
    /// Wait after clicking the trigger for the list to render.
    #[serde(default = "default_open_settle_ms")]
    pub open_settle_ms: u64,
    #[serde(default = "default_max_iterations")]
    pub max_iterations: u32,
    /// Expanded list region relative to the trigger's top-left corner.
    #[serde(default = "default_list_offset_x")]
    pub list_offset_x: i32,
    #[serde(default = "default_list_offset_y")]
    pub list_offset_y: i32,
    #[serde(default = "default_list_width")]
    pub list_width: u32,
    #[serde(default = "default_list_height")]
    pub list_height: u32,
    /// Scroll the list between captures.
    #[serde(default = "default_scroll")]
    pub scroll: bool,
    #[serde(default = "default_min_line_length")]
    pub min_line_length: usize,
    /// Timeout for each collaborator call.
    #[serde(default = "default_call_timeout_ms")]
    pub call_timeout_ms: u64,
    /// How long to wait for the screen before giving up on this run.
    #[serde(default = "default_screen_wait_ms")]
    pub screen_wait_ms: u64,
}

fn default_dropdown_template() -> String {
    "account_dropdown".to_string()
}

fn default_locate_attempts() -> u32 {
    3
}

fn default_min_match_confidence() -> f64 {
    0.8
}

fn default_settle_delay_ms() -> u64 {
    750
}

fn default_open_settle_ms() -> u64 {
    1500
}

fn default_max_iterations() -> u32 {
    15
}

fn default_list_offset_x() -> i32 {
    -20
}

fn default_list_offset_y() -> i32 {
    25
}

fn default_list_width() -> u32 {
    350
}

fn default_list_height() -> u32 {
    500
}

fn default_scroll() -> bool {
    true
}

fn default_min_line_length() -> usize {
    3
}

fn default_call_timeout_ms() -> u64 {
    5000
}

fn default_screen_wait_ms() -> u64 {
    15000
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self {
            dropdown_template: default_dropdown_template(),
            locate_attempts: default_locate_attempts(),
            min_match_confidence: default_min_match_confidence(),
            settle_delay_ms: default_settle_delay_ms(),
            open_settle_ms: default_open_settle_ms(),
            max_iterations: default_max_iterations(),
            list_offset_x: default_list_offset_x(),
            list_offset_y: default_list_offset_y(),
            list_width: default_list_width(),
            list_height: default_list_height(),
            scroll: default_scroll(),
            min_line_length: default_min_line_length(),
            call_timeout_ms: default_call_timeout_ms(),
            screen_wait_ms: default_screen_wait_ms(),
        }
    }
}

impl DiscoveryConfig {
    /// Validate configuration values.
    pub fn validate(&self) -> Result<(), String> {
        if self.dropdown_template.trim().is_empty() {
            return Err("dropdown_template must not be empty".to_string());
        }
        if self.locate_attempts == 0 {
            return Err("locate_attempts must be at least 1".to_string());
        }
        // Two captures are needed to observe stability.
        if self.max_iterations < 2 {
            return Err(format!(
                "max_iterations ({}) must be at least 2",
                self.max_iterations
            ));
        }
        if !(0.0..=1.0).contains(&self.min_match_confidence) {
            return Err(format!(
                "min_match_confidence ({}) must be within [0, 1]",
                self.min_match_confidence
            ));
        }
        if self.list_width == 0 || self.list_height == 0 {
            return Err("list_width and list_height must be positive".to_string());
        }
        if self.call_timeout_ms == 0 || self.screen_wait_ms == 0 {
            return Err("call_timeout_ms and screen_wait_ms must be positive".to_string());
        }
        Ok(())
    }

    fn call_timeout(&self) -> Duration {
        Duration::from_millis(self.call_timeout_ms)
    }

    fn screen_wait(&self) -> Duration {
        Duration::from_millis(self.screen_wait_ms)
    }

    fn list_region(&self, trigger: Rect) -> Rect {
        trigger.offset_region(
            self.list_offset_x,
            self.list_offset_y,
            self.list_width,
            self.list_height,
        )
    }
}

// ============================================================================
// State machine
// ============================================================================

/// Discovery state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DiscoveryState {
    Idle,
    OpeningDropdown,
    Enumerating,
    ClosingDropdown,
    Complete,
    Error,
}

/// Outcome of a successful discovery.
#[derive(Debug, Clone, Serialize)]
pub struct DiscoveryReport {
    /// Registry generation published by this run.
    pub generation: u64,
    pub accounts: Vec<AccountId>,
    /// Captures taken while enumerating.
    pub iterations: u32,
    /// False if the iteration cap was hit before the list stabilised.
    pub stable: bool,
    pub dropdown_closed: bool,
    pub started_at: DateTime<Utc>,
    pub elapsed_ms: u64,
}

struct Enumeration {
    lines: Vec<String>,
    iterations: u32,
    stable: bool,
}

/// Drives one dropdown discovery at a time.
pub struct DiscoveryStateMachine {
    screen: Screen,
    config: DiscoveryConfig,
    state: Mutex<DiscoveryState>,
    history: Mutex<Vec<DiscoveryState>>,
}

impl DiscoveryStateMachine {
    pub fn new(screen: Screen, config: DiscoveryConfig) -> Self {
        Self {
            screen,
            config,
            state: Mutex::new(DiscoveryState::Idle),
            history: Mutex::new(vec![DiscoveryState::Idle]),
        }
    }

    pub fn config(&self) -> &DiscoveryConfig {
        &self.config
    }

    pub fn state(&self) -> DiscoveryState {
        *self.state.lock()
    }

    /// States visited by the most recent run, starting from `Idle`.
    pub fn history(&self) -> Vec<DiscoveryState> {
        self.history.lock().clone()
    }

    fn transition(&self, next: DiscoveryState) {
        let prev = std::mem::replace(&mut *self.state.lock(), next);
        self.history.lock().push(next);
        debug!(from = ?prev, to = ?next, "Discovery state");
    }

    fn fail(&self, stage: DiscoveryStage, reason: String, partial_lines: Vec<String>) -> RegistryError {
        self.transition(DiscoveryState::Error);
        warn!(
            %stage,
            %reason,
            partial = partial_lines.len(),
            "Account discovery failed"
        );
        RegistryError::DiscoveryFailed {
            stage,
            reason,
            partial_lines,
        }
    }

    /// Enumerate the dropdown and publish a new registry generation.
    ///
    /// On failure the registry is left untouched and the error carries the
    /// lines recognised so far.
    pub async fn run(&self, registry: &AccountRegistry) -> RegistryResult<DiscoveryReport> {
        let started_at = Utc::now();
        let started = Instant::now();
        *self.state.lock() = DiscoveryState::Idle;
        *self.history.lock() = vec![DiscoveryState::Idle];

        info!(template = %self.config.dropdown_template, "Starting account discovery");

        self.transition(DiscoveryState::OpeningDropdown);
        let screen = match self.screen.gate.acquire(self.config.screen_wait()).await {
            Ok(guard) => guard,
            Err(e) => return Err(self.fail(DiscoveryStage::OpeningDropdown, e.to_string(), Vec::new())),
        };
        let trigger = match self.open_dropdown().await {
            Ok(trigger) => trigger,
            Err(e) => return Err(self.fail(DiscoveryStage::OpeningDropdown, e.to_string(), Vec::new())),
        };

        self.transition(DiscoveryState::Enumerating);
        let list = self.config.list_region(trigger);
        let enumeration = self.enumerate(list).await;

        let enumeration = match enumeration {
            Ok(e) if e.lines.is_empty() => {
                self.close_dropdown(trigger).await;
                return Err(self.fail(
                    DiscoveryStage::Enumerating,
                    format!("no account lines recognised in {} capture(s)", e.iterations),
                    Vec::new(),
                ));
            }
            Ok(e) => e,
            Err((e, partial)) => {
                self.close_dropdown(trigger).await;
                return Err(self.fail(DiscoveryStage::Enumerating, e.to_string(), partial));
            }
        };

        self.transition(DiscoveryState::ClosingDropdown);
        let dropdown_closed = self.close_dropdown(trigger).await;
        drop(screen);

        let parsed: Result<Vec<AccountId>, _> = enumeration.lines.iter().map(AccountId::new).collect();
        let ids = match parsed {
            Ok(ids) => ids,
            Err(e) => return Err(self.fail(DiscoveryStage::Enumerating, e.to_string(), enumeration.lines)),
        };
        let generation = match registry.replace(ids.clone()) {
            Ok(generation) => generation,
            Err(e) => {
                self.transition(DiscoveryState::Error);
                return Err(e);
            }
        };

        self.transition(DiscoveryState::Complete);
        if !enumeration.stable {
            warn!(
                iterations = enumeration.iterations,
                accounts = ids.len(),
                "Dropdown did not stabilise before the iteration cap"
            );
        }
        info!(
            generation,
            accounts = ids.len(),
            iterations = enumeration.iterations,
            "Account discovery complete"
        );

        Ok(DiscoveryReport {
            generation,
            accounts: ids,
            iterations: enumeration.iterations,
            stable: enumeration.stable,
            dropdown_closed,
            started_at,
            elapsed_ms: started.elapsed().as_millis() as u64,
        })
    }

    /// Locate the trigger with bounded retries, then click it.
    async fn open_dropdown(&self) -> ScreenResult<Rect> {
        let template = self.config.dropdown_template.as_str();
        let attempts = self.config.locate_attempts;
        let timeout = self.config.call_timeout();

        for attempt in 1..=attempts {
            match bounded("locate", timeout, self.screen.locator.locate(template)).await {
                Ok(Some(found)) if found.confidence >= self.config.min_match_confidence => {
                    debug!(attempt, bounds = %found.bounds, confidence = found.confidence, "Dropdown trigger located");
                    bounded(
                        "open_dropdown",
                        timeout,
                        self.screen.ui.open_dropdown(found.bounds),
                    )
                    .await?;
                    tokio::time::sleep(Duration::from_millis(self.config.open_settle_ms)).await;
                    return Ok(found.bounds);
                }
                Ok(Some(found)) => {
                    debug!(attempt, confidence = found.confidence, "Dropdown trigger match too weak");
                }
                Ok(None) => debug!(attempt, "Dropdown trigger not found"),
                Err(e) => warn!(attempt, error = %e, "Dropdown trigger locate failed"),
            }

            if attempt < attempts {
                let backoff = self.config.settle_delay_ms * u64::from(attempt);
                tokio::time::sleep(Duration::from_millis(backoff)).await;
            }
        }

        Err(ScreenError::ElementNotFound {
            template: template.to_string(),
            attempts,
        })
    }

    /// Polling loop over the expanded list.
    async fn enumerate(&self, list: Rect) -> Result<Enumeration, (ScreenError, Vec<String>)> {
        let timeout = self.config.call_timeout();
        let settle = Duration::from_millis(self.config.settle_delay_ms);

        let mut lines: Vec<String> = Vec::new();
        let mut seen: HashSet<String> = HashSet::new();
        let mut previous: Option<BTreeSet<String>> = None;

        for iteration in 1..=self.config.max_iterations {
            let frame = match bounded("capture", timeout, self.screen.capture.capture(list)).await {
                Ok(frame) => frame,
                Err(e) => return Err((e, lines)),
            };

            let extracted =
                match bounded("extract", timeout, self.screen.extractor.extract(&frame)).await {
                    Ok(extracted) => extracted,
                    Err(e) => return Err((e, lines)),
                };

            let visible = clean_lines(extracted.lines(), self.config.min_line_length);
            let mut added = 0;
            for line in &visible {
                if seen.insert(line.clone()) {
                    lines.push(line.clone());
                    added += 1;
                }
            }
            debug!(
                iteration,
                visible = visible.len(),
                added,
                total = lines.len(),
                "Dropdown capture"
            );

            let current: BTreeSet<String> = visible.into_iter().collect();
            if previous.as_ref() == Some(&current) {
                return Ok(Enumeration {
                    lines,
                    iterations: iteration,
                    stable: true,
                });
            }
            previous = Some(current);

            if iteration < self.config.max_iterations {
                if self.config.scroll {
                    if let Err(e) =
                        bounded("scroll_list", timeout, self.screen.ui.scroll_list(list)).await
                    {
                        return Err((e, lines));
                    }
                }
                tokio::time::sleep(settle).await;
            }
        }

        Ok(Enumeration {
            lines,
            iterations: self.config.max_iterations,
            stable: false,
        })
    }

    async fn close_dropdown(&self, trigger: Rect) -> bool {
        match bounded(
            "close_dropdown",
            self.config.call_timeout(),
            self.screen.ui.close_dropdown(trigger),
        )
        .await
        {
            Ok(()) => true,
            Err(e) => {
                warn!(error = %e, "Failed to close dropdown");
                false
            }
        }
    }
}
