//! Account identity and health tracking.

use crate::delta::Delta;
use crate::error::{CoreError, Result};
use crate::scan::ScanOutcome;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Account identifier as read from the account dropdown.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AccountId(String);

impl AccountId {
    /// Create an account id. Surrounding whitespace is trimmed; empty labels
    /// are rejected.
    pub fn new(label: impl Into<String>) -> Result<Self> {
        let label = label.into();
        let trimmed = label.trim();
        if trimmed.is_empty() {
            return Err(CoreError::InvalidAccountId(label));
        }
        Ok(Self(trimmed.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for AccountId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for AccountId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Health derived from recent scan outcomes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    /// Last scan succeeded.
    Healthy,
    /// Recent failures, still scanned every cycle.
    Degraded,
    /// Failure limit reached; skipped until the next discovery.
    Unreachable,
}

impl HealthStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Healthy => "healthy",
            Self::Degraded => "degraded",
            Self::Unreachable => "unreachable",
        }
    }
}

impl fmt::Display for HealthStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Health transition produced by recording a scan outcome.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HealthTransition {
    pub from: HealthStatus,
    pub to: HealthStatus,
}

impl HealthTransition {
    pub fn became_unreachable(&self) -> bool {
        self.to == HealthStatus::Unreachable && self.from != HealthStatus::Unreachable
    }

    pub fn recovered(&self) -> bool {
        self.to == HealthStatus::Healthy && self.from != HealthStatus::Healthy
    }
}

/// A registry entry for one monitored account.
///
/// Created by discovery, mutated only by the scan of that account.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Account {
    pub id: AccountId,
    /// Zero-based position in the dropdown (first-seen order).
    pub position: usize,
    pub health: HealthStatus,
    pub consecutive_failures: u32,
    pub total_failures: u64,
    pub total_successes: u64,
    pub last_success_at: Option<DateTime<Utc>>,
    pub last_delta: Option<Delta>,
    pub last_outcome: Option<ScanOutcome>,
}

impl Account {
    pub fn new(id: AccountId, position: usize) -> Self {
        Self {
            id,
            position,
            health: HealthStatus::Healthy,
            consecutive_failures: 0,
            total_failures: 0,
            total_successes: 0,
            last_success_at: None,
            last_delta: None,
            last_outcome: None,
        }
    }

    /// Unreachable accounts are skipped by scan cycles.
    pub fn is_scannable(&self) -> bool {
        self.health != HealthStatus::Unreachable
    }

    /// Record a successful read: counter reset, health back to healthy.
    pub fn record_success(&mut self, delta: Delta, at: DateTime<Utc>) -> HealthTransition {
        let from = self.health;
        self.health = HealthStatus::Healthy;
        self.consecutive_failures = 0;
        self.total_successes += 1;
        self.last_success_at = Some(at);
        self.last_delta = Some(delta);
        self.last_outcome = Some(ScanOutcome::Ok);
        HealthTransition {
            from,
            to: self.health,
        }
    }

    /// Record a failed scan.
    ///
    /// The account becomes `Unreachable` once `consecutive_failures` reaches
    /// `max_consecutive_failures`, `Degraded` before that. The last delta is
    /// retained.
    pub fn record_failure(
        &mut self,
        outcome: ScanOutcome,
        max_consecutive_failures: u32,
    ) -> HealthTransition {
        let from = self.health;
        self.consecutive_failures = self.consecutive_failures.saturating_add(1);
        self.total_failures += 1;
        self.last_outcome = Some(outcome);
        self.health = if self.consecutive_failures >= max_consecutive_failures.max(1) {
            HealthStatus::Unreachable
        } else {
            HealthStatus::Degraded
        };
        HealthTransition {
            from,
            to: self.health,
        }
    }
}
