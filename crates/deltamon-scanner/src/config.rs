//! Scan configuration.

use deltamon_core::DeltaRange;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Scan configuration (`[scan]`). Changes require a restart.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScanConfig {
    /// Template of the delta cell in the monitored application.
    #[serde(default = "default_delta_template")]
    pub delta_template: String,
    /// Upper bound for any single collaborator call.
    #[serde(default = "default_call_timeout_ms")]
    pub call_timeout_ms: u64,
    /// Budget for one account scan, including waiting for the capture gate.
    #[serde(default = "default_account_timeout_ms")]
    pub account_timeout_ms: u64,
    /// Wait after switching accounts for the UI to repaint.
    #[serde(default = "default_switch_settle_ms")]
    pub switch_settle_ms: u64,
    /// Cell matches below this confidence count as region not found.
    #[serde(default = "default_min_match_confidence")]
    pub min_match_confidence: f64,
    /// OCR results below this confidence count as OCR failures.
    #[serde(default = "default_min_text_confidence")]
    pub min_text_confidence: f64,
    /// Reads below this are treated as OCR failures.
    #[serde(default = "default_min_plausible_delta")]
    pub min_plausible_delta: Decimal,
    /// Reads above this are treated as OCR failures.
    #[serde(default = "default_max_plausible_delta")]
    pub max_plausible_delta: Decimal,
    /// Cycle deadline as a fraction of the scan interval.
    #[serde(default = "default_cycle_deadline_fraction")]
    pub cycle_deadline_fraction: f64,
    /// Periodic rediscovery; 0 disables it.
    #[serde(default)]
    pub rediscovery_interval_minutes: u64,
    /// Rediscover when the registry is empty or every account is unreachable.
    #[serde(default = "default_auto_rediscover")]
    pub auto_rediscover: bool,
}

fn default_delta_template() -> String {
    "delta_cell".to_string()
}

fn default_call_timeout_ms() -> u64 {
    5000
}

fn default_account_timeout_ms() -> u64 {
    15000
}

fn default_switch_settle_ms() -> u64 {
    300
}

fn default_min_match_confidence() -> f64 {
    0.8
}

fn default_min_text_confidence() -> f64 {
    0.6
}

fn default_min_plausible_delta() -> Decimal {
    DeltaRange::default().min
}

fn default_max_plausible_delta() -> Decimal {
    DeltaRange::default().max
}

fn default_cycle_deadline_fraction() -> f64 {
    0.8
}

fn default_auto_rediscover() -> bool {
    true
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            delta_template: default_delta_template(),
            call_timeout_ms: default_call_timeout_ms(),
            account_timeout_ms: default_account_timeout_ms(),
            switch_settle_ms: default_switch_settle_ms(),
            min_match_confidence: default_min_match_confidence(),
            min_text_confidence: default_min_text_confidence(),
            min_plausible_delta: default_min_plausible_delta(),
            max_plausible_delta: default_max_plausible_delta(),
            cycle_deadline_fraction: default_cycle_deadline_fraction(),
            rediscovery_interval_minutes: 0,
            auto_rediscover: default_auto_rediscover(),
        }
    }
}

impl ScanConfig {
    /// Validate configuration values.
    pub fn validate(&self) -> Result<(), String> {
        if self.delta_template.trim().is_empty() {
            return Err("delta_template must not be empty".to_string());
        }
        if self.call_timeout_ms == 0 || self.account_timeout_ms == 0 {
            return Err("call_timeout_ms and account_timeout_ms must be positive".to_string());
        }
        if !(self.cycle_deadline_fraction > 0.0 && self.cycle_deadline_fraction <= 1.0) {
            return Err(format!(
                "cycle_deadline_fraction ({}) must be within (0, 1]",
                self.cycle_deadline_fraction
            ));
        }
        for (name, value) in [
            ("min_match_confidence", self.min_match_confidence),
            ("min_text_confidence", self.min_text_confidence),
        ] {
            if !(0.0..=1.0).contains(&value) {
                return Err(format!("{name} ({value}) must be within [0, 1]"));
            }
        }
        if self.min_plausible_delta >= self.max_plausible_delta {
            return Err(format!(
                "min_plausible_delta ({}) must be below max_plausible_delta ({})",
                self.min_plausible_delta, self.max_plausible_delta
            ));
        }
        Ok(())
    }

    /// Range a parsed delta must fall in to count as a read.
    pub fn plausible_range(&self) -> DeltaRange {
        DeltaRange {
            min: self.min_plausible_delta,
            max: self.max_plausible_delta,
        }
    }

    pub fn call_timeout(&self) -> Duration {
        Duration::from_millis(self.call_timeout_ms)
    }

    pub fn account_timeout(&self) -> Duration {
        Duration::from_millis(self.account_timeout_ms)
    }

    pub fn switch_settle(&self) -> Duration {
        Duration::from_millis(self.switch_settle_ms)
    }

    /// Deadline for a cycle given the current scan interval.
    pub fn cycle_deadline(&self, scan_interval: Duration) -> Duration {
        scan_interval.mul_f64(self.cycle_deadline_fraction)
    }

    pub fn rediscovery_interval(&self) -> Option<Duration> {
        (self.rediscovery_interval_minutes > 0)
            .then(|| Duration::from_secs(self.rediscovery_interval_minutes * 60))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_valid() {
        let config = ScanConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(
            config.cycle_deadline(Duration::from_secs(45)),
            Duration::from_secs(36)
        );
        assert!(config.rediscovery_interval().is_none());
    }

    #[test]
    fn test_rejects_bad_fraction() {
        for fraction in [0.0, -0.5, 1.5] {
            let config = ScanConfig {
                cycle_deadline_fraction: fraction,
                ..Default::default()
            };
            assert!(config.validate().is_err(), "fraction {fraction}");
        }
    }

    #[test]
    fn test_rejects_confidence_out_of_range() {
        let config = ScanConfig {
            min_text_confidence: 1.2,
            ..Default::default()
        };
        assert!(config.validate().unwrap_err().contains("min_text_confidence"));
    }

    #[test]
    fn test_rejects_inverted_plausible_range() {
        let config = ScanConfig {
            min_plausible_delta: Decimal::ONE,
            max_plausible_delta: Decimal::NEGATIVE_ONE,
            ..Default::default()
        };
        assert!(config.validate().unwrap_err().contains("min_plausible_delta"));
        assert_eq!(ScanConfig::default().plausible_range(), DeltaRange::default());
    }
}
