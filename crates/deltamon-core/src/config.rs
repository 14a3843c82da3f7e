//! Hot-reloadable engine configuration.

use crate::error::{CoreError, Result};
use parking_lot::RwLock;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;

/// Engine options that can change at runtime without a restart.
///
/// Thresholds are exact decimals; TOML floats such as `0.08` deserialize
/// through their decimal string.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MonitorConfig {
    /// Deltas strictly above this raise a `high` alert.
    #[serde(default = "default_positive_threshold")]
    pub positive_threshold: Decimal,
    /// Deltas strictly below this raise a `low` alert.
    #[serde(default = "default_negative_threshold")]
    pub negative_threshold: Decimal,
    #[serde(default = "default_scan_interval_seconds")]
    pub scan_interval_seconds: u64,
    /// Minimum gap between two alerts of the same classification for one
    /// account. 0 disables the cooldown.
    #[serde(default = "default_alert_cooldown_minutes")]
    pub alert_cooldown_minutes: u64,
    /// Cap on alerts sent in any rolling hour, across all accounts.
    #[serde(default = "default_max_alerts_per_hour")]
    pub max_alerts_per_hour: u32,
    #[serde(default = "default_parallel_scan_limit")]
    pub parallel_scan_limit: usize,
    #[serde(default = "default_max_consecutive_failures")]
    pub max_consecutive_failures: u32,
}

fn default_positive_threshold() -> Decimal {
    Decimal::new(8, 2) // 0.08
}

fn default_negative_threshold() -> Decimal {
    Decimal::new(-5, 2) // -0.05
}

fn default_scan_interval_seconds() -> u64 {
    45
}

fn default_alert_cooldown_minutes() -> u64 {
    5
}

fn default_max_alerts_per_hour() -> u32 {
    20
}

fn default_parallel_scan_limit() -> usize {
    3
}

fn default_max_consecutive_failures() -> u32 {
    3
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            positive_threshold: default_positive_threshold(),
            negative_threshold: default_negative_threshold(),
            scan_interval_seconds: default_scan_interval_seconds(),
            alert_cooldown_minutes: default_alert_cooldown_minutes(),
            max_alerts_per_hour: default_max_alerts_per_hour(),
            parallel_scan_limit: default_parallel_scan_limit(),
            max_consecutive_failures: default_max_consecutive_failures(),
        }
    }
}

impl MonitorConfig {
    /// Validate configuration values.
    pub fn validate(&self) -> std::result::Result<(), String> {
        if self.negative_threshold >= self.positive_threshold {
            return Err(format!(
                "negative_threshold ({}) must be less than positive_threshold ({})",
                self.negative_threshold, self.positive_threshold
            ));
        }
        if self.scan_interval_seconds == 0 {
            return Err("scan_interval_seconds must be at least 1".to_string());
        }
        if self.max_alerts_per_hour == 0 {
            return Err("max_alerts_per_hour must be at least 1".to_string());
        }
        if self.parallel_scan_limit == 0 {
            return Err("parallel_scan_limit must be at least 1".to_string());
        }
        if self.max_consecutive_failures == 0 {
            return Err("max_consecutive_failures must be at least 1".to_string());
        }
        Ok(())
    }

    pub fn scan_interval(&self) -> Duration {
        Duration::from_secs(self.scan_interval_seconds)
    }

    pub fn alert_cooldown(&self) -> Duration {
        Duration::from_secs(self.alert_cooldown_minutes * 60)
    }

    /// `(positive, negative)` thresholds.
    pub fn thresholds(&self) -> (Decimal, Decimal) {
        (self.positive_threshold, self.negative_threshold)
    }
}

// ============================================================================
// ConfigHandle
// ============================================================================

/// Shared, hot-swappable `MonitorConfig`.
///
/// Readers take a snapshot at the start of a cycle; an update becomes
/// effective on the next cycle.
#[derive(Debug, Clone)]
pub struct ConfigHandle {
    inner: Arc<RwLock<MonitorConfig>>,
}

impl ConfigHandle {
    /// Create a handle from a validated config.
    pub fn new(config: MonitorConfig) -> Result<Self> {
        config.validate().map_err(CoreError::InvalidConfig)?;
        Ok(Self {
            inner: Arc::new(RwLock::new(config)),
        })
    }

    /// Snapshot of the active configuration.
    pub fn current(&self) -> MonitorConfig {
        self.inner.read().clone()
    }

    /// Replace the active configuration.
    ///
    /// Invalid configs are rejected and the previous one stays active.
    /// Returns whether anything changed.
    pub fn update(&self, config: MonitorConfig) -> Result<bool> {
        config.validate().map_err(CoreError::InvalidConfig)?;
        let mut guard = self.inner.write();
        if *guard == config {
            return Ok(false);
        }
        *guard = config;
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_default_config_is_valid() {
        let config = MonitorConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.thresholds(), (dec!(0.08), dec!(-0.05)));
        assert_eq!(config.scan_interval(), Duration::from_secs(45));
    }

    #[test]
    fn test_validate_threshold_order() {
        let config = MonitorConfig {
            positive_threshold: dec!(-0.05),
            negative_threshold: dec!(-0.05),
            ..Default::default()
        };
        let err = config.validate().unwrap_err();
        assert!(err.contains("must be less than"));
    }

    #[test]
    fn test_validate_zero_limits() {
        for config in [
            MonitorConfig {
                scan_interval_seconds: 0,
                ..Default::default()
            },
            MonitorConfig {
                max_alerts_per_hour: 0,
                ..Default::default()
            },
            MonitorConfig {
                parallel_scan_limit: 0,
                ..Default::default()
            },
            MonitorConfig {
                max_consecutive_failures: 0,
                ..Default::default()
            },
        ] {
            assert!(config.validate().is_err());
        }
    }

    #[test]
    fn test_toml_floats_are_exact() {
        let config: MonitorConfig = toml::from_str(
            r#"
            positive_threshold = 0.08
            negative_threshold = -0.05
            scan_interval_seconds = 30
            "#,
        )
        .unwrap();
        assert_eq!(config.positive_threshold, dec!(0.08));
        assert_eq!(config.negative_threshold, dec!(-0.05));
        assert_eq!(config.scan_interval_seconds, 30);
        assert_eq!(config.max_alerts_per_hour, 20);
    }

    #[test]
    fn test_handle_rejects_invalid_update() {
        let handle = ConfigHandle::new(MonitorConfig::default()).unwrap();
        let bad = MonitorConfig {
            positive_threshold: dec!(-1),
            ..Default::default()
        };
        assert!(matches!(handle.update(bad), Err(CoreError::InvalidConfig(_))));
        assert_eq!(handle.current(), MonitorConfig::default());
    }

    #[test]
    fn test_handle_update_reports_change() {
        let handle = ConfigHandle::new(MonitorConfig::default()).unwrap();
        assert!(!handle.update(MonitorConfig::default()).unwrap());

        let next = MonitorConfig {
            positive_threshold: dec!(0.1),
            ..Default::default()
        };
        assert!(handle.update(next.clone()).unwrap());
        assert_eq!(handle.current(), next);

        // Clones observe the same config.
        let other = handle.clone();
        assert_eq!(other.current().positive_threshold, dec!(0.1));
    }
}
