//! Application configuration.
//!
//! Loaded from a TOML file layered with `DELTAMON_<SECTION>__<FIELD>`
//! environment overrides. Every field has a default, so an empty file (or no
//! file) is a valid configuration.

use crate::error::{AppError, AppResult};
use deltamon_alert::AlertsConfig;
use deltamon_core::MonitorConfig;
use deltamon_dashboard::DashboardConfig;
use deltamon_registry::DiscoveryConfig;
use deltamon_scanner::ScanConfig;
use deltamon_telemetry::DEFAULT_LOG_FILTER;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;

/// Default configuration file, used when it exists and no path is given.
pub const DEFAULT_CONFIG_PATH: &str = "config/default.toml";

/// Prefix of environment overrides.
pub const ENV_PREFIX: &str = "DELTAMON";

/// Vision agent connection (`[vision]`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VisionConfig {
    /// Base URL of the vision agent. Unset runs against the built-in demo screen.
    #[serde(default)]
    pub base_url: Option<String>,
    /// HTTP timeout per agent request.
    #[serde(default = "default_vision_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_vision_timeout_secs() -> u64 {
    10
}

impl Default for VisionConfig {
    fn default() -> Self {
        Self {
            base_url: None,
            timeout_secs: default_vision_timeout_secs(),
        }
    }
}

impl VisionConfig {
    /// Configured base URL, ignoring blanks.
    pub fn base_url(&self) -> Option<&str> {
        self.base_url.as_deref().map(str::trim).filter(|u| !u.is_empty())
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

/// Logging (`[telemetry]`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TelemetryConfig {
    /// `EnvFilter` directive used when `RUST_LOG` is unset.
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

fn default_log_level() -> String {
    DEFAULT_LOG_FILTER.to_string()
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
        }
    }
}

/// Main application configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AppConfig {
    /// How often the config file is checked for changes. 0 disables reload.
    #[serde(default = "default_reload_interval_secs")]
    pub reload_interval_secs: u64,
    /// Hot-reloadable engine options.
    #[serde(default)]
    pub monitor: MonitorConfig,
    #[serde(default)]
    pub scan: ScanConfig,
    #[serde(default)]
    pub discovery: DiscoveryConfig,
    #[serde(default)]
    pub alerts: AlertsConfig,
    #[serde(default)]
    pub vision: VisionConfig,
    #[serde(default)]
    pub dashboard: DashboardConfig,
    #[serde(default)]
    pub telemetry: TelemetryConfig,
}

fn default_reload_interval_secs() -> u64 {
    5
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            reload_interval_secs: default_reload_interval_secs(),
            monitor: MonitorConfig::default(),
            scan: ScanConfig::default(),
            discovery: DiscoveryConfig::default(),
            alerts: AlertsConfig::default(),
            vision: VisionConfig::default(),
            dashboard: DashboardConfig::default(),
            telemetry: TelemetryConfig::default(),
        }
    }
}

impl AppConfig {
    /// Load from `path` (if any) plus the process environment, then validate.
    pub fn load(path: Option<&Path>) -> AppResult<Self> {
        Self::load_with_env(path, None)
    }

    /// Like `load`, with an explicit environment instead of the process one.
    pub fn load_with_env(path: Option<&Path>, env: Option<HashMap<String, String>>) -> AppResult<Self> {
        let mut builder = config::Config::builder();
        if let Some(path) = path {
            builder = builder.add_source(
                config::File::from(path)
                    .format(config::FileFormat::Toml)
                    .required(true),
            );
        }
        let settings = builder
            .add_source(
                config::Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true)
                    .source(env),
            )
            .build()?;

        let config: AppConfig = settings.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    /// Validate every section.
    pub fn validate(&self) -> AppResult<()> {
        let sections = [
            ("monitor", self.monitor.validate()),
            ("scan", self.scan.validate()),
            ("discovery", self.discovery.validate()),
            ("alerts", self.alerts.validate()),
            ("dashboard", self.dashboard.validate()),
        ];
        for (section, result) in sections {
            result.map_err(|e| AppError::Config(format!("[{section}] {e}")))?;
        }
        if self.vision.timeout_secs == 0 {
            return Err(AppError::Config("[vision] timeout_secs must be positive".to_string()));
        }
        Ok(())
    }

    pub fn reload_interval(&self) -> Option<Duration> {
        (self.reload_interval_secs > 0).then(|| Duration::from_secs(self.reload_interval_secs))
    }

    /// Names of sections other than `[monitor]` that differ from `other`.
    ///
    /// Those only take effect after a restart.
    pub fn restart_required_sections(&self, other: &AppConfig) -> Vec<&'static str> {
        let mut changed = Vec::new();
        if self.scan != other.scan {
            changed.push("scan");
        }
        if self.discovery != other.discovery {
            changed.push("discovery");
        }
        if self.alerts != other.alerts {
            changed.push("alerts");
        }
        if self.vision != other.vision {
            changed.push("vision");
        }
        if self.dashboard != other.dashboard {
            changed.push("dashboard");
        }
        if self.telemetry != other.telemetry {
            changed.push("telemetry");
        }
        if self.reload_interval_secs != other.reload_interval_secs {
            changed.push("reload_interval_secs");
        }
        changed
    }

    /// Effective configuration as TOML.
    pub fn to_toml(&self) -> AppResult<String> {
        toml::to_string_pretty(self).map_err(|e| AppError::Config(format!("Failed to render config: {e}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;
    use std::io::Write;

    fn write_config(content: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        file.write_all(content.as_bytes()).unwrap();
        file
    }

    fn env(pairs: &[(&str, &str)]) -> Option<HashMap<String, String>> {
        Some(
            pairs
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
        )
    }

    #[test]
    fn test_defaults_without_file() {
        let config = AppConfig::load_with_env(None, env(&[])).unwrap();
        assert_eq!(config, AppConfig::default());
        assert_eq!(config.reload_interval(), Some(Duration::from_secs(5)));
        assert!(config.vision.base_url().is_none());
    }

    #[test]
    fn test_file_values() {
        let file = write_config(
            r#"
            reload_interval_secs = 2

            [monitor]
            positive_threshold = 0.1
            negative_threshold = -0.07
            parallel_scan_limit = 4

            [vision]
            base_url = "http://127.0.0.1:8765"

            [alerts]
            webhook_url = "https://discord.example/api/webhooks/1/abc"
            "#,
        );
        let config = AppConfig::load_with_env(Some(file.path()), env(&[])).unwrap();
        assert_eq!(config.monitor.positive_threshold, dec!(0.1));
        assert_eq!(config.monitor.negative_threshold, dec!(-0.07));
        assert_eq!(config.monitor.parallel_scan_limit, 4);
        assert_eq!(config.monitor.scan_interval_seconds, 45);
        assert_eq!(config.vision.base_url(), Some("http://127.0.0.1:8765"));
        assert_eq!(config.reload_interval_secs, 2);
        assert!(config.alerts.webhook().is_some());
    }

    #[test]
    fn test_env_overrides_file() {
        let file = write_config("[monitor]\npositive_threshold = 0.1\n");
        let config = AppConfig::load_with_env(
            Some(file.path()),
            env(&[
                ("DELTAMON_MONITOR__POSITIVE_THRESHOLD", "0.12"),
                ("DELTAMON_MONITOR__SCAN_INTERVAL_SECONDS", "30"),
            ]),
        )
        .unwrap();
        assert_eq!(config.monitor.positive_threshold, dec!(0.12));
        assert_eq!(config.monitor.scan_interval_seconds, 30);
    }

    #[test]
    fn test_invalid_section_is_rejected() {
        let file = write_config("[monitor]\npositive_threshold = -0.1\nnegative_threshold = 0.1\n");
        let err = AppConfig::load_with_env(Some(file.path()), env(&[])).unwrap_err();
        assert!(matches!(err, AppError::Config(ref m) if m.starts_with("[monitor]")));
    }

    #[test]
    fn test_missing_file_is_an_error() {
        let missing = Path::new("/nonexistent/deltamon.toml");
        assert!(matches!(
            AppConfig::load_with_env(Some(missing), env(&[])),
            Err(AppError::ConfigLoad(_))
        ));
    }

    #[test]
    fn test_restart_required_sections() {
        let base = AppConfig::default();
        let mut other = base.clone();
        other.monitor.positive_threshold = dec!(0.2);
        assert!(base.restart_required_sections(&other).is_empty());

        other.scan.call_timeout_ms = 1;
        other.dashboard.port = 9090;
        assert_eq!(base.restart_required_sections(&other), vec!["scan", "dashboard"]);
    }

    #[test]
    fn test_to_toml_round_trips_through_load() {
        let mut config = AppConfig::default();
        config.monitor.max_alerts_per_hour = 7;
        let file = write_config(&config.to_toml().unwrap());
        let loaded = AppConfig::load_with_env(Some(file.path()), env(&[])).unwrap();
        assert_eq!(loaded, config);
    }
}
