//! Application error types.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Failed to load configuration: {0}")]
    ConfigLoad(#[from] config::ConfigError),

    #[error("Core error: {0}")]
    Core(#[from] deltamon_core::CoreError),

    #[error("Screen error: {0}")]
    Screen(#[from] deltamon_screen::ScreenError),

    #[error("Registry error: {0}")]
    Registry(#[from] deltamon_registry::RegistryError),

    #[error("Alert error: {0}")]
    Alert(#[from] deltamon_alert::AlertError),

    #[error("Scanner error: {0}")]
    Scan(#[from] deltamon_scanner::ScanError),

    #[error("Dashboard error: {0}")]
    Dashboard(#[from] deltamon_dashboard::DashboardError),

    #[error("Telemetry error: {0}")]
    Telemetry(#[from] deltamon_telemetry::TelemetryError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type AppResult<T> = Result<T, AppError>;
