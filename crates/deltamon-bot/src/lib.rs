//! DeltaMon monitoring bot.
//!
//! Wires the engine to its collaborators:
//! - Screen: vision agent over HTTP, or the built-in demo screen on dry runs
//! - Alerts: webhook sink, or log-only
//! - Config: TOML file + `DELTAMON_*` env overrides, `[monitor]` hot-reloaded
//! - Dashboard: optional read-only HTTP view

pub mod app;
pub mod config;
pub mod error;
pub mod reload;

pub use app::Application;
pub use config::{AppConfig, TelemetryConfig, VisionConfig, DEFAULT_CONFIG_PATH, ENV_PREFIX};
pub use error::{AppError, AppResult};
pub use reload::{ConfigWatcher, ReloadOutcome};
