//! Core domain types for the DeltaMon monitoring engine.
//!
//! This crate provides the types shared by every other crate:
//! - `AccountId`, `Account`, `HealthStatus`: registry entries and their health
//! - `Delta`: precision-safe delta values and OCR-tolerant parsing
//! - `ScanOutcome`, `ScanResult`: per-account, per-cycle scan results
//! - `Classification`, `AlertEvent`: threshold classifications and alerts
//! - `MonitorConfig`, `ConfigHandle`: hot-reloadable engine configuration

pub mod account;
pub mod alert;
pub mod config;
pub mod delta;
pub mod error;
pub mod geometry;
pub mod scan;

pub use account::{Account, AccountId, HealthStatus};
pub use alert::{AlertEvent, Classification};
pub use config::{ConfigHandle, MonitorConfig};
pub use delta::{parse_delta, Delta, DeltaRange};
pub use error::{CoreError, Result};
pub use geometry::{Point, Rect};
pub use scan::{ScanOutcome, ScanResult};
