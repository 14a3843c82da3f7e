//! Scan loop and monitoring engine for DeltaMon.
//!
//! - `AccountScanner`: switch, locate, capture, OCR and parse for one account
//! - `CycleRunner`: bounded-parallel cycle with a deadline
//! - `MonitorEngine`: discovery + cycles + snapshot, run until cancelled

pub mod account_scan;
pub mod config;
pub mod cycle;
pub mod engine;
pub mod error;
pub mod stats;

pub use account_scan::AccountScanner;
pub use config::ScanConfig;
pub use cycle::{CycleReport, CycleRunner};
pub use engine::{EngineSnapshot, EngineState, MonitorEngine};
pub use error::{ScanError, ScannerResult};
pub use stats::{CycleStats, CycleStatsSnapshot, LastCycle};
