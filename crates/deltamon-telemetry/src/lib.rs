//! Prometheus metrics and structured logging for DeltaMon.
//!
//! - Prometheus metrics for scans, cycles, alerts and discovery
//! - Structured logging with tracing (JSON in production)

pub mod error;
pub mod logging;
pub mod metrics;

pub use error::{TelemetryError, TelemetryResult};
pub use logging::{init_logging, DEFAULT_LOG_FILTER};
pub use metrics::{render_metrics, Metrics};
