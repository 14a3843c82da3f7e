//! deltamon-dashboard - Read-only HTTP view of the monitoring engine.
//!
//! ```text
//! GET /             -> static HTML page polling the snapshot
//! GET /api/snapshot -> EngineSnapshot as JSON
//! GET /api/health   -> liveness summary (503 once stopped)
//! GET /metrics      -> Prometheus text format
//! ```
//!
//! Basic auth protects everything except `/api/health` when a username and
//! password are configured.

mod config;
mod error;
mod server;

pub use config::DashboardConfig;
pub use error::{DashboardError, DashboardResult};
pub use server::{create_router, run_server, serve, AppState, HealthResponse};
