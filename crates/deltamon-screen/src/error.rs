//! Screen error types.

use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ScreenError {
    #[error("Element not found: {template} after {attempts} attempt(s)")]
    ElementNotFound { template: String, attempts: u32 },

    #[error("{operation} timed out after {}ms", after.as_millis())]
    Timeout {
        operation: &'static str,
        after: Duration,
    },

    #[error("Capture gate unavailable after {}ms", after.as_millis())]
    GateUnavailable { after: Duration },

    #[error("Screen backend error: {0}")]
    Backend(String),

    #[error("HTTP client error: {0}")]
    Http(String),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl ScreenError {
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout { .. } | Self::GateUnavailable { .. })
    }
}

pub type ScreenResult<T> = Result<T, ScreenError>;
