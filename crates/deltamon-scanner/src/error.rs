//! Scanner error types.
//!
//! Per-account failures never show up here; they are folded into
//! `ScanOutcome`. Only discovery and configuration problems surface.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ScanError {
    #[error(transparent)]
    Discovery(#[from] deltamon_registry::RegistryError),

    #[error(transparent)]
    Config(#[from] deltamon_core::CoreError),

    #[error("Invalid scan config: {0}")]
    InvalidConfig(String),
}

pub type ScannerResult<T> = Result<T, ScanError>;
