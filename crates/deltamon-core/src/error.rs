//! Error types for deltamon-core.

use thiserror::Error;

/// Core error types.
#[derive(Debug, Error)]
pub enum CoreError {
    #[error("Delta parse failure: {0}")]
    ParseFailure(String),

    #[error("Invalid account id: {0}")]
    InvalidAccountId(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Decimal error: {0}")]
    Decimal(#[from] rust_decimal::Error),
}

/// Result type alias for core operations.
pub type Result<T> = std::result::Result<T, CoreError>;
