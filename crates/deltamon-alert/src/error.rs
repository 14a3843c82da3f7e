//! Alert error types.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum AlertError {
    #[error("Delivery failure: {0}")]
    DeliveryFailure(String),

    #[error("HTTP client error: {0}")]
    HttpClient(String),

    #[error("Invalid alerts config: {0}")]
    InvalidConfig(String),
}

pub type AlertResult<T> = Result<T, AlertError>;
