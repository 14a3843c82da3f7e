//! Registry error types.

use thiserror::Error;

/// Discovery stage at which a failure happened.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DiscoveryStage {
    OpeningDropdown,
    Enumerating,
}

impl std::fmt::Display for DiscoveryStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::OpeningDropdown => f.write_str("opening_dropdown"),
            Self::Enumerating => f.write_str("enumerating"),
        }
    }
}

#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("Discovery failed while {stage}: {reason} ({} partial line(s))", partial_lines.len())]
    DiscoveryFailed {
        stage: DiscoveryStage,
        reason: String,
        partial_lines: Vec<String>,
    },

    #[error("Duplicate account: {0}")]
    DuplicateAccount(String),

    #[error("Registry is empty")]
    EmptyRegistry,

    #[error("Invalid discovery config: {0}")]
    InvalidConfig(String),

    #[error(transparent)]
    Core(#[from] deltamon_core::CoreError),
}

impl RegistryError {
    /// Lines recognised before a discovery failure.
    pub fn partial_lines(&self) -> &[String] {
        match self {
            Self::DiscoveryFailed { partial_lines, .. } => partial_lines,
            _ => &[],
        }
    }
}

pub type RegistryResult<T> = Result<T, RegistryError>;
