//! Account registry and discovery for DeltaMon.
//!
//! - `AccountRegistry`: generational registry, replaced atomically by discovery
//! - `DiscoveryStateMachine`: dropdown open -> enumerate -> close
//! - `names`: cleaning of OCR'd dropdown lines

pub mod discovery;
pub mod error;
pub mod names;
pub mod registry;

pub use discovery::{DiscoveryConfig, DiscoveryReport, DiscoveryState, DiscoveryStateMachine};
pub use error::{DiscoveryStage, RegistryError, RegistryResult};
pub use names::{clean_line, clean_lines};
pub use registry::{AccountRegistry, HealthCounts, RegistryGeneration};
