//! Screen access for DeltaMon.
//!
//! Provides:
//! - Collaborator traits: `RegionLocator`, `ScreenCapture`, `TextExtractor`, `UiDriver`
//! - `CaptureGate`: the exclusive lock over the shared screen
//! - `bounded`: deadline wrapper for collaborator calls
//! - `RemoteScreen`: HTTP adapter for an external vision agent
//! - `ScriptedScreen`: deterministic backend for tests and dry runs

pub mod error;
pub mod gate;
pub mod mock;
pub mod remote;
pub mod screen;
pub mod traits;

pub use error::{ScreenError, ScreenResult};
pub use gate::{bounded, CaptureGate, CaptureGuard};
pub use mock::{CellKind, CellResponse, ScriptedScreen, DEFAULT_DELTA_TEMPLATE};
pub use remote::RemoteScreen;
pub use screen::Screen;
pub use traits::{
    BoxFuture, Extracted, Frame, Located, RegionLocator, ScreenCapture, TextExtractor, UiDriver,
};
