//! Collaborator traits for screen access.
//!
//! The engine never touches pixels itself. It asks a `RegionLocator` where a
//! UI element is, a `ScreenCapture` for a frame of a region, a `TextExtractor`
//! for the text in that frame, and a `UiDriver` to click through the
//! monitored application. Implementations are injected, which keeps the engine
//! testable with a scripted backend.

use chrono::{DateTime, Utc};
use deltamon_core::{AccountId, Rect};
use serde::{Deserialize, Serialize};
use std::pin::Pin;

use crate::error::ScreenResult;

/// Boxed future for dyn-compatible async trait methods.
pub type BoxFuture<'a, T> = Pin<Box<dyn std::future::Future<Output = T> + Send + 'a>>;

/// A located UI element.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Located {
    pub bounds: Rect,
    /// Template match confidence in `[0, 1]`.
    pub confidence: f64,
}

/// Opaque handle to a captured screen region.
///
/// The pixels stay with the capture backend; extraction refers to the frame
/// by id, so OCR can run after the capture lock is released.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Frame {
    pub id: String,
    pub region: Rect,
    pub captured_at: DateTime<Utc>,
}

/// Text recognised in a frame.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Extracted {
    pub text: String,
    /// Recognition confidence in `[0, 1]`.
    pub confidence: f64,
}

impl Extracted {
    /// Non-empty trimmed lines, in order.
    pub fn lines(&self) -> impl Iterator<Item = &str> {
        self.text.lines().map(str::trim).filter(|l| !l.is_empty())
    }
}

/// Finds UI elements on screen by template.
pub trait RegionLocator: Send + Sync {
    /// `Ok(None)` if the template is not on screen.
    fn locate<'a>(&'a self, template: &'a str) -> BoxFuture<'a, ScreenResult<Option<Located>>>;
}

/// Captures screen regions.
pub trait ScreenCapture: Send + Sync {
    fn capture(&self, region: Rect) -> BoxFuture<'_, ScreenResult<Frame>>;
}

/// OCR over captured frames.
pub trait TextExtractor: Send + Sync {
    fn extract<'a>(&'a self, frame: &'a Frame) -> BoxFuture<'a, ScreenResult<Extracted>>;
}

/// Simulated UI interaction with the monitored application.
pub trait UiDriver: Send + Sync {
    /// Click the dropdown trigger to expand the account list.
    fn open_dropdown(&self, trigger: Rect) -> BoxFuture<'_, ScreenResult<()>>;

    /// Scroll the expanded list by one page.
    fn scroll_list(&self, list: Rect) -> BoxFuture<'_, ScreenResult<()>>;

    /// Collapse the dropdown.
    fn close_dropdown(&self, trigger: Rect) -> BoxFuture<'_, ScreenResult<()>>;

    /// Make `account` the active account in the monitored application.
    fn switch_account<'a>(
        &'a self,
        account: &'a AccountId,
        position: usize,
    ) -> BoxFuture<'a, ScreenResult<()>>;
}
