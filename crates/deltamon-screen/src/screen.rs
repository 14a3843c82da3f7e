//! The injected screen bundle.

use std::sync::Arc;

use crate::gate::CaptureGate;
use crate::traits::{RegionLocator, ScreenCapture, TextExtractor, UiDriver};

/// Collaborators plus the capture gate shared by discovery and scanning.
#[derive(Clone)]
pub struct Screen {
    pub locator: Arc<dyn RegionLocator>,
    pub capture: Arc<dyn ScreenCapture>,
    pub extractor: Arc<dyn TextExtractor>,
    pub ui: Arc<dyn UiDriver>,
    pub gate: CaptureGate,
}

impl Screen {
    pub fn new(
        locator: Arc<dyn RegionLocator>,
        capture: Arc<dyn ScreenCapture>,
        extractor: Arc<dyn TextExtractor>,
        ui: Arc<dyn UiDriver>,
    ) -> Self {
        Self {
            locator,
            capture,
            extractor,
            ui,
            gate: CaptureGate::new(),
        }
    }

    /// Build from a single backend implementing every collaborator.
    pub fn from_backend<B>(backend: Arc<B>) -> Self
    where
        B: RegionLocator + ScreenCapture + TextExtractor + UiDriver + 'static,
    {
        Self::new(backend.clone(), backend.clone(), backend.clone(), backend)
    }
}

impl std::fmt::Debug for Screen {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Screen")
            .field("gate_held", &self.gate.is_held())
            .finish_non_exhaustive()
    }
}
