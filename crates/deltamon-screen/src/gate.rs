//! Exclusive access to the shared screen.
//!
//! Switching the active account and capturing its delta cell must not
//! interleave with another task doing the same, so both happen under one
//! `CaptureGate` guard. OCR runs after the guard is dropped.

use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{Mutex, OwnedMutexGuard};

use crate::error::{ScreenError, ScreenResult};

/// Mutual exclusion for switch + capture.
#[derive(Debug, Clone, Default)]
pub struct CaptureGate {
    lock: Arc<Mutex<()>>,
    acquisitions: Arc<AtomicU64>,
}

/// Held while the screen is owned by one task.
#[derive(Debug)]
pub struct CaptureGuard {
    _guard: OwnedMutexGuard<()>,
}

impl CaptureGate {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wait for the screen.
    pub async fn lock(&self) -> CaptureGuard {
        let guard = self.lock.clone().lock_owned().await;
        self.acquisitions.fetch_add(1, Ordering::Relaxed);
        CaptureGuard { _guard: guard }
    }

    /// Wait for the screen for at most `wait`.
    pub async fn acquire(&self, wait: Duration) -> ScreenResult<CaptureGuard> {
        match tokio::time::timeout(wait, self.lock()).await {
            Ok(guard) => Ok(guard),
            Err(_) => Err(ScreenError::GateUnavailable { after: wait }),
        }
    }

    pub fn is_held(&self) -> bool {
        self.lock.try_lock().is_err()
    }

    /// Total number of times the gate has been taken.
    pub fn acquisitions(&self) -> u64 {
        self.acquisitions.load(Ordering::Relaxed)
    }
}

/// Run a collaborator call with a deadline.
///
/// Elapsed calls become `ScreenError::Timeout` tagged with `operation`.
pub async fn bounded<T, F>(operation: &'static str, limit: Duration, fut: F) -> ScreenResult<T>
where
    F: Future<Output = ScreenResult<T>>,
{
    match tokio::time::timeout(limit, fut).await {
        Ok(result) => result,
        Err(_) => Err(ScreenError::Timeout {
            operation,
            after: limit,
        }),
    }
}
