//! Cooperative cancellation and load progress reporting.
//!
//! Both are collaborators of a running batch. A [`CancellationToken`] is checked between
//! per-module steps and before each instantiation; work already started for a module is
//! never interrupted. A [`LoadProgress`] implementation observes the batch and has no
//! influence on it.

use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};

use crate::{Error, Result};

/// Stage name reported while images are rewritten and loaded.
pub const STAGE_SANDBOXING: &str = "Sandboxing";

/// Stage name reported while entry objects are instantiated.
pub const STAGE_INSTANTIATING: &str = "Instantiating";

/// Shared cancellation flag.
///
/// Clones observe the same flag.
#[derive(Debug, Clone, Default)]
pub struct CancellationToken {
    cancelled: Arc<AtomicBool>,
}

impl CancellationToken {
    /// A token that has not been cancelled.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    /// Returns `true` once [`CancellationToken::cancel`] was called on any clone.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    /// # Errors
    /// Returns [`crate::Error::Cancelled`] if cancellation was requested.
    pub fn check(&self) -> Result<()> {
        if self.is_cancelled() {
            Err(Error::Cancelled)
        } else {
            Ok(())
        }
    }
}

/// Receives progress notifications for a running batch.
///
/// Every method defaults to doing nothing.
pub trait LoadProgress: Send + Sync {
    /// A new stage started. `total` is the number of items the stage will report.
    fn set_load_stage(&self, _stage: &str, _total: Option<usize>) {}

    /// Work on the module at `index` of the current stage started.
    fn set_current_module(&self, _index: usize, _name: &str) {}

    /// Total bytes of images and symbols loaded for `name` so far.
    fn module_bytes_loaded(&self, _name: &str, _bytes: u64) {}
}

/// A [`LoadProgress`] that ignores every notification.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoProgress;

impl LoadProgress for NoProgress {}
