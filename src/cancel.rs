//! Cooperative cancellation for long-running builds.
//!
//! Graph/k-means builds check a [`CancellationToken`] between outer loop
//! iterations (k-means passes, graph-build passes, parallel worker chunks).
//! Search is not cancellable — only builds are, per the concurrency model.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

use crate::error::EngineError;

/// A cancellation context carrying an optional deadline.
///
/// Cloning shares the same underlying flag — cancelling one clone cancels
/// every clone, matching the usual "one token per request, fanned out to
/// workers" idiom.
#[derive(Clone, Debug)]
pub struct CancellationToken {
    cancelled: Arc<AtomicBool>,
    deadline: Option<Instant>,
}

impl Default for CancellationToken {
    fn default() -> Self {
        Self::new()
    }
}

impl CancellationToken {
    /// A token that never cancels and has no deadline.
    pub fn new() -> Self {
        Self {
            cancelled: Arc::new(AtomicBool::new(false)),
            deadline: None,
        }
    }

    /// A token that cancels itself once `Instant::now()` passes `deadline`.
    pub fn with_deadline(deadline: Instant) -> Self {
        Self {
            cancelled: Arc::new(AtomicBool::new(false)),
            deadline: Some(deadline),
        }
    }

    /// Explicitly cancel this token (and every clone of it).
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::Relaxed);
    }

    /// True once cancelled or past the deadline.
    pub fn is_cancelled(&self) -> bool {
        if self.cancelled.load(Ordering::Relaxed) {
            return true;
        }
        matches!(self.deadline, Some(d) if Instant::now() >= d)
    }

    /// Convenience for build loops: `token.check()?` between outer iterations.
    pub fn check(&self) -> Result<(), EngineError> {
        if self.is_cancelled() {
            Err(EngineError::Cancelled)
        } else {
            Ok(())
        }
    }
}
