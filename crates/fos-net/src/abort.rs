//! Request cancellation
//!
//! Only one abort-linked request is tracked at a time. Starting a new
//! linked request aborts the previous one; unlinked requests get their
//! own signal and are never cancelled by others.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

/// Shared cancellation flag
#[derive(Debug, Clone, Default)]
pub struct AbortSignal(Arc<AtomicBool>);

impl AbortSignal {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn abort(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_aborted(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Tracks the current abort-linked request
#[derive(Debug, Default)]
pub struct RequestTracker {
    active: Option<AbortSignal>,
}

impl RequestTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Signal for a new request; with `abort_previous` the tracked request
    /// is aborted and replaced
    pub fn signal(&mut self, abort_previous: bool) -> AbortSignal {
        if !abort_previous {
            return AbortSignal::new();
        }
        if let Some(previous) = self.active.take() {
            tracing::debug!("aborting previous linked request");
            previous.abort();
        }
        let signal = AbortSignal::new();
        self.active = Some(signal.clone());
        signal
    }

    /// Abort the tracked request, if any
    pub fn abort_active(&mut self) {
        if let Some(active) = self.active.take() {
            active.abort();
        }
    }

    pub fn has_active(&self) -> bool {
        self.active.as_ref().is_some_and(|s| !s.is_aborted())
    }
}
