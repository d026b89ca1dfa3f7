//! Run control: a shared cancellation token for the dispatch loop.
//!
//! The CLI trips the token on Ctrl-C; the dispatch loop checks it once per
//! iteration and switches to the forceful teardown path.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Error returned when a run is stopped through its `RunControl`.
#[derive(Debug)]
pub struct RunAborted;

impl std::fmt::Display for RunAborted {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "run aborted by user")
    }
}

impl std::error::Error for RunAborted {}

/// Cloneable handle to a run's cancellation flag.
#[derive(Debug, Clone, Default)]
pub struct RunControl {
    cancelled: Arc<AtomicBool>,
}

impl RunControl {
    pub fn new() -> Self {
        Self::default()
    }

    /// Request that the run stop. Idempotent.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cancel_is_shared_between_clones() {
        let control = RunControl::new();
        let other = control.clone();
        assert!(!other.is_cancelled());
        control.cancel();
        assert!(other.is_cancelled());
        control.cancel();
        assert!(control.is_cancelled());
    }
}
