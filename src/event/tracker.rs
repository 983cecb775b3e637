//! In-flight dispatch tracking.
//!
//! Every handler invocation scheduled by the bus holds an [`InFlightGuard`]
//! for its whole lifetime. The guard decrements the shared counter on drop,
//! so a panicking handler is still accounted for.

use std::sync::Arc;
use tokio::sync::watch;

/// Counts outstanding handler invocations and lets callers await drainage.
///
/// Backed by a watch channel so waiting never polls.
#[derive(Debug, Clone)]
pub struct InFlight {
    tx: Arc<watch::Sender<usize>>,
}

impl InFlight {
    /// Create an idle tracker.
    pub fn new() -> Self {
        let (tx, _) = watch::channel(0);
        Self { tx: Arc::new(tx) }
    }

    /// Register one outstanding invocation. Returns a guard that completes it on drop.
    pub fn track(&self) -> InFlightGuard {
        self.tx.send_modify(|count| *count += 1);
        InFlightGuard {
            tx: Arc::clone(&self.tx),
        }
    }

    /// Current number of outstanding invocations.
    pub fn count(&self) -> usize {
        *self.tx.borrow()
    }

    /// Wait until no invocation is outstanding.
    pub async fn wait_idle(&self) {
        let mut rx = self.tx.subscribe();
        // The sender lives in `self`, so the channel cannot close while we wait.
        let _ = rx.wait_for(|count| *count == 0).await;
    }
}

impl Default for InFlight {
    fn default() -> Self {
        Self::new()
    }
}

/// Marks one invocation as outstanding until dropped.
#[derive(Debug)]
pub struct InFlightGuard {
    tx: Arc<watch::Sender<usize>>,
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        self.tx.send_modify(|count| *count = count.saturating_sub(1));
    }
}
