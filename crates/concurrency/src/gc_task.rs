//! Background GC pass
//!
//! `GcTask::spawn` runs one GC pass on its own thread. There is no hidden
//! loop: callers decide when to run a pass and with which threshold. A failed
//! pass is logged by `MvccStore::gc` and can simply be spawned again.

use std::sync::Arc;
use std::thread::{self, JoinHandle};

use tracing::debug;

use strata_core::{Error, Key, Result, Timestamp};

use crate::gc::{CancelSignal, GcOutcome};
use crate::store::MvccStore;

/// Handle to a GC pass running in the background
///
/// # Example
///
/// ```ignore
/// let task = GcTask::spawn(Arc::clone(&store), Key::min(), None, threshold);
/// // ... keep serving reads and writes ...
/// let outcome = task.join()?;
/// ```
pub struct GcTask {
    handle: JoinHandle<Result<GcOutcome>>,
    cancel: CancelSignal,
}

impl GcTask {
    /// Start collecting `[start, end)` at `threshold`
    pub fn spawn(store: Arc<MvccStore>, start: Key, end: Option<Key>, threshold: Timestamp) -> Self {
        let cancel = CancelSignal::new();
        let signal = cancel.clone();
        let handle = thread::spawn(move || {
            debug!(
                target: "strata::gc",
                start = %start,
                threshold = %threshold,
                "Background GC pass started"
            );
            store.gc(start.as_bytes(), end.as_deref(), threshold, &signal)
        });
        GcTask { handle, cancel }
    }

    /// Ask the pass to stop before its next batch
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// True once the pass has returned
    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }

    /// Wait for the pass and return its outcome
    pub fn join(self) -> Result<GcOutcome> {
        self.handle
            .join()
            .map_err(|_| Error::InvalidOperation("GC thread panicked".to_string()))?
    }
}
