//! One-shot completion trigger.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};

use parking_lot::Mutex;

/// How a run ended.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum RunOutcome {
    /// Every counted entry reached a terminal state.
    Completed,
    /// A fatal error stopped the run.
    Failed(String),
    /// The run was stopped by a forced shutdown.
    Aborted,
}

type Finalizer = Box<dyn FnOnce(RunOutcome) + Send + 'static>;

/// Runs its finalizer exactly once, no matter how many threads race to fire
/// it.
pub struct CompletionGate {
    fired: AtomicBool,
    finalizer: Mutex<Option<Finalizer>>,
}

impl CompletionGate {
    /// Creates a gate that hands the first outcome to `finalizer`.
    pub fn new<F>(finalizer: F) -> Self
    where
        F: FnOnce(RunOutcome) + Send + 'static,
    {
        Self {
            fired: AtomicBool::new(false),
            finalizer: Mutex::new(Some(Box::new(finalizer))),
        }
    }

    /// Fires the gate. Returns true for the single caller that won.
    pub fn fire(&self, outcome: RunOutcome) -> bool {
        if self
            .fired
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return false;
        }

        let finalizer = self.finalizer.lock().take();
        if let Some(finalizer) = finalizer {
            finalizer(outcome);
        }
        true
    }

    /// Returns true once the gate has fired.
    pub fn has_fired(&self) -> bool {
        self.fired.load(Ordering::SeqCst)
    }
}

impl fmt::Debug for CompletionGate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CompletionGate")
            .field("fired", &self.has_fired())
            .finish()
    }
}
