//! Run progress and exactly-once completion.
//!
//! Every leaf task of a run funnels into a shared [`ProgressTracker`]. The
//! tracker decides when the run is done and fires its [`CompletionGate`]
//! exactly once, even when many workers observe the final count at the same
//! time.
//!
//! ```text
//! resolver ── expect_trees(n) / tree_expanded()
//! expander ── add_total(n) / tree_expanded()
//! leaf task ─ increment() / record_failure()
//!                    │
//!                    ▼
//!        completed >= total && pending_trees == 0
//!                    │
//!                    ▼
//!        CompletionGate::fire(RunOutcome::Completed)
//! ```
//!
//! Fatal errors and forced shutdowns halt the tracker first; a halted tracker
//! rejects increments so no progress is observed after the run stopped.

mod gate;
mod tracker;

pub use gate::{CompletionGate, RunOutcome};
pub use tracker::{ProgressSnapshot, ProgressTracker};
