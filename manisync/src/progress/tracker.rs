//! Shared progress counters of a synchronization run.

use std::sync::atomic::{AtomicUsize, Ordering};

use super::gate::{CompletionGate, RunOutcome};

/// High bit of `completed`; once set, no further increment is accepted.
const HALTED: usize = 1 << (usize::BITS - 1);

/// Point-in-time view of a run's progress.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct ProgressSnapshot {
    /// Entries that reached a terminal state.
    pub completed: usize,
    /// Entries discovered so far.
    pub total: usize,
    /// Terminal entries that failed.
    pub failed: usize,
    /// `completed / total`, or 0 when nothing was discovered yet.
    pub ratio: f64,
}

/// Atomic progress counters plus the run's completion gate.
///
/// `total` grows as file-trees are registered; `completed` grows by one per
/// terminal entry. The run finalizes when `completed >= total` and no
/// file-tree is still pending registration.
///
/// A new tracker holds one pending tree for the root document. Whoever
/// discovers more trees reserves them with [`expect_trees`] before releasing
/// its own slot with [`tree_expanded`].
///
/// [`expect_trees`]: ProgressTracker::expect_trees
/// [`tree_expanded`]: ProgressTracker::tree_expanded
#[derive(Debug)]
pub struct ProgressTracker {
    completed: AtomicUsize,
    total: AtomicUsize,
    failed: AtomicUsize,
    pending_trees: AtomicUsize,
    gate: CompletionGate,
}

impl ProgressTracker {
    /// Creates a tracker whose gate hands the run outcome to `on_finish`.
    pub fn new<F>(on_finish: F) -> Self
    where
        F: FnOnce(RunOutcome) + Send + 'static,
    {
        Self {
            completed: AtomicUsize::new(0),
            total: AtomicUsize::new(0),
            failed: AtomicUsize::new(0),
            pending_trees: AtomicUsize::new(1),
            gate: CompletionGate::new(on_finish),
        }
    }

    /// Adds the counted entries of a newly discovered file-tree.
    pub fn add_total(&self, entries: usize) {
        if !self.is_halted() {
            self.total.fetch_add(entries, Ordering::SeqCst);
        }
    }

    /// Marks one entry terminal. Returns false if the run was halted.
    pub fn increment(&self) -> bool {
        let mut current = self.completed.load(Ordering::SeqCst);
        loop {
            if current & HALTED != 0 {
                return false;
            }
            match self.completed.compare_exchange_weak(
                current,
                current + 1,
                Ordering::SeqCst,
                Ordering::SeqCst,
            ) {
                Ok(_) => break,
                Err(actual) => current = actual,
            }
        }

        self.try_finish();
        true
    }

    /// Counts a failed entry. Does not mark it terminal.
    pub fn record_failure(&self) {
        if !self.is_halted() {
            self.failed.fetch_add(1, Ordering::SeqCst);
        }
    }

    /// Reserves `count` file-trees that will be registered later.
    pub fn expect_trees(&self, count: usize) {
        self.pending_trees.fetch_add(count, Ordering::SeqCst);
    }

    /// Releases one pending file-tree, after its entries were added or the
    /// tree was skipped.
    pub fn tree_expanded(&self) {
        let previous = self
            .pending_trees
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1));
        if previous.is_err() {
            tracing::warn!("File-tree released without a reservation");
        }
        self.try_finish();
    }

    /// Stops accepting increments. Returns true for the first caller.
    pub fn halt(&self) -> bool {
        self.completed.fetch_or(HALTED, Ordering::SeqCst) & HALTED == 0
    }

    /// Returns true after [`halt`](Self::halt).
    pub fn is_halted(&self) -> bool {
        self.completed.load(Ordering::SeqCst) & HALTED != 0
    }

    /// Halts and finalizes the run as failed. Returns true if this call
    /// decided the outcome.
    pub fn fail(&self, reason: impl Into<String>) -> bool {
        self.halt();
        self.gate.fire(RunOutcome::Failed(reason.into()))
    }

    /// Halts and finalizes the run as aborted. Returns true if this call
    /// decided the outcome.
    pub fn abort(&self) -> bool {
        self.halt();
        self.gate.fire(RunOutcome::Aborted)
    }

    /// Returns true once the run's outcome has been decided.
    pub fn is_finished(&self) -> bool {
        self.gate.has_fired()
    }

    /// Completed entries.
    pub fn completed(&self) -> usize {
        self.completed.load(Ordering::SeqCst) & !HALTED
    }

    /// Entries discovered so far.
    pub fn total(&self) -> usize {
        self.total.load(Ordering::SeqCst)
    }

    /// Failed entries.
    pub fn failed(&self) -> usize {
        self.failed.load(Ordering::SeqCst)
    }

    /// File-trees reserved but not yet registered.
    pub fn pending_trees(&self) -> usize {
        self.pending_trees.load(Ordering::SeqCst)
    }

    /// `completed / total`, 0 while `total` is 0.
    pub fn ratio(&self) -> f64 {
        ratio(self.completed(), self.total())
    }

    /// Current counters.
    pub fn snapshot(&self) -> ProgressSnapshot {
        let completed = self.completed();
        let total = self.total();
        ProgressSnapshot {
            completed,
            total,
            failed: self.failed(),
            ratio: ratio(completed, total),
        }
    }

    fn try_finish(&self) {
        // No tree can be reserved once the count reached zero, so `total` is
        // final from here on.
        if self.pending_trees.load(Ordering::SeqCst) != 0 {
            return;
        }
        let completed = self.completed.load(Ordering::SeqCst);
        if completed & HALTED == 0 && completed >= self.total.load(Ordering::SeqCst) {
            self.gate.fire(RunOutcome::Completed);
        }
    }
}

fn ratio(completed: usize, total: usize) -> f64 {
    if total == 0 {
        0.0
    } else {
        completed as f64 / total as f64
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;
    use std::sync::Arc;
    use std::thread;

    /// Tracker plus a record of every outcome its gate delivered.
    fn tracker() -> (Arc<ProgressTracker>, Arc<Mutex<Vec<RunOutcome>>>) {
        let outcomes = Arc::new(Mutex::new(Vec::new()));
        let outcomes_clone = Arc::clone(&outcomes);
        let tracker = ProgressTracker::new(move |outcome| outcomes_clone.lock().push(outcome));
        (Arc::new(tracker), outcomes)
    }

    #[test]
    fn test_new_tracker() {
        let (tracker, outcomes) = tracker();

        assert_eq!(tracker.snapshot(), ProgressSnapshot::default());
        assert_eq!(tracker.pending_trees(), 1);
        assert!(!tracker.is_finished());
        assert!(outcomes.lock().is_empty());
    }

    #[test]
    fn test_single_tree_completes() {
        let (tracker, outcomes) = tracker();

        tracker.add_total(3);
        tracker.increment();
        tracker.increment();
        tracker.tree_expanded();
        assert!(!tracker.is_finished());

        tracker.increment();
        assert!(tracker.is_finished());
        assert_eq!(*outcomes.lock(), vec![RunOutcome::Completed]);
        assert_eq!(tracker.ratio(), 1.0);
    }

    #[test]
    fn test_empty_tree_completes_on_release() {
        let (tracker, outcomes) = tracker();

        tracker.add_total(0);
        tracker.tree_expanded();

        assert_eq!(*outcomes.lock(), vec![RunOutcome::Completed]);
        assert_eq!(tracker.ratio(), 0.0);
    }

    #[test]
    fn test_pending_tree_blocks_completion() {
        let (tracker, outcomes) = tracker();

        // Root document announces two components.
        tracker.expect_trees(2);
        tracker.tree_expanded();

        // First component finishes before the second registers.
        tracker.add_total(1);
        tracker.tree_expanded();
        tracker.increment();
        assert!(outcomes.lock().is_empty());

        tracker.add_total(2);
        tracker.tree_expanded();
        tracker.increment();
        tracker.increment();

        assert_eq!(*outcomes.lock(), vec![RunOutcome::Completed]);
        assert_eq!(tracker.snapshot().total, 3);
    }

    #[test]
    fn test_halt_stops_increments() {
        let (tracker, _) = tracker();
        tracker.add_total(5);
        tracker.increment();

        assert!(tracker.halt());
        assert!(!tracker.halt());
        assert!(!tracker.increment());
        tracker.record_failure();

        assert_eq!(tracker.completed(), 1);
        assert_eq!(tracker.failed(), 0);
    }

    #[test]
    fn test_fail_decides_outcome() {
        let (tracker, outcomes) = tracker();

        assert!(tracker.fail("index unavailable"));
        tracker.tree_expanded();
        assert!(!tracker.abort());

        assert_eq!(
            *outcomes.lock(),
            vec![RunOutcome::Failed("index unavailable".to_string())]
        );
    }

    #[test]
    fn test_halted_tracker_never_completes() {
        let (tracker, outcomes) = tracker();
        tracker.add_total(1);
        tracker.halt();
        tracker.tree_expanded();

        assert!(!tracker.increment());
        assert!(outcomes.lock().is_empty());
    }

    #[test]
    fn test_failures_are_secondary() {
        let (tracker, outcomes) = tracker();
        tracker.add_total(2);
        tracker.tree_expanded();

        tracker.record_failure();
        tracker.increment();
        tracker.increment();

        let snapshot = tracker.snapshot();
        assert_eq!(snapshot.failed, 1);
        assert_eq!(snapshot.completed, 2);
        assert_eq!(*outcomes.lock(), vec![RunOutcome::Completed]);
    }

    #[test]
    fn test_concurrent_increments_finalize_once() {
        const THREADS: usize = 8;
        const PER_THREAD: usize = 500;

        let (tracker, outcomes) = tracker();
        tracker.expect_trees(THREADS);
        tracker.tree_expanded();

        let handles: Vec<_> = (0..THREADS)
            .map(|_| {
                let tracker = Arc::clone(&tracker);
                thread::spawn(move || {
                    tracker.add_total(PER_THREAD);
                    tracker.tree_expanded();
                    for _ in 0..PER_THREAD {
                        tracker.increment();
                        assert!(tracker.completed() <= tracker.total());
                    }
                })
            })
            .collect();

        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(tracker.completed(), THREADS * PER_THREAD);
        assert_eq!(tracker.total(), THREADS * PER_THREAD);
        assert_eq!(*outcomes.lock(), vec![RunOutcome::Completed]);
    }

    // Property-based tests using proptest
    mod property_tests {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            #[test]
            fn test_any_tree_layout_finalizes_once(
                sizes in proptest::collection::vec(0usize..20, 0..8)
            ) {
                let (tracker, outcomes) = tracker();
                tracker.expect_trees(sizes.len());
                tracker.tree_expanded();

                for size in &sizes {
                    tracker.add_total(*size);
                    tracker.tree_expanded();
                    for _ in 0..*size {
                        prop_assert!(tracker.increment());
                        prop_assert!(tracker.completed() <= tracker.total());
                    }
                }

                let expected: usize = sizes.iter().sum();
                prop_assert_eq!(tracker.completed(), expected);
                prop_assert_eq!(outcomes.lock().len(), 1);
            }
        }
    }
}
