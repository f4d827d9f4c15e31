//! State of a single synchronization run.

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};
use tracing::error;

use super::error::SyncError;
use crate::pool::FetchPool;
use crate::progress::{ProgressSnapshot, ProgressTracker, RunOutcome};

/// Lifecycle status of a run.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RunStatus {
    /// Created, nothing submitted yet.
    Idle,
    /// Fetching and parsing the top-level manifest.
    Resolving,
    /// At least one file-tree is being expanded.
    Downloading,
    /// Every counted entry reached a terminal state.
    Completed,
    /// The run stopped on a fatal error or a forced shutdown.
    Failed,
}

impl RunStatus {
    /// Returns true for `Completed` and `Failed`.
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }
}

impl fmt::Display for RunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Idle => "idle",
            Self::Resolving => "resolving",
            Self::Downloading => "downloading",
            Self::Completed => "completed",
            Self::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// Final summary handed to the completion callback.
#[derive(Clone, Debug, PartialEq)]
pub struct RunReport {
    /// `Completed` or `Failed`.
    pub status: RunStatus,
    /// Entries that reached a terminal state.
    pub completed: usize,
    /// Entries discovered.
    pub total: usize,
    /// Terminal entries that failed.
    pub failed: usize,
    /// Wall time from start to finalization.
    pub elapsed: Duration,
    /// Reason for a failed run.
    pub error: Option<String>,
}

impl RunReport {
    pub(crate) fn new(outcome: RunOutcome, progress: ProgressSnapshot, elapsed: Duration) -> Self {
        let (status, error) = match outcome {
            RunOutcome::Completed => (RunStatus::Completed, None),
            RunOutcome::Failed(reason) => (RunStatus::Failed, Some(reason)),
            RunOutcome::Aborted => (
                RunStatus::Failed,
                Some("aborted by forced shutdown".to_string()),
            ),
        };

        Self {
            status,
            completed: progress.completed,
            total: progress.total,
            failed: progress.failed,
            elapsed,
            error,
        }
    }

    /// Returns true if the run completed with no failed entries.
    pub fn is_clean(&self) -> bool {
        self.status == RunStatus::Completed && self.failed == 0
    }
}

struct Inner {
    status: RunStatus,
    report: Option<RunReport>,
}

/// Status and final report of a run, observable from any thread.
pub(crate) struct RunState {
    manifest_url: String,
    output_root: PathBuf,
    started: Instant,
    inner: Mutex<Inner>,
    finished: Condvar,
}

impl RunState {
    pub(crate) fn new(manifest_url: String, output_root: PathBuf) -> Self {
        Self {
            manifest_url,
            output_root,
            started: Instant::now(),
            inner: Mutex::new(Inner {
                status: RunStatus::Idle,
                report: None,
            }),
            finished: Condvar::new(),
        }
    }

    pub(crate) fn status(&self) -> RunStatus {
        self.inner.lock().status
    }

    pub(crate) fn set_resolving(&self) {
        let mut inner = self.inner.lock();
        if inner.status == RunStatus::Idle {
            inner.status = RunStatus::Resolving;
        }
    }

    pub(crate) fn set_downloading(&self) {
        let mut inner = self.inner.lock();
        if inner.status == RunStatus::Resolving {
            inner.status = RunStatus::Downloading;
        }
    }

    pub(crate) fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }

    pub(crate) fn finish(&self, report: RunReport) {
        let mut inner = self.inner.lock();
        inner.status = report.status;
        inner.report = Some(report);
        self.finished.notify_all();
    }
}

/// Everything the resolver and expander tasks of one run share.
pub(crate) struct RunContext {
    pub(crate) pool: FetchPool,
    pub(crate) tracker: Arc<ProgressTracker>,
    pub(crate) state: Arc<RunState>,
}

impl RunContext {
    pub(crate) fn output_root(&self) -> &Path {
        &self.state.output_root
    }

    /// Stops the run on a fatal error.
    ///
    /// The tracker is halted before the pool is torn down so that cancelled
    /// tasks cannot move the counters; the gate fires last.
    pub(crate) fn fail(&self, err: SyncError) {
        if self.tracker.halt() {
            error!(
                manifest = %self.state.manifest_url,
                error = %err,
                "Synchronization failed"
            );
            self.pool.shutdown_forced();
        }
        self.tracker.fail(err.to_string());
    }
}

/// Caller-side handle to a run.
///
/// Cloneable; every clone observes the same run.
#[derive(Clone)]
pub struct RunHandle {
    state: Arc<RunState>,
    tracker: Arc<ProgressTracker>,
}

impl RunHandle {
    pub(crate) fn new(state: Arc<RunState>, tracker: Arc<ProgressTracker>) -> Self {
        Self { state, tracker }
    }

    /// Top-level manifest URL of the run.
    pub fn manifest_url(&self) -> &str {
        &self.state.manifest_url
    }

    /// Output root of the run.
    pub fn output_root(&self) -> &Path {
        &self.state.output_root
    }

    /// Current progress counters.
    pub fn progress(&self) -> ProgressSnapshot {
        self.tracker.snapshot()
    }

    /// Current status.
    pub fn status(&self) -> RunStatus {
        self.state.status()
    }

    /// Returns true once the final report is available.
    pub fn is_finished(&self) -> bool {
        self.state.inner.lock().report.is_some()
    }

    /// Blocks until the run is finalized.
    ///
    /// Do not call from a pool task; the finalizer needs the pool to drain.
    pub fn wait(&self) -> RunReport {
        let mut inner = self.state.inner.lock();
        loop {
            if let Some(report) = &inner.report {
                return report.clone();
            }
            self.state.finished.wait(&mut inner);
        }
    }

    /// Like [`wait`](Self::wait), giving up after `timeout`.
    pub fn wait_timeout(&self, timeout: Duration) -> Option<RunReport> {
        let deadline = Instant::now() + timeout;
        let mut inner = self.state.inner.lock();
        loop {
            if let Some(report) = &inner.report {
                return Some(report.clone());
            }
            if self
                .state
                .finished
                .wait_until(&mut inner, deadline)
                .timed_out()
            {
                return inner.report.clone();
            }
        }
    }
}

impl fmt::Debug for RunHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RunHandle")
            .field("manifest_url", &self.state.manifest_url)
            .field("status", &self.status())
            .field("progress", &self.progress())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    fn handle() -> RunHandle {
        let state = Arc::new(RunState::new(
            "https://example.com/index.json".to_string(),
            PathBuf::from("/tmp/out"),
        ));
        RunHandle::new(state, Arc::new(ProgressTracker::new(|_| {})))
    }

    fn report(status: RunStatus) -> RunReport {
        RunReport {
            status,
            completed: 1,
            total: 1,
            failed: 0,
            elapsed: Duration::from_millis(5),
            error: None,
        }
    }

    #[test]
    fn test_status_transitions() {
        let handle = handle();
        assert_eq!(handle.status(), RunStatus::Idle);

        // Downloading only follows Resolving.
        handle.state.set_downloading();
        assert_eq!(handle.status(), RunStatus::Idle);

        handle.state.set_resolving();
        handle.state.set_downloading();
        assert_eq!(handle.status(), RunStatus::Downloading);

        handle.state.finish(report(RunStatus::Completed));
        handle.state.set_resolving();
        assert_eq!(handle.status(), RunStatus::Completed);
        assert!(handle.status().is_terminal());
    }

    #[test]
    fn test_wait_returns_report_from_other_thread() {
        let handle = handle();
        let finisher = handle.clone();

        thread::spawn(move || {
            thread::sleep(Duration::from_millis(20));
            finisher.state.finish(report(RunStatus::Completed));
        });

        assert_eq!(handle.wait().status, RunStatus::Completed);
        assert!(handle.is_finished());
    }

    #[test]
    fn test_wait_timeout_expires() {
        let handle = handle();
        assert!(handle.wait_timeout(Duration::from_millis(10)).is_none());
    }

    #[test]
    fn test_report_from_outcome() {
        let progress = ProgressSnapshot {
            completed: 3,
            total: 4,
            failed: 1,
            ratio: 0.75,
        };

        let report = RunReport::new(RunOutcome::Completed, progress, Duration::ZERO);
        assert_eq!(report.status, RunStatus::Completed);
        assert!(!report.is_clean());

        let report = RunReport::new(
            RunOutcome::Failed("boom".to_string()),
            progress,
            Duration::ZERO,
        );
        assert_eq!(report.status, RunStatus::Failed);
        assert_eq!(report.error.as_deref(), Some("boom"));

        let report = RunReport::new(RunOutcome::Aborted, progress, Duration::ZERO);
        assert_eq!(report.status, RunStatus::Failed);
        assert!(report.error.is_some());
    }
}
