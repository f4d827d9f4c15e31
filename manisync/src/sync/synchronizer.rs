//! Caller-facing entry point for synchronization runs.

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use std::thread;

use parking_lot::Mutex;
use tracing::{debug, error, info, warn};

use super::error::{SyncError, SyncResult};
use super::resolver;
use super::run::{RunContext, RunHandle, RunReport, RunState};
use crate::config::PoolConfig;
use crate::pool::{FetchPool, PoolError};
use crate::progress::{ProgressTracker, RunOutcome};

type CompletionCallback = Box<dyn FnOnce(RunReport) + Send + 'static>;

#[derive(Clone)]
struct ActiveRun {
    state: Arc<RunState>,
    tracker: Arc<ProgressTracker>,
}

/// Starts synchronization runs on a shared [`FetchPool`], one at a time.
pub struct Synchronizer {
    pool: FetchPool,
    active: Arc<Mutex<Option<ActiveRun>>>,
    /// Set by [`force_shutdown`](Self::force_shutdown); finalizers then skip
    /// the pool restart.
    terminated: Arc<AtomicBool>,
}

impl Synchronizer {
    /// Creates a synchronizer using `pool` for all work.
    pub fn new(pool: FetchPool) -> Self {
        Self {
            pool,
            active: Arc::new(Mutex::new(None)),
            terminated: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Creates a synchronizer with an HTTP pool built from `config`.
    pub fn from_config(config: &PoolConfig) -> SyncResult<Self> {
        Ok(Self::new(FetchPool::with_http(config.clone())?))
    }

    /// The shared fetch pool.
    pub fn pool(&self) -> &FetchPool {
        &self.pool
    }

    /// Handle to the run in progress, if any.
    pub fn active_run(&self) -> Option<RunHandle> {
        self.active
            .lock()
            .as_ref()
            .map(|run| RunHandle::new(Arc::clone(&run.state), Arc::clone(&run.tracker)))
    }

    /// Starts synchronizing `manifest_url` into `output_root` and returns
    /// immediately.
    ///
    /// `on_complete` fires exactly once, on a helper thread, after the pool
    /// has been restarted for the next run. A new run may be started from
    /// inside the callback.
    pub fn start_run<F>(
        &self,
        manifest_url: impl Into<String>,
        output_root: impl Into<PathBuf>,
        on_complete: F,
    ) -> SyncResult<RunHandle>
    where
        F: FnOnce(RunReport) + Send + 'static,
    {
        let mut active = self.active.lock();
        if active.is_some() {
            return Err(SyncError::RunInProgress);
        }

        let manifest_url = manifest_url.into();
        let state = Arc::new(RunState::new(manifest_url.clone(), output_root.into()));

        let finalizer = Finalizer {
            pool: self.pool.clone(),
            state: Arc::clone(&state),
            tracker: Weak::new(),
            slot: Arc::downgrade(&self.active),
            terminated: Arc::clone(&self.terminated),
            on_complete: Box::new(on_complete),
        };
        let tracker = Arc::new_cyclic(|weak| {
            let finalizer = Finalizer {
                tracker: Weak::clone(weak),
                ..finalizer
            };
            ProgressTracker::new(move |outcome| finalizer.dispatch(outcome))
        });

        let ctx = Arc::new(RunContext {
            pool: self.pool.clone(),
            tracker: Arc::clone(&tracker),
            state: Arc::clone(&state),
        });

        state.set_resolving();
        self.pool.spawn(resolver::resolve(ctx, manifest_url.clone()))?;

        info!(url = %manifest_url, "Synchronization started");
        *active = Some(ActiveRun {
            state: Arc::clone(&state),
            tracker: Arc::clone(&tracker),
        });

        Ok(RunHandle::new(state, tracker))
    }

    /// Stops accepting work; running tasks finish.
    pub fn shutdown(&self) {
        self.pool.shutdown_graceful();
    }

    /// Aborts the active run and cancels all pool work. Meant for process
    /// exit; the pool is not restarted, even by a run that was already
    /// finalizing.
    pub fn force_shutdown(&self) {
        self.terminated.store(true, Ordering::SeqCst);
        let run = self.active.lock().clone();
        if let Some(run) = &run {
            run.tracker.halt();
        }
        self.pool.shutdown_forced();
        if let Some(run) = run {
            run.tracker.abort();
        }
    }
}

impl std::fmt::Debug for Synchronizer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Synchronizer")
            .field("pool", &self.pool)
            .field("active", &self.active.lock().is_some())
            .finish()
    }
}

/// Post-completion work of one run.
struct Finalizer {
    pool: FetchPool,
    state: Arc<RunState>,
    tracker: Weak<ProgressTracker>,
    slot: Weak<Mutex<Option<ActiveRun>>>,
    terminated: Arc<AtomicBool>,
    on_complete: CompletionCallback,
}

impl Finalizer {
    /// Moves finalization off the firing thread, which may be a pool worker
    /// that the restart has to wait for.
    fn dispatch(self, outcome: RunOutcome) {
        let spawned = thread::Builder::new()
            .name("run-finalizer".to_string())
            .spawn(move || self.run(outcome));
        if let Err(e) = spawned {
            error!(error = %e, "Failed to spawn run finalizer");
        }
    }

    fn run(self, outcome: RunOutcome) {
        // Read before the flag: a forced shutdown after this read is caught
        // by the pool, one before it by the flag.
        let epoch = self.pool.forced_epoch();
        let restart = outcome != RunOutcome::Aborted && !self.terminated.load(Ordering::SeqCst);
        if restart {
            match self.pool.restart_after(epoch) {
                Ok(()) => {}
                Err(PoolError::ShutDown) => debug!("Fetch pool left down after forced shutdown"),
                Err(e) => warn!(error = %e, "Fetch pool restart failed"),
            }
        }

        let progress = self
            .tracker
            .upgrade()
            .map(|tracker| tracker.snapshot())
            .unwrap_or_default();
        let report = RunReport::new(outcome, progress, self.state.elapsed());
        info!(
            status = %report.status,
            completed = report.completed,
            total = report.total,
            failed = report.failed,
            elapsed_ms = report.elapsed.as_millis() as u64,
            "Synchronization finished"
        );

        self.state.finish(report.clone());
        if let Some(slot) = self.slot.upgrade() {
            let mut active = slot.lock();
            if active
                .as_ref()
                .is_some_and(|run| Arc::ptr_eq(&run.state, &self.state))
            {
                *active = None;
            }
        }

        (self.on_complete)(report);
    }
}
