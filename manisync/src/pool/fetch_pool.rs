//! The fetch pool service and its runtime generations.

use std::future::Future;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use bytes::Bytes;
use parking_lot::{Condvar, Mutex, RwLock};
use tokio::runtime::{Builder, Handle, Runtime};
use tokio::sync::{oneshot, Semaphore};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::error::{FetchError, PoolError};
use super::fetcher::{Fetcher, ReqwestFetcher};
use super::handle::FetchHandle;
use crate::config::PoolConfig;

/// Callback receiving the error of a failed fetch.
pub type ErrorCallback = Box<dyn FnOnce(FetchError) + Send + 'static>;

/// Bounded worker pool for network and filesystem tasks.
///
/// Cloning is cheap; all clones share the same runtime generation, identity
/// and fetcher. After [`restart`](Self::restart) every clone submits to the
/// new generation.
#[derive(Clone)]
pub struct FetchPool {
    shared: Arc<Shared>,
}

struct Shared {
    fetcher: Arc<dyn Fetcher>,
    identity: RwLock<Arc<str>>,
    config: PoolConfig,
    generation: RwLock<Arc<Generation>>,
    /// Bumped by every forced shutdown, under the generation write lock.
    forced: AtomicU64,
    /// Serializes restarts so each installs exactly one generation.
    restarting: Mutex<()>,
}

impl FetchPool {
    /// Starts a pool with the given fetcher.
    pub fn new(config: PoolConfig, fetcher: Arc<dyn Fetcher>) -> Result<Self, PoolError> {
        let generation = Generation::start(&config, 0)?;
        info!(
            workers = config.workers,
            max_concurrent_fetches = config.max_concurrent_fetches,
            "Fetch pool started"
        );

        Ok(Self {
            shared: Arc::new(Shared {
                fetcher,
                identity: RwLock::new(Arc::from(config.identity.as_str())),
                config,
                generation: RwLock::new(Arc::new(generation)),
                forced: AtomicU64::new(0),
                restarting: Mutex::new(()),
            }),
        })
    }

    /// Starts a pool fetching over HTTP with [`ReqwestFetcher`].
    pub fn with_http(config: PoolConfig) -> Result<Self, PoolError> {
        let fetcher = ReqwestFetcher::new(config.request_timeout)?;
        Self::new(config, Arc::new(fetcher))
    }

    /// Pool configuration.
    pub fn config(&self) -> &PoolConfig {
        &self.shared.config
    }

    /// Current outbound identity.
    pub fn identity(&self) -> Arc<str> {
        self.shared.identity.read().clone()
    }

    /// Replaces the outbound identity for all subsequent requests.
    pub fn set_identity(&self, identity: impl Into<String>) {
        let identity: String = identity.into();
        *self.shared.identity.write() = Arc::from(identity.as_str());
    }

    /// Returns true while the pool accepts work.
    pub fn is_running(&self) -> bool {
        self.generation().is_accepting()
    }

    /// Number of tasks submitted to the current generation that have not
    /// finished yet.
    pub fn in_flight(&self) -> usize {
        self.generation().in_flight.count()
    }

    /// Runs `task` on the pool.
    pub fn spawn<F>(&self, task: F) -> Result<(), PoolError>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        self.generation().spawn(task)
    }

    /// Fetches `url` on the pool.
    pub fn fetch(&self, url: impl Into<String>) -> Result<FetchHandle, PoolError> {
        let url = url.into();
        let (tx, rx) = oneshot::channel();
        let request = self.request(url.clone());

        self.spawn(async move {
            let _ = tx.send(request.await);
        })?;

        Ok(FetchHandle::new(url, rx))
    }

    /// Fetches `url` and invokes exactly one callback on a pool thread.
    ///
    /// Without `on_error`, a failure calls `on_success` with an empty payload.
    pub fn submit_callback<S>(
        &self,
        url: impl Into<String>,
        on_success: S,
        on_error: Option<ErrorCallback>,
    ) -> Result<(), PoolError>
    where
        S: FnOnce(Bytes) + Send + 'static,
    {
        let request = self.request(url.into());

        self.spawn(async move {
            match request.await {
                Ok(body) => on_success(body),
                Err(e) => match on_error {
                    Some(on_error) => on_error(e),
                    None => on_success(Bytes::new()),
                },
            }
        })
    }

    /// Fetches `url`; the handle resolves to the body, or to an empty payload
    /// on failure (after `on_error`, if supplied, ran on the pool thread).
    pub fn submit_future(
        &self,
        url: impl Into<String>,
        on_error: Option<ErrorCallback>,
    ) -> Result<FetchHandle, PoolError> {
        let url = url.into();
        let (tx, rx) = oneshot::channel();
        let request = self.request(url.clone());

        self.spawn(async move {
            let body = match request.await {
                Ok(body) => body,
                Err(e) => {
                    if let Some(on_error) = on_error {
                        on_error(e);
                    }
                    Bytes::new()
                }
            };
            let _ = tx.send(Ok(body));
        })?;

        Ok(FetchHandle::new(url, rx))
    }

    /// Stops accepting new work; in-flight tasks run to completion.
    pub fn shutdown_graceful(&self) {
        let generation = self.generation();
        if generation.close() {
            info!(
                in_flight = generation.in_flight.count(),
                "Fetch pool shutting down"
            );
        }
    }

    /// Stops accepting new work and abandons in-flight tasks at their next
    /// suspension point. Files being written may be left truncated.
    ///
    /// A restart already draining when this lands does not bring the pool
    /// back.
    pub fn shutdown_forced(&self) {
        let generation = {
            let current = self.shared.generation.write();
            self.shared.forced.fetch_add(1, Ordering::SeqCst);
            Arc::clone(&current)
        };
        generation.close();
        if generation.terminate() {
            warn!("Fetch pool forcibly shut down");
        }
    }

    /// Drains the current generation (up to the configured timeout) and
    /// installs a fresh one.
    ///
    /// Safe to call from any thread. From inside an async runtime (a pool
    /// task, for instance) the drain would wait on the caller itself, so the
    /// restart is handed to a helper thread and this returns immediately.
    ///
    /// Returns [`PoolError::ShutDown`] if a forced shutdown lands before the
    /// new generation is installed; the pool then stays down.
    pub fn restart(&self) -> Result<(), PoolError> {
        self.restart_after(self.forced_epoch())
    }

    /// Number of forced shutdowns so far.
    pub(crate) fn forced_epoch(&self) -> u64 {
        self.shared.forced.load(Ordering::SeqCst)
    }

    /// Restarts unless a forced shutdown happened after `epoch` was read.
    pub(crate) fn restart_after(&self, epoch: u64) -> Result<(), PoolError> {
        if Handle::try_current().is_ok() {
            let pool = self.clone();
            thread::Builder::new()
                .name("fetch-pool-restart".to_string())
                .spawn(move || {
                    match pool.restart_blocking(epoch) {
                        Ok(()) | Err(PoolError::ShutDown) => {}
                        Err(e) => tracing::error!(error = %e, "Fetch pool restart failed"),
                    }
                })
                .map_err(|e| PoolError::Thread(e.to_string()))?;
            return Ok(());
        }

        self.restart_blocking(epoch)
    }

    fn restart_blocking(&self, epoch: u64) -> Result<(), PoolError> {
        let _restarting = self.shared.restarting.lock();
        let old = self.generation();
        old.close();

        let timeout = self.shared.config.drain_timeout;
        if !old.in_flight.wait_idle(timeout) {
            warn!(
                remaining = old.in_flight.count(),
                timeout_secs = timeout.as_secs(),
                "Fetch pool did not drain before restart"
            );
        }

        let fresh = Arc::new(Generation::start(&self.shared.config, old.id + 1)?);
        {
            let mut current = self.shared.generation.write();
            if self.shared.forced.load(Ordering::SeqCst) != epoch {
                info!("Forced shutdown during restart, fetch pool stays down");
                fresh.terminate();
                return Err(PoolError::ShutDown);
            }
            self.shared.fetcher.reset();
            *current = Arc::clone(&fresh);
        }
        old.terminate();

        debug!(generation = fresh.id, "Fetch pool restarted");
        Ok(())
    }

    fn generation(&self) -> Arc<Generation> {
        self.shared.generation.read().clone()
    }

    /// Future performing one fetch under the generation's fetch limit.
    fn request(&self, url: String) -> impl Future<Output = Result<Bytes, FetchError>> + Send {
        let fetcher = Arc::clone(&self.shared.fetcher);
        let identity = self.identity();
        let permits = Arc::clone(&self.generation().fetch_permits);

        async move {
            let Ok(_permit) = permits.acquire_owned().await else {
                return Err(FetchError::Cancelled { url });
            };
            debug!(url = %url, "Fetching");
            fetcher.fetch(&url, &identity).await
        }
    }
}

impl std::fmt::Debug for FetchPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FetchPool")
            .field("config", &self.shared.config)
            .field("running", &self.is_running())
            .field("in_flight", &self.in_flight())
            .finish()
    }
}

/// One runtime lifetime of the pool, between two restarts.
struct Generation {
    id: u64,
    runtime: Mutex<Option<Runtime>>,
    handle: Handle,
    accepting: AtomicBool,
    cancel: CancellationToken,
    in_flight: Arc<InFlight>,
    fetch_permits: Arc<Semaphore>,
}

impl Generation {
    fn start(config: &PoolConfig, id: u64) -> Result<Self, PoolError> {
        let runtime = Builder::new_multi_thread()
            .worker_threads(config.workers.max(1))
            .thread_name("fetch-pool")
            .enable_all()
            .build()
            .map_err(|e| PoolError::Runtime(e.to_string()))?;

        Ok(Self {
            id,
            handle: runtime.handle().clone(),
            runtime: Mutex::new(Some(runtime)),
            accepting: AtomicBool::new(true),
            cancel: CancellationToken::new(),
            in_flight: Arc::new(InFlight::default()),
            fetch_permits: Arc::new(Semaphore::new(config.max_concurrent_fetches.max(1))),
        })
    }

    fn is_accepting(&self) -> bool {
        self.accepting.load(Ordering::SeqCst)
    }

    fn spawn<F>(&self, task: F) -> Result<(), PoolError>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        // Registered before the check so a concurrent drain cannot miss it.
        let guard = InFlight::enter(&self.in_flight);
        if !self.is_accepting() {
            return Err(PoolError::ShutDown);
        }

        let cancel = self.cancel.clone();
        self.handle.spawn(async move {
            let _guard = guard;
            tokio::select! {
                biased;
                _ = cancel.cancelled() => {}
                _ = task => {}
            }
        });
        Ok(())
    }

    /// Returns true if this call stopped the generation from accepting work.
    fn close(&self) -> bool {
        self.accepting.swap(false, Ordering::SeqCst)
    }

    /// Cancels outstanding tasks and shuts the runtime down without blocking.
    /// Returns true on the first call.
    fn terminate(&self) -> bool {
        self.cancel.cancel();
        self.fetch_permits.close();
        match self.runtime.lock().take() {
            Some(runtime) => {
                runtime.shutdown_background();
                true
            }
            None => false,
        }
    }
}

impl Drop for Generation {
    fn drop(&mut self) {
        if let Some(runtime) = self.runtime.get_mut().take() {
            runtime.shutdown_background();
        }
    }
}

/// Count of unfinished tasks with a wait-for-idle primitive.
#[derive(Default)]
struct InFlight {
    count: Mutex<usize>,
    idle: Condvar,
}

impl InFlight {
    fn enter(this: &Arc<Self>) -> InFlightGuard {
        *this.count.lock() += 1;
        InFlightGuard(Arc::clone(this))
    }

    fn count(&self) -> usize {
        *self.count.lock()
    }

    /// Waits until no task is in flight. Returns false on timeout.
    fn wait_idle(&self, timeout: Duration) -> bool {
        let mut count = self.count.lock();
        !self
            .idle
            .wait_while_for(&mut count, |count| *count > 0, timeout)
            .timed_out()
            || *count == 0
    }
}

struct InFlightGuard(Arc<InFlight>);

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        let mut count = self.0.count.lock();
        *count -= 1;
        if *count == 0 {
            self.0.idle.notify_all();
        }
    }
}
