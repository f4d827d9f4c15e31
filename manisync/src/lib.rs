//! Manisync - concurrent, hash-gated manifest synchronization
//!
//! This library fetches a multi-tier download manifest (a top-level index of
//! components, each pointing at its own file-tree manifest), verifies every
//! local artifact against its SHA-1 before re-downloading, and reports
//! aggregate progress to the caller.
//!
//! # Architecture
//!
//! ```text
//! Synchronizer::start_run(url, output_root)
//!         │
//!         ▼
//!   ManifestResolver ──► fetch index ──► per component: cache hit or fetch
//!         │
//!         ▼
//!   FileTreeExpander ──► per entry: mkdir / verify / fetch + write
//!         │
//!         ▼
//!   ProgressTracker ──► CompletionGate (fires exactly once)
//! ```
//!
//! All network and filesystem work runs on a [`pool::FetchPool`], an explicit
//! service object owned by the application and shared by every run.

pub mod checksum;
pub mod config;
pub mod logging;
pub mod manifest;
pub mod pool;
pub mod progress;
pub mod queue;
pub mod sync;

pub use config::{ConfigError, PoolConfig, SyncConfig};
pub use pool::{FetchError, FetchHandle, FetchPool, Fetcher, PoolError, ReqwestFetcher};
pub use progress::{ProgressSnapshot, ProgressTracker};
pub use queue::{CompletionQueue, QueueHandle};
pub use sync::{RunHandle, RunReport, RunStatus, SyncError, Synchronizer};
