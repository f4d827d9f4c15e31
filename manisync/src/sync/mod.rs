//! Synchronization runs.
//!
//! A run mirrors a multi-tier manifest into an output directory. The top-level
//! document is either a component index, where each component points at its
//! own file-tree manifest, or a flat file-tree.
//!
//! # Architecture
//!
//! ```text
//! Synchronizer::start_run(url, output_root, on_complete)
//!     │
//!     ▼
//! resolver::resolve ──► fetch + parse top-level document   (fatal on error)
//!     │
//!     ├── Flat(tree) ─────────────► expander::expand(tree, output_root)
//!     │
//!     └── Index ── per component (concurrent):
//!             <output_root>/<name>/manifest.json hash matches?
//!                 yes ──► parse cached bytes
//!                 no  ──► fetch, persist, parse          (fatal on error)
//!             └──► expander::expand(tree, <output_root>/<name>)
//!
//! expander::expand ── per entry:
//!     directory ─ exists? increment : create_dir_all, increment
//!     file ────── hash matches? increment : fetch, write, increment
//!     malformed ─ record failure, increment
//!
//! ProgressTracker ─► CompletionGate ─► "run-finalizer" thread:
//!     pool.restart() ─► RunHandle::wait() returns ─► on_complete(RunReport)
//! ```
//!
//! Per-file failures never stop a run; they are logged, counted as terminal
//! and recorded in the report's `failed` count.

mod error;
mod expander;
mod resolver;
mod run;
mod synchronizer;

pub use error::{SyncError, SyncResult};
pub use resolver::MANIFEST_CACHE_FILE;
pub use run::{RunHandle, RunReport, RunStatus};
pub use synchronizer::Synchronizer;
