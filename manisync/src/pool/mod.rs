//! Bounded asynchronous fetch pool.
//!
//! The [`FetchPool`] owns a multi-threaded Tokio runtime sized to the
//! configured worker count and runs every network and filesystem task of a
//! synchronization run on it.
//!
//! # Architecture
//!
//! ```text
//! FetchPool (cloneable service handle)
//!     │
//!     ├── fetch(url) ──────────► FetchHandle (await, or wait() off-pool)
//!     │       ├── submit_callback(url, on_success, on_error?)
//!     │       └── submit_future(url, on_error?)
//!     │
//!     ├── spawn(task) ─────────► arbitrary pool task
//!     │
//!     ├── Fetcher (trait) ─────► ReqwestFetcher / test doubles
//!     │
//!     └── Generation ──────────► runtime + in-flight count + cancellation
//!             shutdown_graceful / shutdown_forced / restart
//! ```
//!
//! `fetch` is the single result primitive; the callback and lenient future
//! styles are thin adapters over it.

mod error;
mod fetch_pool;
mod fetcher;
mod handle;

pub use error::{FetchError, PoolError};
pub use fetch_pool::{ErrorCallback, FetchPool};
pub use fetcher::{FetchFuture, Fetcher, ReqwestFetcher};
pub use handle::FetchHandle;
