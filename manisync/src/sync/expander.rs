//! File-tree expansion: one terminal increment per counted entry.

use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::{debug, info, warn};

use super::error::{SyncError, SyncResult};
use super::run::RunContext;
use crate::checksum::{self, LocalState};
use crate::manifest::{EntryKind, FileTree};

/// What happened to a file entry.
#[derive(Debug, PartialEq, Eq)]
enum FileOutcome {
    UpToDate,
    Downloaded(usize),
}

/// Registers `tree` with the tracker and schedules one task per entry that
/// needs work. Releases the tree's pending slot when done scheduling.
pub(crate) fn expand(ctx: &Arc<RunContext>, tree: FileTree, dir: &Path) {
    ctx.tracker.add_total(tree.len());
    ctx.state.set_downloading();
    debug!(
        dir = %dir.display(),
        entries = tree.len(),
        ignored = tree.ignored(),
        "Expanding file-tree"
    );

    for entry in tree {
        let target = entry.target(dir);
        match entry.kind {
            EntryKind::Directory => {
                if target.exists() {
                    ctx.tracker.increment();
                } else {
                    schedule(ctx, create_directory(Arc::clone(ctx), target));
                }
            }
            EntryKind::File { hash, url } => {
                schedule(ctx, sync_file(Arc::clone(ctx), target, hash, url));
            }
            EntryKind::Malformed { reason } => {
                warn!(entry = %entry.name, reason = %reason, "Skipping malformed entry");
                ctx.tracker.record_failure();
                ctx.tracker.increment();
            }
        }
    }

    ctx.tracker.tree_expanded();
}

fn schedule<F>(ctx: &RunContext, task: F)
where
    F: std::future::Future<Output = ()> + Send + 'static,
{
    if let Err(e) = ctx.pool.spawn(task) {
        // Only a shut-down pool rejects work; a halted tracker ignores these.
        debug!(error = %e, "Entry not scheduled");
        ctx.tracker.record_failure();
        ctx.tracker.increment();
    }
}

async fn create_directory(ctx: Arc<RunContext>, target: PathBuf) {
    match tokio::fs::create_dir_all(&target).await {
        Ok(()) => debug!(path = %target.display(), "Created directory"),
        Err(e) if e.kind() == io::ErrorKind::AlreadyExists => {}
        Err(e) => {
            warn!(path = %target.display(), error = %e, "Failed to create directory");
            ctx.tracker.record_failure();
        }
    }
    ctx.tracker.increment();
}

async fn sync_file(ctx: Arc<RunContext>, target: PathBuf, hash: String, url: String) {
    match fetch_file(&ctx, &target, hash, &url).await {
        Ok(FileOutcome::UpToDate) => debug!(path = %target.display(), "Up to date"),
        Ok(FileOutcome::Downloaded(bytes)) => {
            info!(path = %target.display(), bytes, "Downloaded")
        }
        Err(e) => {
            warn!(path = %target.display(), url = %url, error = %e, "Failed to synchronize file");
            ctx.tracker.record_failure();
        }
    }
    ctx.tracker.increment();
}

async fn fetch_file(
    ctx: &RunContext,
    target: &Path,
    hash: String,
    url: &str,
) -> SyncResult<FileOutcome> {
    if verify(target.to_path_buf(), hash).await?.is_valid() {
        return Ok(FileOutcome::UpToDate);
    }

    if let Some(parent) = target.parent() {
        create_parent(parent).await?;
    }

    let body = ctx.pool.fetch(url)?.await?;
    tokio::fs::write(target, &body)
        .await
        .map_err(|e| SyncError::io(target, e))?;

    Ok(FileOutcome::Downloaded(body.len()))
}

/// Hashes `path` on a blocking thread, evicting it on mismatch.
pub(crate) async fn verify(path: PathBuf, hash: String) -> SyncResult<LocalState> {
    tokio::task::spawn_blocking(move || checksum::verify_or_evict(&path, &hash))
        .await
        .map_err(|e| SyncError::Task(e.to_string()))?
        .map_err(SyncError::from)
}

pub(crate) async fn create_parent(dir: &Path) -> SyncResult<()> {
    match tokio::fs::create_dir_all(dir).await {
        Err(e) if e.kind() != io::ErrorKind::AlreadyExists => Err(SyncError::io(dir, e)),
        _ => Ok(()),
    }
}
