//! Manifest resolution: top-level index to per-component file-trees.

use std::path::Path;
use std::sync::Arc;

use bytes::Bytes;
use tracing::{debug, info, warn};

use super::error::{SyncError, SyncResult};
use super::expander::{self, create_parent};
use super::run::RunContext;
use crate::checksum::LocalState;
use crate::manifest::{Component, FileTree, ManifestDocument};

/// Name of the cached sub-manifest inside each component directory.
pub const MANIFEST_CACHE_FILE: &str = "manifest.json";

/// Resolves the top-level document at `manifest_url`. Any failure here is
/// fatal for the run.
pub(crate) async fn resolve(ctx: Arc<RunContext>, manifest_url: String) {
    let document = match fetch_document(&ctx, &manifest_url).await {
        Ok(document) => document,
        Err(e) => return ctx.fail(e),
    };

    match document {
        ManifestDocument::Flat(tree) => {
            debug!(url = %manifest_url, "Manifest is a flat file-tree");
            let root = ctx.output_root().to_path_buf();
            expander::expand(&ctx, tree, &root);
        }
        ManifestDocument::Index(index) => {
            info!(
                url = %manifest_url,
                components = index.len(),
                skipped = index.skipped().len(),
                "Resolved manifest index"
            );

            // Reserve every component before releasing the root document.
            ctx.tracker.expect_trees(index.len());
            ctx.tracker.tree_expanded();

            for component in index {
                let task = resolve_component(Arc::clone(&ctx), component);
                if let Err(e) = ctx.pool.spawn(task) {
                    return ctx.fail(e.into());
                }
            }
        }
    }
}

async fn fetch_document(ctx: &RunContext, url: &str) -> SyncResult<ManifestDocument> {
    let bytes = ctx.pool.fetch(url)?.await?;
    ManifestDocument::parse(&bytes).map_err(|e| SyncError::manifest(url, e))
}

async fn resolve_component(ctx: Arc<RunContext>, component: Component) {
    let dir = ctx.output_root().join(&component.name);
    match load_tree(&ctx, &component, &dir).await {
        Ok(tree) => expander::expand(&ctx, tree, &dir),
        Err(e) => ctx.fail(e),
    }
}

/// Returns the component's file-tree, from the local cache when its hash
/// matches, otherwise from the network (refreshing the cache).
async fn load_tree(ctx: &RunContext, component: &Component, dir: &Path) -> SyncResult<FileTree> {
    let cache = dir.join(MANIFEST_CACHE_FILE);
    let descriptor = &component.descriptor;

    if let Some(bytes) = read_cache(&cache, &descriptor.hash).await {
        debug!(component = %component.name, "Using cached manifest");
        return FileTree::parse(&bytes).map_err(|e| SyncError::manifest(&component.name, e));
    }

    if let Err(e) = create_parent(dir).await {
        warn!(component = %component.name, error = %e, "Failed to create component directory");
    }

    let bytes = ctx.pool.fetch(descriptor.url.as_str())?.await?;
    debug!(
        component = %component.name,
        url = %descriptor.url,
        bytes = bytes.len(),
        "Fetched component manifest"
    );
    write_cache(&cache, &bytes).await;

    FileTree::parse(&bytes).map_err(|e| SyncError::manifest(&component.name, e))
}

/// Bytes of the cache file if it exists and matches `hash`. A stale file is
/// evicted; if eviction fails it is overwritten later.
async fn read_cache(cache: &Path, hash: &str) -> Option<Bytes> {
    match expander::verify(cache.to_path_buf(), hash.to_string()).await {
        Ok(LocalState::Valid) => {}
        Ok(LocalState::Evicted { actual }) => {
            debug!(path = %cache.display(), actual = %actual, "Evicted stale manifest cache");
            return None;
        }
        Ok(LocalState::Missing) => return None,
        Err(e) => {
            warn!(path = %cache.display(), error = %e, "Manifest cache unusable");
            return None;
        }
    }

    match tokio::fs::read(cache).await {
        Ok(bytes) => Some(Bytes::from(bytes)),
        Err(e) => {
            warn!(path = %cache.display(), error = %e, "Failed to read manifest cache");
            None
        }
    }
}

async fn write_cache(cache: &Path, bytes: &Bytes) {
    if let Err(e) = tokio::fs::write(cache, bytes).await {
        warn!(path = %cache.display(), error = %e, "Failed to persist manifest cache");
    }
}
