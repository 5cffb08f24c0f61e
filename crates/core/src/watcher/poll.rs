//! Poll detector: periodic full-tree scan fallback.
//!
//! Exists because push notifications are known to be dropped on some
//! platforms and network filesystems (lost events, watch-descriptor
//! exhaustion). A file is promoted only after being observed unchanged
//! across consecutive cycles *and* passing the shared stability predicate.
//! The first tick fires immediately, which doubles as the post-restart
//! rebuild of the in-memory state.

use std::collections::HashSet;
use std::fs::Metadata;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::SystemTime;

use tokio::sync::{broadcast, RwLock};
use tokio::time::MissedTickBehavior;
use tracing::{debug, warn};
use walkdir::WalkDir;

use super::config::WatcherConfig;
use super::stability;
use super::state::WatchState;
use super::traits::DetectionSink;
use super::watch::dispatch_stable;

/// Runs the poll loop until shutdown.
pub(super) async fn run(
    root: PathBuf,
    config: WatcherConfig,
    state: Arc<RwLock<WatchState>>,
    sink: Arc<dyn DetectionSink>,
    mut shutdown_rx: broadcast::Receiver<()>,
) {
    let mut ticker = tokio::time::interval(config.poll_interval());
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = shutdown_rx.recv() => break,
            _ = ticker.tick() => scan(&root, &config, &state, &sink).await,
        }
    }
    debug!("Poll detector stopped");
}

/// One full-tree scan cycle.
pub(super) async fn scan(
    root: &Path,
    config: &WatcherConfig,
    state: &Arc<RwLock<WatchState>>,
    sink: &Arc<dyn DetectionSink>,
) {
    let walk_root = root.to_path_buf();
    let entries = match tokio::task::spawn_blocking(move || walk_tree(&walk_root)).await {
        Ok(entries) => entries,
        Err(e) => {
            warn!("Tree walk task failed: {}", e);
            return;
        }
    };

    let live: HashSet<PathBuf> = entries.iter().map(|(path, _)| path.clone()).collect();
    let now = SystemTime::now();

    for (path, meta) in entries {
        let mtime = match meta.modified() {
            Ok(mtime) => mtime,
            Err(e) => {
                debug!("No modification time for {}: {}", path.display(), e);
                continue;
            }
        };
        let size = meta.len();

        let promoted = {
            let mut state = state.write().await;
            if state.is_dispatched_version(&path, mtime) {
                continue;
            }
            let cycles = state.observe(&path, size, mtime);
            cycles >= config.poll_cycles_required && stability::is_stable(&meta, config, now)
        };

        if promoted {
            dispatch_stable(state, sink, &path, size, mtime).await;
        }
    }

    // Files deleted or quarantined since the last cycle stop being tracked,
    // so a path that reappears later is rediscovered.
    state.write().await.retain_paths(&live);
}

/// Collects every regular file under `root`. Per-path errors (permission
/// denied, deleted mid-scan) are logged and skipped, never abort the walk.
fn walk_tree(root: &Path) -> Vec<(PathBuf, Metadata)> {
    let mut files = Vec::new();
    for entry in WalkDir::new(root).follow_links(false) {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                debug!("Skipping entry during scan: {}", e);
                continue;
            }
        };
        if !entry.file_type().is_file() || is_hidden(entry.path()) {
            continue;
        }
        match entry.metadata() {
            Ok(meta) => files.push((entry.into_path(), meta)),
            Err(e) => debug!("Cannot stat {}: {}", entry.path().display(), e),
        }
    }
    files
}

/// Dotfiles are writer droppings (partial uploads, editor temp files) and
/// are never media, so both detectors skip them.
pub(super) fn is_hidden(path: &Path) -> bool {
    path.file_name()
        .and_then(|name| name.to_str())
        .map(|name| name.starts_with('.'))
        .unwrap_or(false)
}
