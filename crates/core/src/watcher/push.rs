//! Push detector: filesystem notifications plus per-file stabilization.
//!
//! Notifications tell us a file was touched, not that the writer is done.
//! Every interesting event therefore starts a bounded probe that re-checks
//! the file's size until two consecutive checks agree and the shared
//! stability predicate holds. Notifications are also unreliable on some
//! platforms and network filesystems, so anything missed here is picked up
//! by the poll detector.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::SystemTime;

use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::{broadcast, mpsc, RwLock};
use tracing::{debug, info, warn};

use super::config::WatcherConfig;
use super::poll::is_hidden;
use super::stability;
use super::state::WatchState;
use super::traits::DetectionSink;
use super::watch::dispatch_stable;

/// Runs the push-event loop until shutdown or loss of the backend.
pub(super) async fn run(
    root: PathBuf,
    config: WatcherConfig,
    state: Arc<RwLock<WatchState>>,
    sink: Arc<dyn DetectionSink>,
    shutdown_tx: broadcast::Sender<()>,
) {
    let mut shutdown_rx = shutdown_tx.subscribe();
    let (event_tx, mut event_rx) = mpsc::unbounded_channel();

    // The notify callback runs on its own thread; an unbounded sender is the
    // bridge into the async loop.
    let mut backend = match RecommendedWatcher::new(
        move |res: Result<Event, notify::Error>| {
            let _ = event_tx.send(res);
        },
        notify::Config::default(),
    ) {
        Ok(backend) => backend,
        Err(e) => {
            warn!(
                "Notification backend unavailable, continuing in poll-only mode: {}",
                e
            );
            return;
        }
    };

    if let Err(e) = backend.watch(&root, RecursiveMode::Recursive) {
        warn!(
            "Cannot watch {}, continuing in poll-only mode: {}",
            root.display(),
            e
        );
        return;
    }

    {
        let mut state = state.write().await;
        state.set_push_active(true);
        state.watch_dir(&root);
    }
    info!("Push detector watching {}", root.display());

    loop {
        tokio::select! {
            _ = shutdown_rx.recv() => break,
            received = event_rx.recv() => match received {
                None => {
                    warn!("Notification channel closed, continuing in poll-only mode");
                    break;
                }
                Some(Err(e)) => warn!("Notification backend error: {}", e),
                Some(Ok(event)) => {
                    handle_event(
                        &mut backend,
                        event,
                        &config,
                        &state,
                        &sink,
                        &shutdown_tx,
                    )
                    .await;
                }
            }
        }
    }

    state.write().await.set_push_active(false);
    debug!("Push detector stopped");
}

async fn handle_event(
    backend: &mut RecommendedWatcher,
    event: Event,
    config: &WatcherConfig,
    state: &Arc<RwLock<WatchState>>,
    sink: &Arc<dyn DetectionSink>,
    shutdown_tx: &broadcast::Sender<()>,
) {
    if !matches!(event.kind, EventKind::Create(_) | EventKind::Modify(_)) {
        return;
    }

    for path in event.paths {
        if path.is_dir() {
            watch_new_dir(backend, &path, state).await;
        } else if !is_hidden(&path) {
            spawn_probe(path, config, state, sink, shutdown_tx).await;
        }
    }
}

/// Re-arms the watch for a directory observed as created.
///
/// Recursive watches cover new subdirectories on most platforms, but some
/// backends drop them; re-watching explicitly is harmless when redundant.
/// Files that arrived inside the directory before the watch took effect are
/// probed from a one-level scan; deeper stragglers fall to the poll detector.
async fn watch_new_dir(
    backend: &mut RecommendedWatcher,
    dir: &Path,
    state: &Arc<RwLock<WatchState>>,
) {
    let newly_tracked = {
        let mut state = state.write().await;
        state.watch_dir(dir)
    };
    if !newly_tracked {
        return;
    }

    if let Err(e) = backend.watch(dir, RecursiveMode::Recursive) {
        debug!("Re-watch of {} failed: {}", dir.display(), e);
    } else {
        debug!("Watching new directory {}", dir.display());
    }
}

/// Starts a stabilization probe for `path` unless one is already running.
async fn spawn_probe(
    path: PathBuf,
    config: &WatcherConfig,
    state: &Arc<RwLock<WatchState>>,
    sink: &Arc<dyn DetectionSink>,
    shutdown_tx: &broadcast::Sender<()>,
) {
    {
        let mut state = state.write().await;
        if !state.begin_stabilize(&path) {
            return;
        }
    }

    tokio::spawn(stabilize(
        path,
        config.clone(),
        Arc::clone(state),
        Arc::clone(sink),
        shutdown_tx.subscribe(),
    ));
}

/// Polls one file's size at a fixed interval until two consecutive checks
/// agree and the stability predicate holds, then dispatches. Gives up after
/// the configured timeout; the poll detector retries later.
async fn stabilize(
    path: PathBuf,
    config: WatcherConfig,
    state: Arc<RwLock<WatchState>>,
    sink: Arc<dyn DetectionSink>,
    mut shutdown_rx: broadcast::Receiver<()>,
) {
    let deadline = tokio::time::Instant::now() + config.stabilize_timeout();
    let mut last_size: Option<u64> = None;

    loop {
        tokio::select! {
            _ = shutdown_rx.recv() => break,
            _ = tokio::time::sleep(config.stabilize_interval()) => {}
        }

        let meta = match tokio::fs::metadata(&path).await {
            Ok(meta) => meta,
            Err(_) => {
                debug!("{} vanished during stabilization", path.display());
                break;
            }
        };
        if !meta.is_file() {
            break;
        }

        let size = meta.len();
        if last_size == Some(size) && stability::is_stable(&meta, &config, SystemTime::now()) {
            match meta.modified() {
                Ok(mtime) => {
                    dispatch_stable(&state, &sink, &path, size, mtime).await;
                }
                Err(e) => debug!("No modification time for {}: {}", path.display(), e),
            }
            break;
        }
        last_size = Some(size);

        if tokio::time::Instant::now() >= deadline {
            debug!(
                "Stabilization timed out for {}, poll detector will retry",
                path.display()
            );
            break;
        }
    }

    state.write().await.end_stabilize(&path);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::CollectingSink;
    use crate::watcher::{poll, DirectoryWatcher};
    use std::time::Duration;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_detection_waits_for_writes_to_stop() {
        let temp = TempDir::new().unwrap();
        let sink = Arc::new(CollectingSink::new());
        let config = WatcherConfig {
            poll_interval_ms: 50,
            quiet_window_ms: 400,
            min_file_size_bytes: 1,
            stabilize_interval_ms: 25,
            stabilize_timeout_ms: 5_000,
            poll_cycles_required: 2,
        };
        let watcher =
            DirectoryWatcher::new(temp.path().to_path_buf(), config, sink.clone()).unwrap();
        watcher.start().await;

        let path = temp.path().join("photo1.jpg");
        std::fs::write(&path, vec![0u8; 1000]).unwrap();

        // Append mid-window: the quiet window restarts from the last write.
        tokio::time::sleep(Duration::from_millis(150)).await;
        let mut contents = std::fs::read(&path).unwrap();
        contents.extend_from_slice(&[1u8; 500]);
        std::fs::write(&path, &contents).unwrap();

        tokio::time::sleep(Duration::from_millis(200)).await;
        assert!(
            sink.detections().is_empty(),
            "detection fired before the quiet window elapsed"
        );

        for _ in 0..100 {
            if !sink.detections().is_empty() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
        watcher.stop().await;

        let detections = sink.detections();
        assert_eq!(detections.len(), 1);
        assert_eq!(detections[0].size, 1500);
    }

    #[tokio::test]
    async fn test_unwatchable_root_degrades_to_poll_only() {
        let temp = TempDir::new().unwrap();
        let config = WatcherConfig {
            poll_interval_ms: 25,
            quiet_window_ms: 0,
            min_file_size_bytes: 1,
            stabilize_interval_ms: 10,
            stabilize_timeout_ms: 2_000,
            poll_cycles_required: 2,
        };
        let state = Arc::new(RwLock::new(WatchState::new()));
        let collecting = Arc::new(CollectingSink::new());
        let sink: Arc<dyn DetectionSink> = collecting.clone();
        let (shutdown_tx, _) = broadcast::channel(1);

        // A root that does not exist cannot be watched; the push loop gives
        // up without taking the whole watcher down.
        run(
            temp.path().join("gone"),
            config.clone(),
            Arc::clone(&state),
            Arc::clone(&sink),
            shutdown_tx.clone(),
        )
        .await;
        assert!(!state.read().await.status(true).push_active);

        // The poll detector keeps delivering on its own.
        let poll_handle = tokio::spawn(poll::run(
            temp.path().to_path_buf(),
            config,
            Arc::clone(&state),
            sink,
            shutdown_tx.subscribe(),
        ));
        std::fs::write(temp.path().join("photo.jpg"), vec![0u8; 64]).unwrap();

        for _ in 0..200 {
            if !collecting.detections().is_empty() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(25)).await;
        }
        let _ = shutdown_tx.send(());
        poll_handle.await.unwrap();

        let detections = collecting.detections();
        assert_eq!(detections.len(), 1);
        assert_eq!(detections[0].size, 64);
    }
}
