//! The directory watcher: owns the shared state and both detector loops.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::SystemTime;

use tokio::sync::{broadcast, Mutex, RwLock};
use tokio::task::JoinHandle;
use tracing::{info, warn};

use super::config::WatcherConfig;
use super::error::WatcherError;
use super::state::WatchState;
use super::traits::DetectionSink;
use super::types::{DetectedFile, WatcherStatus};
use super::{poll, push};

/// Watches an ingest root with racing push and poll detectors.
pub struct DirectoryWatcher {
    root: PathBuf,
    config: WatcherConfig,
    sink: Arc<dyn DetectionSink>,
    state: Arc<RwLock<WatchState>>,
    running: Arc<AtomicBool>,
    shutdown_tx: broadcast::Sender<()>,
    handles: Mutex<Vec<JoinHandle<()>>>,
}

impl DirectoryWatcher {
    /// Creates a watcher over `root`. The root must already exist.
    pub fn new(
        root: PathBuf,
        config: WatcherConfig,
        sink: Arc<dyn DetectionSink>,
    ) -> Result<Self, WatcherError> {
        if !root.is_dir() {
            return Err(WatcherError::RootNotADirectory { path: root });
        }
        let (shutdown_tx, _) = broadcast::channel(1);
        Ok(Self {
            root,
            config,
            sink,
            state: Arc::new(RwLock::new(WatchState::new())),
            running: Arc::new(AtomicBool::new(false)),
            shutdown_tx,
            handles: Mutex::new(Vec::new()),
        })
    }

    /// Starts both detector loops. Calling this twice is a logged no-op.
    pub async fn start(&self) {
        if self.running.swap(true, Ordering::SeqCst) {
            warn!("Watcher already running");
            return;
        }

        info!("Starting watcher on {}", self.root.display());

        let push_handle = tokio::spawn(push::run(
            self.root.clone(),
            self.config.clone(),
            Arc::clone(&self.state),
            Arc::clone(&self.sink),
            self.shutdown_tx.clone(),
        ));

        let poll_handle = tokio::spawn(poll::run(
            self.root.clone(),
            self.config.clone(),
            Arc::clone(&self.state),
            Arc::clone(&self.sink),
            self.shutdown_tx.subscribe(),
        ));

        let mut handles = self.handles.lock().await;
        handles.push(push_handle);
        handles.push(poll_handle);
    }

    /// Signals shutdown and waits for both loops to exit. Idempotent.
    pub async fn stop(&self) {
        if !self.running.swap(false, Ordering::SeqCst) {
            return;
        }

        info!("Stopping watcher");
        let _ = self.shutdown_tx.send(());

        let handles: Vec<JoinHandle<()>> = self.handles.lock().await.drain(..).collect();
        for handle in handles {
            if let Err(e) = handle.await {
                warn!("Watcher loop ended abnormally: {}", e);
            }
        }
        info!("Watcher stopped");
    }

    /// Snapshot of the watcher's internal state.
    pub async fn status(&self) -> WatcherStatus {
        let state = self.state.read().await;
        state.status(self.running.load(Ordering::Relaxed))
    }
}

/// Shared hand-off path for both detectors.
///
/// The dispatched version is reserved in the known-files map under the write
/// lock before the sink call, so when both detectors confirm the same file
/// version only one of them emits. On sink failure the reservation is
/// released and the file stays discoverable.
pub(super) async fn dispatch_stable(
    state: &Arc<RwLock<WatchState>>,
    sink: &Arc<dyn DetectionSink>,
    path: &Path,
    size: u64,
    mtime: SystemTime,
) -> bool {
    {
        let mut state = state.write().await;
        if !state.reserve_dispatch(path, mtime) {
            return false;
        }
    }

    let detected = DetectedFile::new(path.to_path_buf(), size);
    match sink.dispatch(detected).await {
        Ok(()) => {
            info!("Dispatched {} ({} bytes)", path.display(), size);
            true
        }
        Err(e) => {
            warn!(
                "Dispatch failed for {}, leaving file for re-detection: {}",
                path.display(),
                e
            );
            let mut state = state.write().await;
            state.release_dispatch(path);
            false
        }
    }
}
