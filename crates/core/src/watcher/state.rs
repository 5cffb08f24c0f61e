//! Shared detection state.
//!
//! One owned state object passed by reference to both detector loops and
//! guarded by a single lock. Never exposed as a global.

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use super::types::{PendingFile, WatcherStatus};

/// Mutable detection state shared between the push and poll loops.
///
/// Wrapped in a `tokio::sync::RwLock` by [`super::DirectoryWatcher`]; status
/// queries take the read half, detector mutations the write half.
#[derive(Debug, Default)]
pub struct WatchState {
    /// Files seen but not yet dispatched, keyed by absolute path.
    pending: HashMap<PathBuf, PendingFile>,
    /// Path -> modification time of the version last handed to the
    /// dispatcher. A differing mtime on a later observation is a new version.
    known: HashMap<PathBuf, SystemTime>,
    /// Paths with an active stabilization probe, to keep event bursts from
    /// spawning one probe per write.
    stabilizing: HashSet<PathBuf>,
    /// Directories covered by the push detector.
    watched_dirs: HashSet<PathBuf>,
    /// Whether the notification backend is delivering events.
    push_active: bool,
}

impl WatchState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether `mtime` matches the version already dispatched for `path`.
    pub fn is_dispatched_version(&self, path: &Path, mtime: SystemTime) -> bool {
        self.known.get(path) == Some(&mtime)
    }

    /// Reserves `path`/`mtime` as dispatched. Returns `false` when the same
    /// version was already reserved, so exactly one caller wins a race.
    pub fn reserve_dispatch(&mut self, path: &Path, mtime: SystemTime) -> bool {
        if self.is_dispatched_version(path, mtime) {
            return false;
        }
        self.known.insert(path.to_path_buf(), mtime);
        self.pending.remove(path);
        true
    }

    /// Drops the dispatched record for `path` so later cycles retry it.
    pub fn release_dispatch(&mut self, path: &Path) {
        self.known.remove(path);
    }

    /// Records a poll observation and returns the number of consecutive
    /// cycles the file has now been seen unchanged.
    pub fn observe(&mut self, path: &Path, size: u64, mtime: SystemTime) -> u32 {
        match self.pending.get_mut(path) {
            Some(entry) if entry.size == size && entry.modified == mtime => {
                entry.unchanged_cycles += 1;
                entry.unchanged_cycles
            }
            Some(entry) => {
                entry.size = size;
                entry.modified = mtime;
                entry.unchanged_cycles = 1;
                1
            }
            None => {
                self.pending.insert(
                    path.to_path_buf(),
                    PendingFile {
                        size,
                        modified: mtime,
                        unchanged_cycles: 1,
                    },
                );
                1
            }
        }
    }

    /// Drops tracking for paths that are no longer on disk.
    pub fn retain_paths(&mut self, live: &HashSet<PathBuf>) {
        self.pending.retain(|path, _| live.contains(path));
        self.known.retain(|path, _| live.contains(path));
    }

    /// Marks a stabilization probe as active for `path`. Returns `false`
    /// when one is already running.
    pub fn begin_stabilize(&mut self, path: &Path) -> bool {
        self.stabilizing.insert(path.to_path_buf())
    }

    pub fn end_stabilize(&mut self, path: &Path) {
        self.stabilizing.remove(path);
    }

    /// Records a directory as covered by the push detector. Returns `false`
    /// when it was already tracked.
    pub fn watch_dir(&mut self, dir: &Path) -> bool {
        self.watched_dirs.insert(dir.to_path_buf())
    }

    pub fn set_push_active(&mut self, active: bool) {
        self.push_active = active;
    }

    pub fn push_active(&self) -> bool {
        self.push_active
    }

    /// Builds an operator-facing snapshot.
    pub fn status(&self, running: bool) -> WatcherStatus {
        WatcherStatus {
            running,
            push_active: self.push_active,
            pending_files: self.pending.len(),
            known_files: self.known.len(),
            watched_dirs: self.watched_dirs.len(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn mtime(offset_secs: u64) -> SystemTime {
        SystemTime::UNIX_EPOCH + Duration::from_secs(1_700_000_000 + offset_secs)
    }

    #[test]
    fn test_observe_counts_unchanged_cycles() {
        let mut state = WatchState::new();
        let path = Path::new("/media/a.jpg");

        assert_eq!(state.observe(path, 100, mtime(0)), 1);
        assert_eq!(state.observe(path, 100, mtime(0)), 2);
        assert_eq!(state.observe(path, 100, mtime(0)), 3);
    }

    #[test]
    fn test_observe_resets_on_change() {
        let mut state = WatchState::new();
        let path = Path::new("/media/a.jpg");

        state.observe(path, 100, mtime(0));
        state.observe(path, 100, mtime(0));
        // File grew: cycle counter starts over.
        assert_eq!(state.observe(path, 200, mtime(1)), 1);
    }

    #[test]
    fn test_reserve_dispatch_wins_once() {
        let mut state = WatchState::new();
        let path = Path::new("/media/a.jpg");

        assert!(state.reserve_dispatch(path, mtime(0)));
        assert!(!state.reserve_dispatch(path, mtime(0)));
        // A new version is eligible again.
        assert!(state.reserve_dispatch(path, mtime(5)));
    }

    #[test]
    fn test_release_dispatch_makes_version_eligible() {
        let mut state = WatchState::new();
        let path = Path::new("/media/a.jpg");

        assert!(state.reserve_dispatch(path, mtime(0)));
        state.release_dispatch(path);
        assert!(state.reserve_dispatch(path, mtime(0)));
    }

    #[test]
    fn test_reserve_clears_pending() {
        let mut state = WatchState::new();
        let path = Path::new("/media/a.jpg");

        state.observe(path, 100, mtime(0));
        state.reserve_dispatch(path, mtime(0));
        assert_eq!(state.status(true).pending_files, 0);
    }

    #[test]
    fn test_retain_paths_prunes_vanished() {
        let mut state = WatchState::new();
        state.observe(Path::new("/media/a.jpg"), 100, mtime(0));
        state.reserve_dispatch(Path::new("/media/b.jpg"), mtime(0));

        let live: HashSet<PathBuf> = [PathBuf::from("/media/a.jpg")].into_iter().collect();
        state.retain_paths(&live);

        let status = state.status(true);
        assert_eq!(status.pending_files, 1);
        assert_eq!(status.known_files, 0);
    }

    #[test]
    fn test_begin_stabilize_is_exclusive() {
        let mut state = WatchState::new();
        let path = Path::new("/media/a.jpg");

        assert!(state.begin_stabilize(path));
        assert!(!state.begin_stabilize(path));
        state.end_stabilize(path);
        assert!(state.begin_stabilize(path));
    }
}
