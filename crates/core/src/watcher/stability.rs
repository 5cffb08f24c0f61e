//! The single stability predicate shared by both detectors.
//!
//! Divergence between the push and poll paths here is a correctness bug:
//! a file the push detector would dispatch but the poll detector would not
//! (or vice versa) breaks the exactly-once-per-version guarantee.

use std::fs::Metadata;
use std::time::{Duration, SystemTime};

use super::config::WatcherConfig;

/// Returns `true` when a file is considered stable: it is a regular file,
/// its size meets the configured minimum, and at least the quiet window has
/// elapsed since its last modification.
///
/// Existence is implied by having metadata; callers that fail to stat the
/// file must treat it as unstable.
pub fn is_stable(meta: &Metadata, config: &WatcherConfig, now: SystemTime) -> bool {
    if !meta.is_file() {
        return false;
    }
    if meta.len() < config.min_file_size_bytes {
        return false;
    }
    quiet_for(meta, now) >= config.quiet_window()
}

/// Time elapsed since the file's last modification, saturating to zero when
/// the modification time is in the future (clock skew on network mounts).
pub fn quiet_for(meta: &Metadata, now: SystemTime) -> Duration {
    meta.modified()
        .ok()
        .and_then(|mtime| now.duration_since(mtime).ok())
        .unwrap_or(Duration::ZERO)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn config(quiet_ms: u64, min_size: u64) -> WatcherConfig {
        WatcherConfig {
            quiet_window_ms: quiet_ms,
            min_file_size_bytes: min_size,
            ..WatcherConfig::default()
        }
    }

    #[test]
    fn test_fresh_write_is_not_stable() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("photo.jpg");
        fs::write(&path, b"data").unwrap();

        let meta = fs::metadata(&path).unwrap();
        assert!(!is_stable(&meta, &config(2_000, 1), SystemTime::now()));
    }

    #[test]
    fn test_quiet_file_is_stable() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("photo.jpg");
        fs::write(&path, b"data").unwrap();

        let meta = fs::metadata(&path).unwrap();
        let later = SystemTime::now() + Duration::from_secs(5);
        assert!(is_stable(&meta, &config(2_000, 1), later));
    }

    #[test]
    fn test_small_file_is_rejected() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("partial.jpg");
        fs::write(&path, b"ab").unwrap();

        let meta = fs::metadata(&path).unwrap();
        let later = SystemTime::now() + Duration::from_secs(5);
        assert!(!is_stable(&meta, &config(0, 1_000), later));
    }

    #[test]
    fn test_directory_is_rejected() {
        let temp = TempDir::new().unwrap();
        let meta = fs::metadata(temp.path()).unwrap();
        let later = SystemTime::now() + Duration::from_secs(5);
        assert!(!is_stable(&meta, &config(0, 0), later));
    }

    #[test]
    fn test_future_mtime_counts_as_zero_quiet() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("skewed.jpg");
        fs::write(&path, b"data").unwrap();

        let meta = fs::metadata(&path).unwrap();
        let past = SystemTime::now() - Duration::from_secs(3600);
        assert_eq!(quiet_for(&meta, past), Duration::ZERO);
    }
}
