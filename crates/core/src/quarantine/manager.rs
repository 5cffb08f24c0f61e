//! Quarantine manager implementation.

use std::ffi::OsString;
use std::path::{Component, Path, PathBuf};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::fs;
use tracing::{debug, error, info, warn};
use walkdir::WalkDir;

use crate::queue::{IngestPayload, Task};
use crate::worker::{FailureSink, HandlerError};

use super::config::QuarantineConfig;
use super::error::QuarantineError;
use super::types::{FailedEntry, QuarantineRecord, SIDECAR_EXTENSION};

/// Moves failed files into the quarantine area and back out of it.
pub struct QuarantineManager {
    config: QuarantineConfig,
    /// Restore target for files whose sidecar is missing or unusable.
    ingest_root: PathBuf,
}

impl QuarantineManager {
    pub fn new(config: QuarantineConfig, ingest_root: PathBuf) -> Self {
        Self {
            config,
            ingest_root,
        }
    }

    pub fn root(&self) -> &Path {
        &self.config.root
    }

    /// Moves `source` into today's quarantine directory and writes its
    /// sidecar. Returns the file's new location.
    ///
    /// A sidecar write failure does not fail the quarantine: the file move
    /// is what stops the watcher from rediscovering a poisoned file, the
    /// sidecar is forensics.
    pub async fn quarantine(
        &self,
        source: &Path,
        record: &QuarantineRecord,
    ) -> Result<PathBuf, QuarantineError> {
        if !fs::try_exists(source).await.unwrap_or(false) {
            return Err(QuarantineError::SourceNotFound {
                path: source.to_path_buf(),
            });
        }

        let dated_dir = self
            .config
            .root
            .join(record.timestamp.format("%Y-%m-%d").to_string());
        fs::create_dir_all(&dated_dir).await?;

        let file_name = source
            .file_name()
            .ok_or_else(|| QuarantineError::SourceNotFound {
                path: source.to_path_buf(),
            })?;
        let destination = unique_destination(&dated_dir, Path::new(file_name)).await;

        move_file(source, &destination).await?;
        info!(
            "Quarantined {} -> {} ({})",
            source.display(),
            destination.display(),
            record.error
        );

        let sidecar = sidecar_path(&destination);
        match serde_json::to_vec_pretty(record) {
            Ok(bytes) => {
                if let Err(e) = fs::write(&sidecar, bytes).await {
                    warn!(
                        "Failed to write quarantine sidecar {}: {}",
                        sidecar.display(),
                        e
                    );
                }
            }
            Err(e) => warn!("Failed to serialize quarantine record: {}", e),
        }

        Ok(destination)
    }

    /// Lists quarantined files, newest first.
    pub async fn list(
        &self,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<FailedEntry>, QuarantineError> {
        if !fs::try_exists(&self.config.root).await.unwrap_or(false) {
            return Ok(Vec::new());
        }

        let root = self.config.root.clone();
        let files = tokio::task::spawn_blocking(move || walk_quarantine(&root))
            .await
            .map_err(|e| QuarantineError::Io(std::io::Error::other(e)))?;

        let mut entries = Vec::with_capacity(files.len());
        for (path, size, modified) in files {
            let record = read_sidecar(&path).await;
            entries.push(FailedEntry {
                path,
                size,
                modified,
                record,
            });
        }
        entries.sort_by(|a, b| b.modified.cmp(&a.modified));

        Ok(entries.into_iter().skip(offset).take(limit).collect())
    }

    /// Restores a quarantined file to the sidecar's recorded path joined
    /// under the current ingestion root, so the pipeline picks it up again.
    /// Returns the restore destination.
    ///
    /// Falls back to the file's name under the ingestion root when the
    /// sidecar is missing or its recorded path is unusable. The sidecar is
    /// removed and emptied quarantine directories are pruned.
    pub async fn retry(&self, path: &Path) -> Result<PathBuf, QuarantineError> {
        let quarantined = self.resolve_quarantined(path).await?;

        let record = read_sidecar(&quarantined).await;
        let destination = self.restore_target(&quarantined, record.as_ref())?;

        if fs::try_exists(&destination).await.unwrap_or(false) {
            return Err(QuarantineError::DestinationExists { path: destination });
        }
        if let Some(parent) = destination.parent() {
            fs::create_dir_all(parent).await?;
        }

        move_file(&quarantined, &destination).await?;
        info!(
            "Restored {} -> {}",
            quarantined.display(),
            destination.display()
        );

        self.remove_sidecar_and_prune(&quarantined).await;
        Ok(destination)
    }

    /// Permanently removes a quarantined file and its sidecar.
    pub async fn delete(&self, path: &Path) -> Result<(), QuarantineError> {
        let quarantined = self.resolve_quarantined(path).await?;
        fs::remove_file(&quarantined).await?;
        info!("Deleted quarantined file {}", quarantined.display());
        self.remove_sidecar_and_prune(&quarantined).await;
        Ok(())
    }

    /// Resolves an operator-supplied path and verifies it is a file inside
    /// the quarantine area. Symlinks are resolved before the check, so a
    /// link pointing elsewhere cannot smuggle operations outside the root.
    async fn resolve_quarantined(&self, path: &Path) -> Result<PathBuf, QuarantineError> {
        let root = fs::canonicalize(&self.config.root).await.map_err(|_| {
            QuarantineError::SourceNotFound {
                path: path.to_path_buf(),
            }
        })?;
        let resolved =
            fs::canonicalize(path)
                .await
                .map_err(|_| QuarantineError::SourceNotFound {
                    path: path.to_path_buf(),
                })?;
        if !resolved.starts_with(&root) || resolved == root {
            return Err(QuarantineError::OutsideQuarantineRoot {
                path: path.to_path_buf(),
            });
        }
        let meta = fs::metadata(&resolved).await?;
        if !meta.is_file() {
            return Err(QuarantineError::SourceNotFound {
                path: path.to_path_buf(),
            });
        }
        Ok(resolved)
    }

    fn restore_target(
        &self,
        quarantined: &Path,
        record: Option<&QuarantineRecord>,
    ) -> Result<PathBuf, QuarantineError> {
        let fallback = || {
            // file_name is present: resolve_quarantined only returns files.
            self.ingest_root
                .join(quarantined.file_name().unwrap_or_default())
        };
        let Some(record) = record else {
            return Ok(fallback());
        };

        let original = &record.original_path;
        if original
            .components()
            .any(|c| matches!(c, Component::ParentDir))
        {
            return Err(QuarantineError::InvalidOriginalPath {
                path: original.clone(),
            });
        }
        if original.is_absolute() {
            // Sidecars written by hand (or by old versions) may carry an
            // absolute path; restore it under the current ingest root so a
            // reconfigured root does not strand the file in an unwatched
            // tree.
            match original.strip_prefix(&self.ingest_root) {
                Ok(relative) => Ok(self.ingest_root.join(relative)),
                Err(_) => {
                    debug!(
                        "Sidecar for {} points outside the ingest root, restoring by name",
                        quarantined.display()
                    );
                    Ok(fallback())
                }
            }
        } else {
            Ok(self.ingest_root.join(original))
        }
    }

    async fn remove_sidecar_and_prune(&self, quarantined: &Path) {
        let sidecar = sidecar_path(quarantined);
        if let Err(e) = fs::remove_file(&sidecar).await {
            if e.kind() != std::io::ErrorKind::NotFound {
                warn!("Failed to remove sidecar {}: {}", sidecar.display(), e);
            }
        }
        if let Some(parent) = quarantined.parent() {
            self.prune_empty_dirs(parent).await;
        }
    }

    /// Removes now-empty directories from `dir` up to (excluding) the
    /// quarantine root.
    async fn prune_empty_dirs(&self, dir: &Path) {
        let Ok(root) = fs::canonicalize(&self.config.root).await else {
            return;
        };
        let mut current = dir.to_path_buf();
        loop {
            let Ok(resolved) = fs::canonicalize(&current).await else {
                break;
            };
            if resolved == root || !resolved.starts_with(&root) {
                break;
            }
            match fs::read_dir(&resolved).await {
                Ok(mut entries) => match entries.next_entry().await {
                    Ok(None) => {
                        if fs::remove_dir(&resolved).await.is_err() {
                            break;
                        }
                        debug!("Pruned empty quarantine directory {}", resolved.display());
                    }
                    _ => break,
                },
                Err(_) => break,
            }
            match current.parent() {
                Some(parent) => current = parent.to_path_buf(),
                None => break,
            }
        }
    }
}

#[async_trait]
impl FailureSink for QuarantineManager {
    async fn on_exhausted(
        &self,
        task: &Task,
        attempts: u32,
        handler_error: &HandlerError,
        worker_id: &str,
    ) {
        let payload: IngestPayload = match serde_json::from_value(task.payload.clone()) {
            Ok(payload) => payload,
            Err(e) => {
                warn!(
                    "Cannot quarantine task {}: payload not an ingest payload: {}",
                    task.id, e
                );
                return;
            }
        };

        // Record the location relative to the ingest root, so the file can
        // be restored even after the root moves.
        let original_path = payload
            .file_path
            .strip_prefix(&self.ingest_root)
            .map(Path::to_path_buf)
            .unwrap_or_else(|_| payload.file_path.clone());

        let record = QuarantineRecord {
            original_path,
            error: handler_error.to_string(),
            stage: handler_error.stage,
            attempts,
            timestamp: Utc::now(),
            worker_id: worker_id.to_string(),
            stack_trace: None,
        };

        match self.quarantine(&payload.file_path, &record).await {
            Ok(_) => {}
            Err(QuarantineError::SourceNotFound { path }) => {
                // The file vanished between the last attempt and now; there
                // is nothing left to isolate.
                warn!("File to quarantine no longer exists: {}", path.display());
            }
            Err(e) => {
                error!(
                    "Failed to quarantine {}: {}",
                    payload.file_path.display(),
                    e
                );
            }
        }
    }
}

/// Sidecar path for a quarantined file: the full file name plus `.error`.
fn sidecar_path(file: &Path) -> PathBuf {
    let mut name = file.file_name().unwrap_or_default().to_os_string();
    name.push(".");
    name.push(SIDECAR_EXTENSION);
    file.with_file_name(name)
}

fn is_sidecar(path: &Path) -> bool {
    path.extension()
        .map(|ext| ext == SIDECAR_EXTENSION)
        .unwrap_or(false)
}

async fn read_sidecar(file: &Path) -> Option<QuarantineRecord> {
    let sidecar = sidecar_path(file);
    let bytes = fs::read(&sidecar).await.ok()?;
    match serde_json::from_slice(&bytes) {
        Ok(record) => Some(record),
        Err(e) => {
            warn!("Unreadable quarantine sidecar {}: {}", sidecar.display(), e);
            None
        }
    }
}

/// Finds a destination in `dir` that does not collide with an existing
/// file: the original name, then `-1` through `-1000` suffixes, then a
/// nanosecond timestamp.
async fn unique_destination(dir: &Path, file_name: &Path) -> PathBuf {
    let candidate = dir.join(file_name);
    if !fs::try_exists(&candidate).await.unwrap_or(false) {
        return candidate;
    }

    let stem = file_name.file_stem().unwrap_or_default().to_os_string();
    let extension = file_name.extension().map(|e| e.to_os_string());
    let with_suffix = |suffix: String| {
        let mut name = OsString::from(&stem);
        name.push(suffix);
        if let Some(ext) = &extension {
            name.push(".");
            name.push(ext);
        }
        dir.join(name)
    };

    for n in 1..=1000u32 {
        let candidate = with_suffix(format!("-{}", n));
        if !fs::try_exists(&candidate).await.unwrap_or(false) {
            return candidate;
        }
    }

    let nanos = Utc::now().timestamp_nanos_opt().unwrap_or_default();
    with_suffix(format!("-{}", nanos))
}

/// Moves a file, falling back to copy-and-remove for cross-filesystem
/// moves (rename fails with EXDEV).
async fn move_file(source: &Path, destination: &Path) -> Result<(), QuarantineError> {
    match fs::rename(source, destination).await {
        Ok(()) => Ok(()),
        Err(e)
            if e.kind() == std::io::ErrorKind::CrossesDevices || e.raw_os_error() == Some(18) =>
        {
            fs::copy(source, destination).await?;
            fs::remove_file(source).await?;
            Ok(())
        }
        Err(e) => Err(QuarantineError::Io(e)),
    }
}

fn walk_quarantine(root: &Path) -> Vec<(PathBuf, u64, DateTime<Utc>)> {
    let mut files = Vec::new();
    for entry in WalkDir::new(root).into_iter() {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                debug!("Skipping unreadable quarantine entry: {}", e);
                continue;
            }
        };
        if !entry.file_type().is_file() || is_sidecar(entry.path()) {
            continue;
        }
        let Ok(meta) = entry.metadata() else {
            continue;
        };
        let modified = meta
            .modified()
            .map(DateTime::<Utc>::from)
            .unwrap_or_else(|_| Utc::now());
        files.push((entry.into_path(), meta.len(), modified));
    }
    files
}
