//! The durable store.
//!
//! All on-disk state belongs to this module. Other components never touch
//! files directly; they go through a [`DurableStore`] handle, which provides:
//!
//! - atomic writes (`<path>.tmp` + fsync + rename),
//! - bounded advisory locking on sidecar lock files,
//! - schema-validated JSON reads with quarantine-and-restore on corruption,
//! - append-with-rotation for the activity log,
//! - a startup sweep for orphaned `.tmp` files.

mod lock;

pub use lock::{FileLockGuard, LockMode};

use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::Serialize;
use serde::de::DeserializeOwned;
use wavefront_schemas::{Validate, to_canonical_json};

use crate::config::{ACTIVITY_ARCHIVE_KEEP, RuntimeConfig};
use crate::errors::{CoreError, CoreResult};
use crate::time::{Clock, compact_timestamp};

/// Handle to all Wavefront state under one project root.
pub struct DurableStore {
    root: PathBuf,
    config: RuntimeConfig,
    clock: Arc<dyn Clock>,
}

impl DurableStore {
    /// Create a store rooted at `root`.
    pub fn new(root: impl Into<PathBuf>, config: RuntimeConfig, clock: Arc<dyn Clock>) -> Self {
        Self {
            root: root.into(),
            config,
            clock,
        }
    }

    /// The project root this store serves.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// The configuration the store was built with.
    pub fn config(&self) -> &RuntimeConfig {
        &self.config
    }

    /// The injected clock.
    pub fn clock(&self) -> &dyn Clock {
        self.clock.as_ref()
    }

    /// Create the state directory tree if missing.
    pub fn init_dirs(&self) -> CoreResult<()> {
        let dir = wavefront_common::paths::locks_dir(&self.root);
        wavefront_common::io::create_dir_all(&dir)
            .map_err(|e| CoreError::io(format!("creating {}", dir.display()), e))
    }

    /// Read the file at `path` into bytes.
    pub fn read(&self, path: &Path) -> CoreResult<Vec<u8>> {
        match std::fs::read(path) {
            Ok(bytes) => Ok(bytes),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Err(CoreError::not_found(
                format!("{} does not exist", path.display()),
            )),
            Err(e) => Err(CoreError::io(format!("reading {}", path.display()), e)),
        }
    }

    /// Read the file at `path` into a UTF-8 string.
    pub fn read_to_string(&self, path: &Path) -> CoreResult<String> {
        let bytes = self.read(path)?;
        String::from_utf8(bytes).map_err(|e| {
            CoreError::io(
                format!("reading {}", path.display()),
                std::io::Error::new(std::io::ErrorKind::InvalidData, e),
            )
        })
    }

    /// Write `bytes` to `path` atomically: write `<path>.tmp`, fsync, rename.
    ///
    /// On any failure the tmp file is removed; the destination is either the
    /// old contents or the new contents, never a mix.
    pub fn write_atomic(&self, path: &Path, bytes: &[u8]) -> CoreResult<()> {
        if let Some(parent) = path.parent() {
            wavefront_common::io::create_dir_all(parent)
                .map_err(|e| CoreError::io(format!("creating {}", parent.display()), e))?;
        }
        let tmp = tmp_path(path);
        let result = (|| -> CoreResult<()> {
            let mut file = File::create(&tmp)
                .map_err(|e| CoreError::io(format!("creating {}", tmp.display()), e))?;
            file.write_all(bytes)
                .map_err(|e| CoreError::io(format!("writing {}", tmp.display()), e))?;
            file.sync_all()
                .map_err(|e| CoreError::io(format!("syncing {}", tmp.display()), e))?;
            drop(file);
            std::fs::rename(&tmp, path).map_err(|e| {
                CoreError::io(
                    format!("renaming {} to {}", tmp.display(), path.display()),
                    e,
                )
            })
        })();
        if result.is_err() {
            let _ = wavefront_common::io::remove_file_if_exists(&tmp);
        }
        result
    }

    /// Run `f` while holding the sidecar lock for `target`.
    ///
    /// Every concurrent mutator of a given file must funnel through this so
    /// readers during a writer's critical section block on the lock.
    pub fn with_lock<T>(
        &self,
        target: &Path,
        mode: LockMode,
        f: impl FnOnce() -> CoreResult<T>,
    ) -> CoreResult<T> {
        let lock_path = wavefront_common::paths::sidecar_lock_path(&self.root, target);
        let _guard = lock::acquire(&lock_path, mode, self.config.lock_timeout)?;
        f()
    }

    /// Acquire a named lock file directly (e.g. `checkpoint.lock`), waiting
    /// up to `timeout`.
    pub fn acquire_lock(
        &self,
        lock_path: &Path,
        mode: LockMode,
        timeout: std::time::Duration,
    ) -> CoreResult<FileLockGuard> {
        lock::acquire(lock_path, mode, timeout)
    }

    /// Acquire a named lock file without waiting.
    pub fn try_acquire_lock(&self, lock_path: &Path, mode: LockMode) -> CoreResult<FileLockGuard> {
        lock::try_acquire(lock_path, mode)
    }

    /// Read and validate a JSON state file.
    ///
    /// On parse or validation failure the offending file is quarantined to
    /// `<path>.corrupted.<ts>` and the last known-good backup is promoted in
    /// its place. Without a usable backup this fails with `CorruptedState`.
    pub fn read_validated_json<T>(&self, path: &Path) -> CoreResult<T>
    where
        T: DeserializeOwned + Validate,
    {
        let bytes = self.read(path)?;
        match parse_validated::<T>(&bytes) {
            Ok(value) => Ok(value),
            Err(detail) => self.recover_from_backup(path, detail),
        }
    }

    fn recover_from_backup<T>(&self, path: &Path, detail: String) -> CoreResult<T>
    where
        T: DeserializeOwned + Validate,
    {
        let quarantine = quarantine_path(path, &compact_timestamp(self.clock.now_utc()));
        std::fs::rename(path, &quarantine).map_err(|e| {
            CoreError::io(format!("quarantining {}", path.display()), e)
        })?;
        tracing::warn!(
            "quarantined corrupted {} to {}: {detail}",
            path.display(),
            quarantine.display()
        );

        let backup = backup_path(path);
        let backup_bytes = match std::fs::read(&backup) {
            Ok(bytes) => bytes,
            Err(_) => {
                return Err(CoreError::CorruptedState {
                    path: path.to_path_buf(),
                    detail,
                    remediation: format!(
                        "no backup found; inspect {} and restore the file by hand",
                        quarantine.display()
                    ),
                });
            }
        };
        match parse_validated::<T>(&backup_bytes) {
            Ok(value) => {
                self.write_atomic(path, &backup_bytes)?;
                tracing::warn!("restored {} from {}", path.display(), backup.display());
                Ok(value)
            }
            Err(backup_detail) => Err(CoreError::CorruptedState {
                path: path.to_path_buf(),
                detail,
                remediation: format!(
                    "backup {} is also unusable ({backup_detail}); inspect {}",
                    backup.display(),
                    quarantine.display()
                ),
            }),
        }
    }

    /// Validate and write a JSON state file canonically, then refresh its
    /// `.backup` copy.
    pub fn write_validated_json<T>(&self, path: &Path, value: &T) -> CoreResult<()>
    where
        T: Serialize + Validate,
    {
        value.validate().map_err(|detail| CoreError::SchemaInvalid {
            path: path.to_path_buf(),
            detail,
        })?;
        let rendered = to_canonical_json(value).map_err(|e| {
            CoreError::io(
                format!("serializing {}", path.display()),
                std::io::Error::new(std::io::ErrorKind::InvalidData, e),
            )
        })?;
        self.write_atomic(path, rendered.as_bytes())?;
        // The backup is only ever written after a successful validation, so
        // it is always a known-good restore point.
        self.write_atomic(&backup_path(path), rendered.as_bytes())
    }

    /// Append `line` to the log at `path`, rotating first when the file has
    /// outgrown the configured threshold.
    ///
    /// Rotation renames the current file to `<stem>_archive_<ts>.md`, keeps
    /// only the five most recent archives, and seeds a fresh file with a
    /// header referencing the archive. Returns the archive file name when a
    /// rotation happened, so callers can record the event.
    pub fn append_with_rotation(&self, path: &Path, line: &str) -> CoreResult<Option<String>> {
        if let Some(parent) = path.parent() {
            wavefront_common::io::create_dir_all(parent)
                .map_err(|e| CoreError::io(format!("creating {}", parent.display()), e))?;
        }

        let size = std::fs::metadata(path).map(|m| m.len()).unwrap_or(0);
        let rotated = if size > self.config.activity_max_bytes {
            Some(self.rotate_log(path)?)
        } else {
            None
        };

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .map_err(|e| CoreError::io(format!("opening {}", path.display()), e))?;
        writeln!(file, "{line}")
            .map_err(|e| CoreError::io(format!("appending to {}", path.display()), e))?;
        file.flush()
            .map_err(|e| CoreError::io(format!("flushing {}", path.display()), e))?;
        Ok(rotated)
    }

    fn rotate_log(&self, path: &Path) -> CoreResult<String> {
        let stem = path
            .file_stem()
            .map(|s| s.to_string_lossy().to_string())
            .unwrap_or_else(|| "log".to_string());
        let ext = path
            .extension()
            .map(|s| s.to_string_lossy().to_string())
            .unwrap_or_else(|| "md".to_string());
        let dir = path.parent().unwrap_or_else(|| Path::new("."));

        let ts = compact_timestamp(self.clock.now_utc());
        let archive_name = format!("{stem}_archive_{ts}.{ext}");
        let archive = dir.join(&archive_name);
        std::fs::rename(path, &archive)
            .map_err(|e| CoreError::io(format!("rotating {}", path.display()), e))?;

        // Prune to the most recent archives. Names embed a sortable
        // timestamp, so lexical order is chronological.
        let prefix = format!("{stem}_archive_");
        let mut archives: Vec<PathBuf> = std::fs::read_dir(dir)
            .map_err(|e| CoreError::io(format!("listing {}", dir.display()), e))?
            .flatten()
            .map(|entry| entry.path())
            .filter(|p| {
                p.file_name()
                    .map(|n| n.to_string_lossy().starts_with(&prefix))
                    .unwrap_or(false)
            })
            .collect();
        archives.sort();
        while archives.len() > ACTIVITY_ARCHIVE_KEEP {
            let oldest = archives.remove(0);
            if let Err(e) = std::fs::remove_file(&oldest) {
                tracing::warn!("could not prune archive {}: {e}", oldest.display());
            }
        }

        let header = format!(
            "# Activity Stream\n\nRotated {ts}; earlier entries continue in `{archive_name}`.\n",
        );
        self.write_atomic(path, header.as_bytes())?;
        tracing::debug!("rotated {} to {archive_name}", path.display());
        Ok(archive_name)
    }

    /// Remove orphaned `.tmp` files left behind by a killed process.
    ///
    /// Sweeps the project root and the state directory (non-recursive) and
    /// returns how many files were removed.
    pub fn sweep_tmp_files(&self) -> CoreResult<usize> {
        let mut removed = 0usize;
        let state = wavefront_common::paths::state_dir(&self.root);
        for dir in [self.root.as_path(), state.as_path()] {
            let Ok(entries) = std::fs::read_dir(dir) else {
                continue;
            };
            for entry in entries.flatten() {
                let path = entry.path();
                let is_tmp = path
                    .extension()
                    .map(|e| e == "tmp")
                    .unwrap_or(false);
                if is_tmp && path.is_file() {
                    match std::fs::remove_file(&path) {
                        Ok(()) => removed += 1,
                        Err(e) => tracing::warn!("could not sweep {}: {e}", path.display()),
                    }
                }
            }
        }
        Ok(removed)
    }
}

fn tmp_path(path: &Path) -> PathBuf {
    let name = path
        .file_name()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_else(|| "file".to_string());
    path.with_file_name(format!("{name}.tmp"))
}

fn backup_path(path: &Path) -> PathBuf {
    let name = path
        .file_name()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_else(|| "file".to_string());
    path.with_file_name(format!("{name}.backup"))
}

fn quarantine_path(path: &Path, ts: &str) -> PathBuf {
    let name = path
        .file_name()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_else(|| "file".to_string());
    path.with_file_name(format!("{name}.corrupted.{ts}"))
}

fn parse_validated<T>(bytes: &[u8]) -> Result<T, String>
where
    T: DeserializeOwned + Validate,
{
    let value: T = serde_json::from_slice(bytes).map_err(|e| format!("JSON parse error: {e}"))?;
    value.validate()?;
    Ok(value)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::time::FixedClock;
    use chrono::TimeZone;
    use wavefront_schemas::ExecutorState;

    fn test_store(root: &Path) -> DurableStore {
        let clock = FixedClock(chrono::Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap());
        DurableStore::new(root, RuntimeConfig::default(), Arc::new(clock))
    }

    #[test]
    fn write_atomic_leaves_no_tmp_on_success() {
        let td = tempfile::tempdir().unwrap();
        let store = test_store(td.path());
        let target = td.path().join("file.txt");

        store.write_atomic(&target, b"hello").unwrap();
        assert_eq!(std::fs::read_to_string(&target).unwrap(), "hello");
        assert!(!tmp_path(&target).exists());
    }

    #[test]
    fn validated_json_round_trips_and_writes_backup() {
        let td = tempfile::tempdir().unwrap();
        let store = test_store(td.path());
        let path = td.path().join("state.json");

        let state = ExecutorState::fresh("phase-1", "2026-01-01T00:00:00Z");
        store.write_validated_json(&path, &state).unwrap();
        assert!(backup_path(&path).exists());

        let loaded: ExecutorState = store.read_validated_json(&path).unwrap();
        assert_eq!(loaded, state);
    }

    #[test]
    fn corrupted_file_with_backup_recovers_transparently() {
        let td = tempfile::tempdir().unwrap();
        let store = test_store(td.path());
        let path = td.path().join("state.json");

        let state = ExecutorState::fresh("phase-1", "2026-01-01T00:00:00Z");
        store.write_validated_json(&path, &state).unwrap();

        // Truncate mid-file.
        std::fs::write(&path, "{\"current_wave\": 1, \"comp").unwrap();

        let loaded: ExecutorState = store.read_validated_json(&path).unwrap();
        assert_eq!(loaded, state);
        // The bad bytes were quarantined and the file restored.
        let quarantined: Vec<_> = std::fs::read_dir(td.path())
            .unwrap()
            .flatten()
            .map(|e| e.file_name().to_string_lossy().to_string())
            .filter(|n| n.contains(".corrupted."))
            .collect();
        assert_eq!(quarantined.len(), 1);
        assert!(path.exists());
    }

    #[test]
    fn corrupted_file_without_backup_is_fatal_and_quarantined() {
        let td = tempfile::tempdir().unwrap();
        let store = test_store(td.path());
        let path = td.path().join("state.json");

        std::fs::write(&path, "not json at all").unwrap();
        let err = store.read_validated_json::<ExecutorState>(&path).unwrap_err();
        assert!(matches!(err, CoreError::CorruptedState { .. }));
        assert!(!path.exists());
    }

    #[test]
    fn semantically_invalid_json_is_treated_as_corruption() {
        let td = tempfile::tempdir().unwrap();
        let store = test_store(td.path());
        let path = td.path().join("state.json");

        // Parses fine, violates the completed-waves prefix invariant.
        std::fs::write(
            &path,
            "{\"current_wave\": 1, \"completed_waves\": [7], \"phase_id\": \"p\", \"timestamp\": \"t\"}",
        )
        .unwrap();
        let err = store.read_validated_json::<ExecutorState>(&path).unwrap_err();
        assert!(matches!(err, CoreError::CorruptedState { .. }));
    }

    #[test]
    fn refuses_to_write_invalid_state() {
        let td = tempfile::tempdir().unwrap();
        let store = test_store(td.path());
        let path = td.path().join("state.json");

        let mut state = ExecutorState::fresh("phase-1", "2026-01-01T00:00:00Z");
        state.completed_waves = vec![9];
        let err = store.write_validated_json(&path, &state).unwrap_err();
        assert!(matches!(err, CoreError::SchemaInvalid { .. }));
        assert!(!path.exists());
    }

    #[test]
    fn append_rotates_past_the_threshold_and_prunes_archives() {
        let td = tempfile::tempdir().unwrap();
        let mut config = RuntimeConfig::default();
        config.activity_max_bytes = 256;
        let clock = FixedClock(chrono::Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap());
        let store = DurableStore::new(td.path(), config, Arc::new(clock));
        let log = td.path().join("activity_stream.md");

        let long_line = "x".repeat(300);
        let rotated = store.append_with_rotation(&log, &long_line).unwrap();
        assert!(rotated.is_none());
        // Second append sees an oversized file and rotates first.
        let rotated = store.append_with_rotation(&log, "after rotation").unwrap();
        let archive_name = rotated.expect("second append should rotate");
        assert!(archive_name.starts_with("activity_stream_archive_"));

        let contents = std::fs::read_to_string(&log).unwrap();
        assert!(contents.contains("earlier entries continue in"));
        assert!(contents.contains("after rotation"));
        assert!(!contents.contains(&long_line));

        let archives: Vec<_> = std::fs::read_dir(td.path())
            .unwrap()
            .flatten()
            .map(|e| e.file_name().to_string_lossy().to_string())
            .filter(|n| n.starts_with("activity_stream_archive_"))
            .collect();
        assert_eq!(archives.len(), 1);
    }

    #[test]
    fn sweep_removes_orphaned_tmp_files() {
        let td = tempfile::tempdir().unwrap();
        let store = test_store(td.path());
        store.init_dirs().unwrap();

        std::fs::write(td.path().join("tasks.md.tmp"), "partial").unwrap();
        std::fs::write(
            wavefront_common::paths::state_dir(td.path()).join("plan.json.tmp"),
            "partial",
        )
        .unwrap();
        std::fs::write(td.path().join("tasks.md"), "keep me").unwrap();

        let removed = store.sweep_tmp_files().unwrap();
        assert_eq!(removed, 2);
        assert!(td.path().join("tasks.md").exists());
    }

    #[test]
    fn with_lock_serializes_writers() {
        let td = tempfile::tempdir().unwrap();
        let store = test_store(td.path());
        let target = td.path().join("tasks.md");

        let value = store
            .with_lock(&target, LockMode::Exclusive, || {
                store.write_atomic(&target, b"locked write")?;
                Ok(42)
            })
            .unwrap();
        assert_eq!(value, 42);
        assert_eq!(std::fs::read_to_string(&target).unwrap(), "locked write");
    }
}
