//! Advisory file locking.
//!
//! Locks are `fs2` advisory locks on dedicated lock files (single host).
//! Acquisition is bounded: try immediately, then poll until the deadline.

use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use fs2::FileExt;

use crate::errors::{CoreError, CoreResult};

/// Interval between lock acquisition attempts.
const RETRY_INTERVAL: Duration = Duration::from_millis(25);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
/// Lock sharing mode.
pub enum LockMode {
    /// Concurrent readers allowed.
    Shared,
    /// Single writer.
    Exclusive,
}

/// A held advisory lock. Released on drop.
#[derive(Debug)]
pub struct FileLockGuard {
    file: File,
    path: PathBuf,
}

impl FileLockGuard {
    /// Path of the lock file this guard holds.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Record the holder's PID in the lock file (used by daemon locks so
    /// operators can see who is holding on).
    pub fn write_pid(&mut self) -> CoreResult<()> {
        let pid = std::process::id();
        self.file.set_len(0).map_err(|e| {
            CoreError::io(format!("truncating {}", self.path.display()), e)
        })?;
        writeln!(self.file, "{pid}")
            .map_err(|e| CoreError::io(format!("writing pid to {}", self.path.display()), e))
    }
}

impl Drop for FileLockGuard {
    fn drop(&mut self) {
        let _ = fs2::FileExt::unlock(&self.file);
    }
}

fn resource_name(path: &Path) -> String {
    path.file_name()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_else(|| path.display().to_string())
}

fn open_lock_file(path: &Path) -> CoreResult<File> {
    if let Some(parent) = path.parent() {
        wavefront_common::io::create_dir_all(parent)
            .map_err(|e| CoreError::io(format!("creating {}", parent.display()), e))?;
    }
    OpenOptions::new()
        .read(true)
        .write(true)
        .create(true)
        .truncate(false)
        .open(path)
        .map_err(|e| CoreError::io(format!("opening lock file {}", path.display()), e))
}

fn try_lock(file: &File, mode: LockMode) -> std::io::Result<()> {
    // Fully qualified: std::fs::File grew inherent lock methods with
    // different signatures, and they must not shadow the fs2 ones.
    match mode {
        LockMode::Shared => FileExt::try_lock_shared(file),
        LockMode::Exclusive => FileExt::try_lock_exclusive(file),
    }
}

/// Acquire the lock at `path`, waiting up to `timeout`.
pub fn acquire(path: &Path, mode: LockMode, timeout: Duration) -> CoreResult<FileLockGuard> {
    let file = open_lock_file(path)?;
    let started = Instant::now();
    loop {
        match try_lock(&file, mode) {
            Ok(()) => {
                return Ok(FileLockGuard {
                    file,
                    path: path.to_path_buf(),
                });
            }
            Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => {
                let waited = started.elapsed();
                if waited >= timeout {
                    return Err(CoreError::LockTimeout {
                        resource: resource_name(path),
                        waited_ms: waited.as_millis() as u64,
                    });
                }
                std::thread::sleep(RETRY_INTERVAL.min(timeout - waited));
            }
            Err(e) => {
                return Err(CoreError::io(
                    format!("locking {}", path.display()),
                    e,
                ));
            }
        }
    }
}

/// Acquire the lock at `path` without waiting.
///
/// Contention is `LockBusy` rather than `LockTimeout`: the caller asked for
/// an immediate answer.
pub fn try_acquire(path: &Path, mode: LockMode) -> CoreResult<FileLockGuard> {
    let file = open_lock_file(path)?;
    match try_lock(&file, mode) {
        Ok(()) => Ok(FileLockGuard {
            file,
            path: path.to_path_buf(),
        }),
        Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => Err(CoreError::LockBusy {
            resource: resource_name(path),
        }),
        Err(e) => Err(CoreError::io(format!("locking {}", path.display()), e)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exclusive_lock_blocks_second_holder() {
        let td = tempfile::tempdir().unwrap();
        let lock_path = td.path().join("test.lock");

        let guard = try_acquire(&lock_path, LockMode::Exclusive).unwrap();
        let second = acquire(&lock_path, LockMode::Exclusive, Duration::from_millis(80));
        assert!(matches!(second, Err(CoreError::LockTimeout { .. })));
        drop(guard);

        let third = acquire(&lock_path, LockMode::Exclusive, Duration::from_millis(80));
        assert!(third.is_ok());
    }

    #[test]
    fn shared_locks_coexist() {
        let td = tempfile::tempdir().unwrap();
        let lock_path = td.path().join("test.lock");

        let first = try_acquire(&lock_path, LockMode::Shared).unwrap();
        let second = try_acquire(&lock_path, LockMode::Shared);
        assert!(second.is_ok());
        drop(first);
    }

    #[test]
    fn try_acquire_reports_busy_immediately() {
        let td = tempfile::tempdir().unwrap();
        let lock_path = td.path().join("test.lock");

        let _guard = try_acquire(&lock_path, LockMode::Exclusive).unwrap();
        let second = try_acquire(&lock_path, LockMode::Exclusive);
        assert!(matches!(second, Err(CoreError::LockBusy { .. })));
    }
}
