//! Canonical Wavefront path builders.
//!
//! These helpers consistently build paths under a project root so callers do
//! not duplicate `.join(".wavefront")` or ad-hoc string-based path formatting.
//!
//! Layout: the human-edited `tasks.md` lives at the project root; every
//! derived or internal file lives under `.wavefront/`.

use std::path::{Path, PathBuf};

/// Return the `.wavefront/` state directory under a project root.
pub fn state_dir(project_root: &Path) -> PathBuf {
    project_root.join(".wavefront")
}

/// Return the path to the human-edited task list.
pub fn tasks_md_path(project_root: &Path) -> PathBuf {
    project_root.join("tasks.md")
}

/// Return the path to the derived execution plan.
pub fn execution_plan_path(project_root: &Path) -> PathBuf {
    state_dir(project_root).join("execution_plan.json")
}

/// Return the path to the watchdog task registry.
pub fn task_timers_path(project_root: &Path) -> PathBuf {
    state_dir(project_root).join("task_timers.json")
}

/// Return the path to the wave executor's persistent state.
pub fn executor_state_path(project_root: &Path) -> PathBuf {
    state_dir(project_root).join("wave_executor_state.json")
}

/// Return the path to the append-only activity log.
pub fn activity_stream_path(project_root: &Path) -> PathBuf {
    state_dir(project_root).join("activity_stream.md")
}

/// Return the path to the last session snapshot.
pub fn session_snapshot_path(project_root: &Path) -> PathBuf {
    state_dir(project_root).join("session_snapshot.json")
}

/// Return the path to the watchdog daemon's PID-bearing lock file.
pub fn watchdog_lock_path(project_root: &Path) -> PathBuf {
    state_dir(project_root).join("task_watchdog.lock")
}

/// Return the path to the checkpoint coordinator's lock file.
pub fn checkpoint_lock_path(project_root: &Path) -> PathBuf {
    state_dir(project_root).join("checkpoint.lock")
}

/// Return the directory holding per-file sidecar locks.
pub fn locks_dir(project_root: &Path) -> PathBuf {
    state_dir(project_root).join("locks")
}

/// Return the sidecar lock path guarding mutations of `path`.
///
/// Lock files are sidecars rather than locks on the data files themselves:
/// the atomic-rename write protocol replaces inodes, which would detach a
/// lock held on the old descriptor.
pub fn sidecar_lock_path(project_root: &Path, path: &Path) -> PathBuf {
    let name = path
        .file_name()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_else(|| "unnamed".to_string());
    locks_dir(project_root).join(format!("{name}.lock"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn state_dir_is_dot_wavefront() {
        let root = PathBuf::from("/repo");
        assert_eq!(state_dir(&root), PathBuf::from("/repo/.wavefront"));
    }

    #[test]
    fn builders_join_expected_paths() {
        let root = PathBuf::from("/repo");

        assert_eq!(tasks_md_path(&root), PathBuf::from("/repo/tasks.md"));
        assert_eq!(
            execution_plan_path(&root),
            PathBuf::from("/repo/.wavefront/execution_plan.json")
        );
        assert_eq!(
            task_timers_path(&root),
            PathBuf::from("/repo/.wavefront/task_timers.json")
        );
        assert_eq!(
            executor_state_path(&root),
            PathBuf::from("/repo/.wavefront/wave_executor_state.json")
        );
        assert_eq!(
            activity_stream_path(&root),
            PathBuf::from("/repo/.wavefront/activity_stream.md")
        );
        assert_eq!(
            watchdog_lock_path(&root),
            PathBuf::from("/repo/.wavefront/task_watchdog.lock")
        );
        assert_eq!(
            checkpoint_lock_path(&root),
            PathBuf::from("/repo/.wavefront/checkpoint.lock")
        );
    }

    #[test]
    fn sidecar_lock_path_uses_file_name() {
        let root = PathBuf::from("/repo");
        let lock = sidecar_lock_path(&root, &tasks_md_path(&root));
        assert_eq!(lock, PathBuf::from("/repo/.wavefront/locks/tasks.md.lock"));
    }
}
