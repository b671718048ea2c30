//! Checkpoint coordination.
//!
//! Two classes of checkpoint exist: wave checkpoints fired by the executor
//! after verification, and opportunistic micro-checkpoints that shrink the
//! window of uncommitted state. Both serialize on `checkpoint.lock`; the
//! holder stages the state files and commits through the version-control
//! collaborator, rolling the staging area back if the commit fails.

use std::path::PathBuf;
use std::time::Duration;

use crate::activity::{ActivityKind, ActivityLog};
use crate::errors::{CoreError, CoreResult};
use crate::git::VersionControl;
use crate::store::{DurableStore, LockMode};

/// How long a micro-checkpoint waits for the coordinator lock before giving
/// up with `CheckpointBusy`.
pub const MICRO_CHECKPOINT_WAIT: Duration = Duration::from_secs(30);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
/// Which class of checkpoint is being committed.
pub enum CheckpointKind {
    /// Fired after a wave verifies.
    Wave,
    /// Fired opportunistically between task completions.
    Micro,
}

impl CheckpointKind {
    /// Label used in commit messages and the activity log.
    pub fn as_str(self) -> &'static str {
        match self {
            CheckpointKind::Wave => "checkpoint",
            CheckpointKind::Micro => "micro-checkpoint",
        }
    }
}

#[derive(Debug, Clone)]
/// Result of a committed checkpoint.
pub struct CheckpointOutcome {
    /// Commit identifier from the version-control collaborator.
    pub commit: String,
}

/// Serializes checkpoint commits over one lock.
pub struct CheckpointCoordinator<'a> {
    store: &'a DurableStore,
    vcs: &'a dyn VersionControl,
    micro_wait: Duration,
}

impl<'a> CheckpointCoordinator<'a> {
    /// Create a coordinator over `store` committing through `vcs`.
    pub fn new(store: &'a DurableStore, vcs: &'a dyn VersionControl) -> Self {
        Self {
            store,
            vcs,
            micro_wait: MICRO_CHECKPOINT_WAIT,
        }
    }

    /// Override how long micro-checkpoints wait for the lock (tests).
    pub fn with_micro_wait(mut self, wait: Duration) -> Self {
        self.micro_wait = wait;
        self
    }

    /// Commit a wave checkpoint, waiting the full lock timeout if needed.
    pub fn wave_checkpoint(&self, message: &str) -> CoreResult<CheckpointOutcome> {
        let lock_path = wavefront_common::paths::checkpoint_lock_path(self.store.root());
        let _guard = self.store.acquire_lock(
            &lock_path,
            LockMode::Exclusive,
            self.store.config().lock_timeout,
        )?;
        self.commit_locked(CheckpointKind::Wave, message)
    }

    /// Commit a micro-checkpoint, blocking at most [`MICRO_CHECKPOINT_WAIT`]
    /// (or the override from [`Self::with_micro_wait`]).
    ///
    /// Contention past the wait returns `CheckpointBusy` without touching
    /// the working tree; callers treat that as non-fatal.
    pub fn micro_checkpoint(&self, message: &str) -> CoreResult<CheckpointOutcome> {
        let lock_path = wavefront_common::paths::checkpoint_lock_path(self.store.root());
        let guard = self
            .store
            .acquire_lock(&lock_path, LockMode::Exclusive, self.micro_wait);
        let _guard = match guard {
            Ok(guard) => guard,
            Err(CoreError::LockTimeout { .. } | CoreError::LockBusy { .. }) => {
                return Err(CoreError::CheckpointBusy);
            }
            Err(other) => return Err(other),
        };
        self.commit_locked(CheckpointKind::Micro, message)
    }

    fn commit_locked(&self, kind: CheckpointKind, message: &str) -> CoreResult<CheckpointOutcome> {
        let paths = self.state_paths();
        self.vcs.stage(&paths)?;

        match self.vcs.commit(&format!("{}: {message}", kind.as_str())) {
            Ok(commit) => {
                let activity = ActivityLog::new(self.store);
                let activity_kind = match kind {
                    CheckpointKind::Wave => ActivityKind::CheckpointCommitted,
                    CheckpointKind::Micro => ActivityKind::MicroCheckpoint,
                };
                activity.record(activity_kind, &format!("{commit} {message}"));
                Ok(CheckpointOutcome { commit })
            }
            Err(e) => {
                if let Err(reset_err) = self.vcs.reset_staging() {
                    tracing::warn!("staging rollback after failed commit also failed: {reset_err}");
                }
                Err(e)
            }
        }
    }

    /// The state files a checkpoint snapshots (existing ones only).
    fn state_paths(&self) -> Vec<PathBuf> {
        let root = self.store.root();
        [
            wavefront_common::paths::tasks_md_path(root),
            wavefront_common::paths::execution_plan_path(root),
            wavefront_common::paths::task_timers_path(root),
            wavefront_common::paths::executor_state_path(root),
            wavefront_common::paths::activity_stream_path(root),
            wavefront_common::paths::session_snapshot_path(root),
        ]
        .into_iter()
        .filter(|p| p.exists())
        .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RuntimeConfig;
    use crate::git::RecordingVersionControl;
    use crate::time::FixedClock;
    use chrono::TimeZone;
    use std::sync::Arc;

    fn test_store(root: &std::path::Path) -> DurableStore {
        let clock = FixedClock(chrono::Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap());
        DurableStore::new(root, RuntimeConfig::default(), Arc::new(clock))
    }

    #[test]
    fn wave_checkpoint_stages_existing_state_and_commits() {
        let td = tempfile::tempdir().unwrap();
        let store = test_store(td.path());
        std::fs::write(td.path().join("tasks.md"), "- [x] TASK-001: Done\n").unwrap();

        let vcs = RecordingVersionControl::new();
        let coordinator = CheckpointCoordinator::new(&store, &vcs);
        let outcome = coordinator.wave_checkpoint("wave 1 verified").unwrap();

        assert_eq!(outcome.commit, "commit0001");
        assert_eq!(vcs.commits(), vec!["checkpoint: wave 1 verified"]);
        let staged = vcs.staged();
        assert_eq!(staged.len(), 1);
        assert!(staged[0].iter().any(|p| p.ends_with("tasks.md")));
    }

    #[test]
    fn failed_commit_rolls_back_staging() {
        let td = tempfile::tempdir().unwrap();
        let store = test_store(td.path());
        let vcs = RecordingVersionControl::new();
        vcs.fail_next_commit();

        let coordinator = CheckpointCoordinator::new(&store, &vcs);
        let err = coordinator.wave_checkpoint("wave 1 verified").unwrap_err();
        assert!(matches!(err, CoreError::External { .. }));
        assert_eq!(vcs.resets(), 1);
        assert!(vcs.commits().is_empty());
    }

    #[test]
    fn micro_checkpoint_reports_busy_while_wave_checkpoint_holds_the_lock() {
        let td = tempfile::tempdir().unwrap();
        let store = test_store(td.path());
        let vcs = RecordingVersionControl::new();
        // Short wait so the contended path is exercised without the full
        // 30 s window.
        let coordinator =
            CheckpointCoordinator::new(&store, &vcs).with_micro_wait(Duration::from_millis(80));

        // Hold the coordinator lock as a wave checkpoint would.
        let lock_path = wavefront_common::paths::checkpoint_lock_path(td.path());
        let guard = store
            .try_acquire_lock(&lock_path, LockMode::Exclusive)
            .unwrap();

        let err = coordinator.micro_checkpoint("mid-wave save").unwrap_err();
        assert!(matches!(err, CoreError::CheckpointBusy));
        // The working tree was never touched.
        assert!(vcs.staged().is_empty());
        assert!(vcs.commits().is_empty());
        drop(guard);

        // Lock released: the micro-checkpoint proceeds.
        let outcome = coordinator.micro_checkpoint("mid-wave save").unwrap();
        assert_eq!(outcome.commit, "commit0001");
        assert_eq!(vcs.commits(), vec!["micro-checkpoint: mid-wave save"]);
    }

    #[test]
    fn checkpoint_records_commit_in_activity_log() {
        let td = tempfile::tempdir().unwrap();
        let store = test_store(td.path());
        let vcs = RecordingVersionControl::new();
        CheckpointCoordinator::new(&store, &vcs)
            .wave_checkpoint("wave 1 verified")
            .unwrap();

        let log = wavefront_common::paths::activity_stream_path(td.path());
        let contents = std::fs::read_to_string(log).unwrap();
        assert!(contents.contains("**checkpoint_committed** commit0001"));
    }
}
