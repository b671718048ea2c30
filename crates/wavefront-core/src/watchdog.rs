//! The task watchdog.
//!
//! The watchdog owns `task_timers.json`, the registry of running and
//! finished worker tasks. A daemonized instance holds a PID-bearing
//! exclusive lock (`task_watchdog.lock`) so at most one runs per project;
//! registry mutations themselves serialize through the durable store's
//! sidecar locks, so the executor can record registrations through the same
//! API the daemon uses.

use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use chrono::DateTime;
use wavefront_schemas::{
    WatchdogEntry, WatchdogEntryStatus, WatchdogMode, WatchdogRegistry,
};

use crate::errors::{CoreError, CoreResult};
use crate::store::{DurableStore, FileLockGuard, LockMode};
use crate::time::iso8601;

/// Failure reason recorded when a running entry outlives the stale
/// threshold across a restart.
pub const STALE_REASON: &str = "stale_on_recovery";

/// Registry API over the durable store.
pub struct Watchdog<'a> {
    store: &'a DurableStore,
}

impl<'a> Watchdog<'a> {
    /// Create a registry handle over `store`.
    pub fn new(store: &'a DurableStore) -> Self {
        Self { store }
    }

    fn registry_path(&self) -> PathBuf {
        wavefront_common::paths::task_timers_path(self.store.root())
    }

    fn load_or_default(&self) -> CoreResult<WatchdogRegistry> {
        match self.store.read_validated_json(&self.registry_path()) {
            Ok(registry) => Ok(registry),
            Err(CoreError::NotFound(_)) => Ok(WatchdogRegistry::default()),
            Err(e) => Err(e),
        }
    }

    fn mutate<T>(
        &self,
        f: impl FnOnce(&mut WatchdogRegistry) -> CoreResult<T>,
    ) -> CoreResult<T> {
        let path = self.registry_path();
        self.store.with_lock(&path, LockMode::Exclusive, || {
            let mut registry = self.load_or_default()?;
            let out = f(&mut registry)?;
            self.store.write_validated_json(&path, &registry)?;
            Ok(out)
        })
    }

    /// Register a task as running.
    ///
    /// Registering an id that is already present updates its command and
    /// rules in place rather than duplicating the entry, and re-arms it as
    /// running.
    pub fn register(
        &self,
        task_id: &str,
        mode: WatchdogMode,
        command: &str,
        rules: &[String],
    ) -> CoreResult<()> {
        if !wavefront_common::id::is_safe_id_segment(task_id) {
            return Err(CoreError::validation(format!(
                "refusing to register unsafe task id {task_id:?}"
            )));
        }
        let now = iso8601(self.store.clock().now_utc());
        self.mutate(|registry| {
            let entry = registry
                .tasks
                .entry(task_id.to_string())
                .or_insert_with(|| WatchdogEntry {
                    task_id: task_id.to_string(),
                    mode,
                    command: command.to_string(),
                    status: WatchdogEntryStatus::Running,
                    started_at: now.clone(),
                    completed_at: None,
                    constitution_rules: rules.to_vec(),
                    last_heartbeat_at: None,
                    failure_reason: None,
                });
            entry.mode = mode;
            entry.command = command.to_string();
            entry.constitution_rules = rules.to_vec();
            entry.status = WatchdogEntryStatus::Running;
            entry.started_at = now.clone();
            entry.completed_at = None;
            entry.last_heartbeat_at = None;
            entry.failure_reason = None;
            Ok(())
        })
    }

    /// Record a heartbeat for a running task.
    pub fn heartbeat(&self, task_id: &str) -> CoreResult<()> {
        let now = iso8601(self.store.clock().now_utc());
        self.mutate(|registry| {
            let Some(entry) = registry.tasks.get_mut(task_id) else {
                return Err(CoreError::not_found(format!(
                    "{task_id} is not registered with the watchdog"
                )));
            };
            entry.last_heartbeat_at = Some(now.clone());
            Ok(())
        })
    }

    /// Record a worker's terminal state.
    pub fn complete(
        &self,
        task_id: &str,
        success: bool,
        failure_reason: Option<&str>,
    ) -> CoreResult<()> {
        let now = iso8601(self.store.clock().now_utc());
        self.mutate(|registry| {
            let Some(entry) = registry.tasks.get_mut(task_id) else {
                return Err(CoreError::not_found(format!(
                    "{task_id} is not registered with the watchdog"
                )));
            };
            entry.status = if success {
                WatchdogEntryStatus::Completed
            } else {
                WatchdogEntryStatus::Failed
            };
            entry.completed_at = Some(now.clone());
            entry.failure_reason = failure_reason.map(str::to_string);
            Ok(())
        })
    }

    /// Entries currently believed to be running.
    pub fn list_running(&self) -> CoreResult<Vec<WatchdogEntry>> {
        Ok(self.snapshot()?.running().cloned().collect())
    }

    /// The full registry as last persisted.
    ///
    /// Readers tolerate staleness bounded by the last atomic rename; no lock
    /// is taken.
    pub fn snapshot(&self) -> CoreResult<WatchdogRegistry> {
        self.load_or_default()
    }

    /// Fail running entries older than the stale threshold.
    ///
    /// Age is measured from the most recent sign of life (heartbeat, else
    /// registration). Returns the ids that were transitioned.
    pub fn recover_stale(&self) -> CoreResult<Vec<String>> {
        let threshold = self.store.config().stale_task_threshold;
        let now = self.store.clock().now_utc();
        self.mutate(|registry| {
            let mut recovered = Vec::new();
            for entry in registry.tasks.values_mut() {
                if entry.status != WatchdogEntryStatus::Running {
                    continue;
                }
                let last_alive = entry
                    .last_heartbeat_at
                    .as_deref()
                    .unwrap_or(&entry.started_at);
                let Ok(parsed) = DateTime::parse_from_rfc3339(last_alive) else {
                    continue;
                };
                let age = now.signed_duration_since(parsed.with_timezone(&chrono::Utc));
                if age.num_seconds() >= 0 && age.num_seconds() as u64 >= threshold.as_secs() {
                    entry.status = WatchdogEntryStatus::Failed;
                    entry.completed_at = Some(iso8601(now));
                    entry.failure_reason = Some(STALE_REASON.to_string());
                    recovered.push(entry.task_id.clone());
                }
            }
            if !recovered.is_empty() {
                tracing::warn!("failed stale watchdog entries: {}", recovered.join(", "));
            }
            Ok(recovered)
        })
    }
}

/// Acquire the single-instance daemon lock, recording the holder's PID.
///
/// Fails with `LockBusy` when another instance already holds it.
pub fn acquire_daemon_lock(store: &DurableStore) -> CoreResult<FileLockGuard> {
    let lock_path = wavefront_common::paths::watchdog_lock_path(store.root());
    let mut guard = store
        .try_acquire_lock(&lock_path, LockMode::Exclusive)
        .map_err(|e| match e {
            CoreError::LockBusy { .. } => CoreError::LockBusy {
                resource: "task_watchdog.lock (another watchdog instance is running)".to_string(),
            },
            other => other,
        })?;
    guard.write_pid()?;
    Ok(guard)
}

/// Run the watchdog daemon until `shutdown` is set.
///
/// Holds the instance lock for its whole lifetime, fails stale entries on
/// startup, and re-sweeps every `sweep_interval`.
pub fn run_daemon(
    store: &DurableStore,
    shutdown: Arc<AtomicBool>,
    sweep_interval: Duration,
) -> CoreResult<()> {
    let _lock = acquire_daemon_lock(store)?;
    let watchdog = Watchdog::new(store);

    let recovered = watchdog.recover_stale()?;
    if !recovered.is_empty() {
        tracing::info!("startup recovery failed {} stale task(s)", recovered.len());
    }

    while !shutdown.load(Ordering::SeqCst) {
        std::thread::sleep(Duration::from_millis(200).min(sweep_interval));
        watchdog.recover_stale()?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RuntimeConfig;
    use crate::time::FixedClock;
    use chrono::TimeZone;

    fn store_at(root: &std::path::Path, at: chrono::DateTime<chrono::Utc>) -> DurableStore {
        DurableStore::new(root, RuntimeConfig::default(), Arc::new(FixedClock(at)))
    }

    fn t0() -> chrono::DateTime<chrono::Utc> {
        chrono::Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap()
    }

    #[test]
    fn register_then_complete_round_trip() {
        let td = tempfile::tempdir().unwrap();
        let store = store_at(td.path(), t0());
        let watchdog = Watchdog::new(&store);

        watchdog
            .register("TASK-001", WatchdogMode::Subprocess, "worker TASK-001", &[])
            .unwrap();
        let running = watchdog.list_running().unwrap();
        assert_eq!(running.len(), 1);
        assert_eq!(running[0].task_id, "TASK-001");

        watchdog.complete("TASK-001", true, None).unwrap();
        assert!(watchdog.list_running().unwrap().is_empty());
        let snapshot = watchdog.snapshot().unwrap();
        let entry = &snapshot.tasks["TASK-001"];
        assert_eq!(entry.status, WatchdogEntryStatus::Completed);
        assert!(entry.completed_at.is_some());
    }

    #[test]
    fn re_registering_updates_in_place() {
        let td = tempfile::tempdir().unwrap();
        let store = store_at(td.path(), t0());
        let watchdog = Watchdog::new(&store);

        watchdog
            .register("TASK-001", WatchdogMode::Subprocess, "worker v1", &[])
            .unwrap();
        watchdog.complete("TASK-001", false, Some("exit 1")).unwrap();
        watchdog
            .register(
                "TASK-001",
                WatchdogMode::Subprocess,
                "worker v2",
                &["RULE-A".to_string()],
            )
            .unwrap();

        let snapshot = watchdog.snapshot().unwrap();
        assert_eq!(snapshot.tasks.len(), 1);
        let entry = &snapshot.tasks["TASK-001"];
        assert_eq!(entry.command, "worker v2");
        assert_eq!(entry.constitution_rules, vec!["RULE-A"]);
        assert_eq!(entry.status, WatchdogEntryStatus::Running);
        assert!(entry.failure_reason.is_none());
    }

    #[test]
    fn heartbeat_requires_registration() {
        let td = tempfile::tempdir().unwrap();
        let store = store_at(td.path(), t0());
        let watchdog = Watchdog::new(&store);
        assert!(matches!(
            watchdog.heartbeat("TASK-404"),
            Err(CoreError::NotFound(_))
        ));
    }

    #[test]
    fn stale_running_entries_fail_on_recovery() {
        let td = tempfile::tempdir().unwrap();

        // Register at t0...
        let store = store_at(td.path(), t0());
        Watchdog::new(&store)
            .register("TASK-001", WatchdogMode::Subprocess, "worker", &[])
            .unwrap();

        // ...recover two hours later with a one-hour threshold.
        let later = t0() + chrono::Duration::hours(2);
        let store = store_at(td.path(), later);
        let recovered = Watchdog::new(&store).recover_stale().unwrap();
        assert_eq!(recovered, vec!["TASK-001"]);

        let snapshot = Watchdog::new(&store).snapshot().unwrap();
        let entry = &snapshot.tasks["TASK-001"];
        assert_eq!(entry.status, WatchdogEntryStatus::Failed);
        assert_eq!(entry.failure_reason.as_deref(), Some(STALE_REASON));
    }

    #[test]
    fn fresh_entries_survive_recovery() {
        let td = tempfile::tempdir().unwrap();
        let store = store_at(td.path(), t0());
        Watchdog::new(&store)
            .register("TASK-001", WatchdogMode::Subprocess, "worker", &[])
            .unwrap();
        let recovered = Watchdog::new(&store).recover_stale().unwrap();
        assert!(recovered.is_empty());
    }

    #[test]
    fn daemon_lock_is_single_instance() {
        let td = tempfile::tempdir().unwrap();
        let store = store_at(td.path(), t0());

        let first = acquire_daemon_lock(&store).unwrap();
        let second = acquire_daemon_lock(&store);
        assert!(matches!(second, Err(CoreError::LockBusy { .. })));
        drop(first);
        assert!(acquire_daemon_lock(&store).is_ok());
    }
}
