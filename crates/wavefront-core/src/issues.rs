//! Issue-tracker collaborator.
//!
//! The tracker is an idempotent external reflector of the task list: tasks
//! can be synced out and closed as they complete. Failures are logged and
//! never fatal; the core works the same with no tracker at all.

use std::collections::BTreeMap;

use wavefront_schemas::PlanTask;

/// Optional external issue tracker.
pub trait IssueTracker: Send + Sync {
    /// Reflect `tasks` into the tracker, returning task id -> issue id.
    fn sync(&self, tasks: &[PlanTask]) -> Result<BTreeMap<String, String>, String>;

    /// Close the issue for a completed task.
    fn close(&self, task_id: &str) -> Result<(), String>;
}

/// Tracker used when no issue tracker is configured. Does nothing.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullIssueTracker;

impl IssueTracker for NullIssueTracker {
    fn sync(&self, _tasks: &[PlanTask]) -> Result<BTreeMap<String, String>, String> {
        Ok(BTreeMap::new())
    }

    fn close(&self, _task_id: &str) -> Result<(), String> {
        Ok(())
    }
}

/// Close a task's issue, logging instead of failing.
pub fn close_best_effort(tracker: &dyn IssueTracker, task_id: &str) {
    if let Err(e) = tracker.close(task_id) {
        tracing::warn!("issue tracker close for {task_id} failed: {e}");
    }
}

/// Sync tasks to the tracker, logging instead of failing.
pub fn sync_best_effort(tracker: &dyn IssueTracker, tasks: &[PlanTask]) {
    if let Err(e) = tracker.sync(tasks) {
        tracing::warn!("issue tracker sync failed: {e}");
    }
}
