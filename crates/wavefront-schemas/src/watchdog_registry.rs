//! Watchdog registry schema.
//!
//! `task_timers.json` maps task ids to watchdog entries. Only the watchdog
//! writes it; readers tolerate staleness bounded by the last atomic rename.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::canonical::Validate;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
/// How the worker for a task runs.
pub enum WatchdogMode {
    /// In the supervising process.
    Native,
    /// As a spawned child process.
    Subprocess,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
/// Terminal and non-terminal worker states tracked by the watchdog.
pub enum WatchdogEntryStatus {
    /// Worker is (believed to be) running.
    Running,
    /// Worker exited successfully.
    Completed,
    /// Worker exited non-zero, timed out, or went stale.
    Failed,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
/// One registered task in the watchdog registry.
pub struct WatchdogEntry {
    /// Task id this entry belongs to.
    pub task_id: String,
    /// Execution mode.
    pub mode: WatchdogMode,
    /// Opaque worker command line.
    pub command: String,
    /// Current status.
    pub status: WatchdogEntryStatus,
    /// ISO-8601 UTC registration time.
    pub started_at: String,
    /// ISO-8601 UTC completion time, when terminal.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<String>,
    /// Opaque rule tags the worker was handed.
    pub constitution_rules: Vec<String>,
    /// ISO-8601 UTC time of the last heartbeat, when any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_heartbeat_at: Option<String>,
    /// Reason recorded on failure (e.g. `stale_on_recovery`).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failure_reason: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
/// On-disk shape of `task_timers.json`.
pub struct WatchdogRegistry {
    /// Entries keyed by task id.
    pub tasks: BTreeMap<String, WatchdogEntry>,
}

impl WatchdogRegistry {
    /// Entries currently in `running` status, in key order.
    pub fn running(&self) -> impl Iterator<Item = &WatchdogEntry> {
        self.tasks
            .values()
            .filter(|e| e.status == WatchdogEntryStatus::Running)
    }
}

impl Validate for WatchdogRegistry {
    fn validate(&self) -> Result<(), String> {
        for (key, entry) in &self.tasks {
            if *key != entry.task_id {
                return Err(format!(
                    "registry key {key} does not match entry task_id {}",
                    entry.task_id
                ));
            }
            if entry.task_id.trim().is_empty() {
                return Err("registry contains an entry with an empty task_id".to_string());
            }
            if entry.started_at.trim().is_empty() {
                return Err(format!("entry {key} is missing started_at"));
            }
            let terminal = matches!(
                entry.status,
                WatchdogEntryStatus::Completed | WatchdogEntryStatus::Failed
            );
            if !terminal && entry.completed_at.is_some() {
                return Err(format!("running entry {key} must not carry completed_at"));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(id: &str, status: WatchdogEntryStatus) -> WatchdogEntry {
        WatchdogEntry {
            task_id: id.to_string(),
            mode: WatchdogMode::Subprocess,
            command: "worker --task".to_string(),
            status,
            started_at: "2026-01-01T00:00:00Z".to_string(),
            completed_at: None,
            constitution_rules: Vec::new(),
            last_heartbeat_at: None,
            failure_reason: None,
        }
    }

    #[test]
    fn key_must_match_task_id() {
        let mut registry = WatchdogRegistry::default();
        registry
            .tasks
            .insert("TASK-001".to_string(), entry("TASK-002", WatchdogEntryStatus::Running));
        assert!(registry.validate().is_err());
    }

    #[test]
    fn running_entries_must_not_carry_completed_at() {
        let mut registry = WatchdogRegistry::default();
        let mut e = entry("TASK-001", WatchdogEntryStatus::Running);
        e.completed_at = Some("2026-01-01T00:01:00Z".to_string());
        registry.tasks.insert("TASK-001".to_string(), e);
        assert!(registry.validate().is_err());
    }

    #[test]
    fn status_labels_are_lowercase_on_the_wire() {
        let json = serde_json::to_string(&WatchdogEntryStatus::Running).unwrap();
        assert_eq!(json, "\"running\"");
        let json = serde_json::to_string(&WatchdogMode::Subprocess).unwrap();
        assert_eq!(json, "\"subprocess\"");
    }

    #[test]
    fn running_iterator_filters_terminal_entries() {
        let mut registry = WatchdogRegistry::default();
        registry
            .tasks
            .insert("TASK-001".to_string(), entry("TASK-001", WatchdogEntryStatus::Running));
        registry
            .tasks
            .insert("TASK-002".to_string(), entry("TASK-002", WatchdogEntryStatus::Completed));
        let running: Vec<&str> = registry.running().map(|e| e.task_id.as_str()).collect();
        assert_eq!(running, vec!["TASK-001"]);
    }
}
