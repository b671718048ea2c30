//! Parsing for Wavefront `tasks.md` task lists.
//!
//! The grammar is line-oriented. A task line is a dash bullet with a
//! bracketed status marker and a colon-separated id and description:
//!
//! ```text
//! - [ ] TASK-001: Implement login in `auth.py`
//! ```
//!
//! Indented sub-lines attach metadata to the task above them. Recognized
//! keys are `**Constitution**: RULE1, RULE2` and `**Agent**: role`.
//! Backticked paths in the description become candidate file locks, and the
//! textual patterns `after TASK-x` / `depends on TASK-x` become explicit
//! dependencies. Everything else is skipped silently.

use regex::Regex;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::LazyLock;

use super::DEFAULT_COMPLETION_HANDSHAKE;
use super::status::TaskStatus;
use crate::errors::{DomainError, DomainResult};

static DEP_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\b(?:after|depends\s+on)\s+(TASK-\d+)").unwrap());

static BACKTICK_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"`([^`]+)`").unwrap());

static CONSTITUTION_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\s+(?:[-*]\s+)?\*\*Constitution\*\*:\s*(.+?)\s*$").unwrap());

static AGENT_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\s+(?:[-*]\s+)?\*\*Agent\*\*:\s*(.+?)\s*$").unwrap());

#[derive(Debug, Clone, PartialEq, Eq)]
/// A task parsed from the task list, in source order.
pub struct TaskRecord {
    /// Stable identifier, e.g. `TASK-001`.
    pub id: String,
    /// Free-form description, verbatim from the source line.
    pub description: String,
    /// Current lifecycle status.
    pub status: TaskStatus,
    /// Normalized paths this task writes.
    pub file_locks: BTreeSet<String>,
    /// Ids of tasks that must be complete before this task may be claimed.
    pub dependencies: BTreeSet<String>,
    /// Opaque rule tags passed through to workers.
    pub constitution_rules: Vec<String>,
    /// Optional worker profile name.
    pub agent_role: Option<String>,
    /// Post-condition the worker must satisfy.
    pub completion_handshake: String,
    /// 0-based line index of the task line.
    pub line_index: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
/// Status counts computed from a parsed task list.
pub struct ProgressInfo {
    /// Total tasks.
    pub total: usize,
    /// Pending tasks.
    pub pending: usize,
    /// Consumed tasks.
    pub consumed: usize,
    /// Complete tasks.
    pub complete: usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
/// Output of parsing a task list.
pub struct TaskListParse {
    /// Parsed tasks in source order.
    pub tasks: Vec<TaskRecord>,
    /// Aggregate status counts.
    pub progress: ProgressInfo,
}

impl TaskListParse {
    /// Look up a task by id.
    pub fn task(&self, id: &str) -> Option<&TaskRecord> {
        self.tasks.iter().find(|t| t.id == id)
    }
}

/// Split a candidate task line into (marker, id, description).
///
/// Returns `None` for anything that is not a well-formed task line; such
/// lines are skipped silently by the parser.
fn split_task_line(line: &str) -> Option<(char, &str, &str)> {
    let l = line.trim_start();
    let bytes = l.as_bytes();
    if bytes.len() < 5 {
        return None;
    }
    if bytes[0] != b'-' || bytes[1] != b' ' || bytes[2] != b'[' || bytes[4] != b']' {
        return None;
    }
    let marker = bytes[3] as char;

    let rest = l[5..].trim_start();
    let (id, description) = rest.split_once(':')?;
    let id = id.trim();
    if !wavefront_common::id::is_task_id(id) {
        return None;
    }
    Some((marker, id, description.trim()))
}

/// Normalize a backticked path into a file-lock key.
///
/// Lock identity is textual: `./auth.py` and `auth.py` collide, separate
/// spellings of the same file through symlinks do not.
fn normalize_lock_path(raw: &str) -> Option<String> {
    let mut p = raw.trim();
    while let Some(stripped) = p.strip_prefix("./") {
        p = stripped;
    }
    let p = p.trim_end_matches('/');
    if p.is_empty() || p.contains(char::is_whitespace) {
        return None;
    }
    Some(p.to_string())
}

/// Parse a `tasks.md` task list into ordered task records.
///
/// Malformed and non-task lines are skipped silently. An empty input yields
/// an empty, valid result. Duplicate ids and references to undefined ids are
/// errors; self-references are dropped silently.
pub fn parse_task_list(contents: &str) -> DomainResult<TaskListParse> {
    let mut tasks: Vec<TaskRecord> = Vec::new();
    let mut seen: BTreeMap<String, usize> = BTreeMap::new();

    for (line_idx, line) in contents.lines().enumerate() {
        if let Some((marker, id, description)) = split_task_line(line) {
            let Some(status) = TaskStatus::from_marker(marker) else {
                // Unknown marker: not one of ours, skip the line.
                continue;
            };
            if seen.contains_key(id) {
                return Err(DomainError::DuplicateTaskId {
                    id: id.to_string(),
                    line: line_idx + 1,
                });
            }
            seen.insert(id.to_string(), tasks.len());

            let mut file_locks = BTreeSet::new();
            for cap in BACKTICK_RE.captures_iter(description) {
                if let Some(lock) = normalize_lock_path(&cap[1]) {
                    file_locks.insert(lock);
                }
            }

            let mut dependencies = BTreeSet::new();
            for cap in DEP_RE.captures_iter(description) {
                let reference = cap[1].to_string();
                if reference != id {
                    dependencies.insert(reference);
                }
            }

            tasks.push(TaskRecord {
                id: id.to_string(),
                description: description.to_string(),
                status,
                file_locks,
                dependencies,
                constitution_rules: Vec::new(),
                agent_role: None,
                completion_handshake: DEFAULT_COMPLETION_HANDSHAKE.to_string(),
                line_index: line_idx,
            });
            continue;
        }

        // Indented sub-lines attach to the task above them.
        let Some(current) = tasks.last_mut() else {
            continue;
        };
        if !line.starts_with(' ') && !line.starts_with('\t') {
            continue;
        }
        if let Some(cap) = CONSTITUTION_RE.captures(line) {
            current.constitution_rules = cap[1]
                .split(',')
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect();
            continue;
        }
        if let Some(cap) = AGENT_RE.captures(line) {
            current.agent_role = Some(cap[1].trim().to_string());
        }
    }

    // Dependency references must resolve against the full list.
    for task in &tasks {
        for reference in &task.dependencies {
            if !seen.contains_key(reference) {
                return Err(DomainError::UnknownDependency {
                    task_id: task.id.clone(),
                    reference: reference.clone(),
                });
            }
        }
    }

    let progress = compute_progress(&tasks);
    Ok(TaskListParse { tasks, progress })
}

fn compute_progress(tasks: &[TaskRecord]) -> ProgressInfo {
    let mut progress = ProgressInfo {
        total: tasks.len(),
        ..ProgressInfo::default()
    };
    for task in tasks {
        match task.status {
            TaskStatus::Pending => progress.pending += 1,
            TaskStatus::Consumed => progress.consumed += 1,
            TaskStatus::Complete => progress.complete += 1,
        }
    }
    progress
}
