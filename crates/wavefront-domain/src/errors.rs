//! Domain-layer error types.

use thiserror::Error;

/// Result alias for domain-layer operations.
pub type DomainResult<T> = Result<T, DomainError>;

/// Error type used by domain parsing, analysis, and planning.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DomainError {
    /// The same task id appeared on more than one task line.
    #[error("duplicate task id {id} on line {line}; task ids must be unique")]
    DuplicateTaskId {
        /// The offending id.
        id: String,
        /// 1-based line number of the second occurrence.
        line: usize,
    },

    /// A task referenced a dependency id that no task line defines.
    #[error("{task_id} depends on unknown task {reference}")]
    UnknownDependency {
        /// The task carrying the reference.
        task_id: String,
        /// The id that could not be resolved.
        reference: String,
    },

    /// The dependency graph contains a cycle.
    #[error("dependency cycle: {path}")]
    DependencyCycle {
        /// Every participating task id, in cycle order.
        participants: Vec<String>,
        /// Rendered cycle, e.g. `TASK-001 -> TASK-002 -> TASK-001`.
        path: String,
    },

    /// A status change would violate the task lifecycle.
    #[error("{task_id}: illegal status transition {from} -> {to}")]
    InvalidTransition {
        /// The task being mutated.
        task_id: String,
        /// Current status label.
        from: &'static str,
        /// Requested status label.
        to: &'static str,
    },

    /// A task id was not found in the task list.
    #[error("task {id} not found in the task list")]
    TaskNotFound {
        /// The requested id.
        id: String,
    },
}
