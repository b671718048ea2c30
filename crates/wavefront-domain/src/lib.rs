//! Pure domain logic for Wavefront.
//!
//! `wavefront-domain` contains everything that can be computed without
//! touching the disk: the `tasks.md` grammar, the dependency analyzer, and
//! the wave planner. Filesystem-backed orchestration lives in
//! `wavefront-core`; this crate only ever sees strings and task records.

#![warn(missing_docs)]

/// Domain-layer error types and result alias.
pub mod errors;

/// Dependency graph construction and cycle detection.
pub mod graph;

/// Wave partitioning of a dependency-analyzed task list.
pub mod planner;

/// Task records, `tasks.md` parsing, and status updates.
pub mod tasks;

pub use errors::{DomainError, DomainResult};
pub use graph::DependencyGraph;
pub use planner::{PlannedWave, WaveStrategy, plan_waves};
pub use tasks::{TaskListParse, TaskRecord, TaskStatus, parse_task_list, set_task_marker};
