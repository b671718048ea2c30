//! Core orchestration behavior for Wavefront.
//!
//! `wavefront-core` implements the main logic behind the CLI: reading and
//! writing Wavefront state on disk through the durable store, orchestrating
//! task lists into execution plans, driving waves against worker processes,
//! and coordinating checkpoints.
//!
//! This crate is intentionally "policy heavy" but "UI light": it defines the
//! core semantics of commands without owning the CLI argument surface.

#![warn(missing_docs)]

/// Append-only activity log with rotation.
pub mod activity;

/// Checkpoint coordination (wave and micro checkpoints).
pub mod checkpoint;

/// Runtime configuration from environment variables.
pub mod config;

/// Core-layer error types and result alias.
pub mod errors;

/// Wave execution: consume, spawn, await, verify, checkpoint, advance.
pub mod executor;

/// Version-control collaborator (`stage` / `commit` / `reset_staging`).
pub mod git;

/// Optional issue-tracker reflector; failures are never fatal.
pub mod issues;

/// Orchestrate use-case: task list -> dependency graph -> execution plan.
pub mod orchestrate;

/// Process execution boundary and default runner.
pub mod process;

/// Durable store: locked, validated, atomic file state.
pub mod store;

/// Clock injection (`SystemClock`, `FixedClock`).
pub mod time;

/// Watchdog registry of running worker tasks.
pub mod watchdog;

/// Worker launch boundary.
pub mod worker;

pub use errors::{CoreError, CoreResult, ErrorClass};

// Re-export domain types the CLI needs so it does not have to depend on the
// domain crate directly.
pub use wavefront_domain::{TaskStatus, parse_task_list};
