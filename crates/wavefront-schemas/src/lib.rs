//! Serde models for Wavefront's on-disk formats.
//!
//! This crate exists to keep JSON schema structs shared across crates
//! (e.g. `wavefront-core`, `wavefront-cli`). Every model carries a semantic
//! `validate()` so the durable store can reject structurally-valid JSON that
//! breaks plan or state invariants.

#![warn(missing_docs)]

/// Canonical JSON rendering and the shared `Validate` trait.
pub mod canonical;

/// Execution plan schema (`execution_plan.json`).
pub mod execution_plan;

/// Wave executor state schema (`wave_executor_state.json`).
pub mod executor_state;

/// Session snapshot schema (`session_snapshot.json`).
pub mod session;

/// Watchdog registry schema (`task_timers.json`).
pub mod watchdog_registry;

pub use canonical::{Validate, to_canonical_json};
pub use execution_plan::{
    CheckpointAfter, ExecutionPlan, ExecutionPlanFile, PlanStrategy, PlanTask, PlanWave,
};
pub use executor_state::ExecutorState;
pub use session::SessionSnapshot;
pub use watchdog_registry::{WatchdogEntry, WatchdogEntryStatus, WatchdogMode, WatchdogRegistry};
