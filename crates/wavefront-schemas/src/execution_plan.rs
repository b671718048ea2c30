//! Execution plan schema.
//!
//! The plan is a derived, rebuildable artifact: `tasks.md` stays the source
//! of truth for status, the plan only fixes wave membership and ordering.
//! Top-level shape:
//!
//! ```json
//! { "execution_plan": { "phase_id": ..., "created_at": ..., "waves": [...] } }
//! ```

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

use crate::canonical::Validate;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
/// On-disk wrapper for `execution_plan.json`.
pub struct ExecutionPlanFile {
    /// The plan payload.
    pub execution_plan: ExecutionPlan,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
/// A dependency-ordered, conflict-free wave partition of a task list.
pub struct ExecutionPlan {
    /// Phase label the plan was orchestrated for.
    pub phase_id: String,
    /// ISO-8601 UTC creation timestamp (from the injected clock).
    pub created_at: String,
    /// Waves in execution order.
    pub waves: Vec<PlanWave>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
/// One wave of the plan.
pub struct PlanWave {
    /// Dense 1-based wave number.
    pub wave_id: u32,
    /// Launch strategy.
    pub strategy: PlanStrategy,
    /// Informational explanation.
    pub rationale: String,
    /// Tasks in source order.
    pub tasks: Vec<PlanTask>,
    /// Checkpoint gate for wave completion.
    pub checkpoint_after: CheckpointAfter,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
/// Wave launch strategy.
pub enum PlanStrategy {
    /// All tasks at once.
    #[serde(rename = "PARALLEL_SWARM")]
    ParallelSwarm,
    /// Strictly in order.
    #[serde(rename = "SEQUENTIAL_MERGE")]
    SequentialMerge,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
/// Whether a checkpoint must commit when the wave completes.
pub struct CheckpointAfter {
    /// Checkpoint enabled flag.
    pub enabled: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
/// One task reference inside a wave.
pub struct PlanTask {
    /// Stable task id.
    pub task_id: String,
    /// Worker profile name (empty when the task does not declare one).
    pub agent_role: String,
    /// Instruction handed to the worker, verbatim from the task line.
    pub instruction: String,
    /// Paths the task writes.
    pub file_locks: Vec<String>,
    /// Opaque rule tags passed through to the worker.
    pub constitution_rules: Vec<String>,
    /// Post-condition the worker must satisfy.
    pub completion_handshake: String,
    /// Ids this task depends on (including already-satisfied ones).
    pub dependencies: Vec<String>,
}

impl ExecutionPlanFile {
    /// All task ids in wave order.
    pub fn task_ids(&self) -> Vec<&str> {
        self.execution_plan
            .waves
            .iter()
            .flat_map(|w| w.tasks.iter().map(|t| t.task_id.as_str()))
            .collect()
    }

    /// Find the wave with the given id.
    pub fn wave(&self, wave_id: u32) -> Option<&PlanWave> {
        self.execution_plan
            .waves
            .iter()
            .find(|w| w.wave_id == wave_id)
    }
}

impl Validate for ExecutionPlanFile {
    fn validate(&self) -> Result<(), String> {
        let plan = &self.execution_plan;
        if plan.phase_id.trim().is_empty() {
            return Err("execution_plan.phase_id must not be empty".to_string());
        }
        if plan.created_at.trim().is_empty() {
            return Err("execution_plan.created_at must not be empty".to_string());
        }

        // Dense, 1-based wave ids in order.
        for (idx, wave) in plan.waves.iter().enumerate() {
            let expected = idx as u32 + 1;
            if wave.wave_id != expected {
                return Err(format!(
                    "wave ids must be dense starting at 1; position {idx} holds wave {}",
                    wave.wave_id
                ));
            }
            if wave.tasks.is_empty() {
                return Err(format!("wave {} has no tasks", wave.wave_id));
            }
        }

        // Every task id appears exactly once.
        let mut seen: BTreeSet<&str> = BTreeSet::new();
        for id in self.task_ids() {
            if !seen.insert(id) {
                return Err(format!("task {id} appears in more than one wave"));
            }
        }

        // Dependencies inside the plan must resolve to strictly earlier waves.
        let wave_of = |id: &str| -> Option<u32> {
            plan.waves
                .iter()
                .find(|w| w.tasks.iter().any(|t| t.task_id == id))
                .map(|w| w.wave_id)
        };
        for wave in &plan.waves {
            for task in &wave.tasks {
                if task.task_id.trim().is_empty() {
                    return Err(format!("wave {} has a task with an empty id", wave.wave_id));
                }
                for dep in &task.dependencies {
                    if let Some(dep_wave) = wave_of(dep)
                        && dep_wave >= wave.wave_id
                    {
                        return Err(format!(
                            "{} (wave {}) depends on {dep} (wave {dep_wave}); dependencies must land in earlier waves",
                            task.task_id, wave.wave_id
                        ));
                    }
                }
            }
        }

        // Parallel waves must be pairwise lock-disjoint.
        for wave in &plan.waves {
            if wave.strategy != PlanStrategy::ParallelSwarm {
                continue;
            }
            let mut locks: BTreeSet<&str> = BTreeSet::new();
            for task in &wave.tasks {
                for lock in &task.file_locks {
                    if !locks.insert(lock.as_str()) {
                        return Err(format!(
                            "wave {} is PARALLEL_SWARM but {lock} is written by more than one task",
                            wave.wave_id
                        ));
                    }
                }
            }
        }

        Ok(())
    }
}
