//! The orchestrate use-case.
//!
//! Parse `tasks.md`, infer the dependency graph, partition the open tasks
//! into waves, and serialize the canonical execution plan. The plan is a
//! derived artifact; re-running on an unchanged task list (with the same
//! injected clock) produces byte-identical output.

use wavefront_domain::graph::build_graph;
use wavefront_domain::planner::{WaveStrategy, plan_waves};
use wavefront_domain::tasks::{TaskRecord, TaskStatus, parse_task_list};
use wavefront_schemas::{
    CheckpointAfter, ExecutionPlan, ExecutionPlanFile, PlanStrategy, PlanTask, PlanWave,
};

use crate::activity::{ActivityKind, ActivityLog};
use crate::errors::{CoreError, CoreResult};
use crate::store::{DurableStore, LockMode};
use crate::time::iso8601;

#[derive(Debug, Clone)]
/// Result of a successful orchestration.
pub struct OrchestrateOutcome {
    /// The plan that was written.
    pub plan: ExecutionPlanFile,
    /// Number of waves planned.
    pub wave_count: usize,
    /// Number of open tasks planned.
    pub task_count: usize,
}

/// Orchestrate the task list into `execution_plan.json` for `phase_id`.
///
/// Only tasks that are not yet complete are planned; a list with nothing
/// open produces a valid plan with zero waves. Dependency cycles and
/// malformed task lists fail before any file is written.
pub fn orchestrate(store: &DurableStore, phase_id: &str) -> CoreResult<OrchestrateOutcome> {
    if phase_id.trim().is_empty() {
        return Err(CoreError::validation("phase id must not be empty"));
    }

    let tasks_path = wavefront_common::paths::tasks_md_path(store.root());
    let contents = store.with_lock(&tasks_path, LockMode::Shared, || {
        store.read_to_string(&tasks_path).map_err(|e| match e {
            CoreError::NotFound(_) => CoreError::not_found(format!(
                "{} does not exist; create a task list first",
                tasks_path.display()
            )),
            other => other,
        })
    })?;

    let parsed = parse_task_list(&contents)?;
    let open: Vec<TaskRecord> = parsed
        .tasks
        .into_iter()
        .filter(|t| t.status != TaskStatus::Complete)
        .collect();

    let graph = build_graph(&open)?;
    let waves = plan_waves(&open, &graph)?;

    let plan = ExecutionPlanFile {
        execution_plan: ExecutionPlan {
            phase_id: phase_id.to_string(),
            created_at: iso8601(store.clock().now_utc()),
            waves: waves
                .iter()
                .map(|wave| PlanWave {
                    wave_id: wave.wave_id,
                    strategy: match wave.strategy {
                        WaveStrategy::ParallelSwarm => PlanStrategy::ParallelSwarm,
                        WaveStrategy::SequentialMerge => PlanStrategy::SequentialMerge,
                    },
                    rationale: wave.rationale.clone(),
                    tasks: wave
                        .tasks
                        .iter()
                        .filter_map(|id| open.iter().find(|t| &t.id == id))
                        .map(plan_task)
                        .collect(),
                    checkpoint_after: CheckpointAfter {
                        enabled: wave.checkpoint_after,
                    },
                })
                .collect(),
        },
    };

    let plan_path = wavefront_common::paths::execution_plan_path(store.root());
    store.with_lock(&plan_path, LockMode::Exclusive, || {
        store.write_validated_json(&plan_path, &plan)
    })?;

    ActivityLog::new(store).record(
        ActivityKind::Orchestrated,
        &format!(
            "{phase_id}: {} task(s) in {} wave(s)",
            plan.task_ids().len(),
            plan.execution_plan.waves.len()
        ),
    );

    let wave_count = plan.execution_plan.waves.len();
    let task_count = plan.task_ids().len();
    Ok(OrchestrateOutcome {
        plan,
        wave_count,
        task_count,
    })
}

fn plan_task(task: &TaskRecord) -> PlanTask {
    PlanTask {
        task_id: task.id.clone(),
        agent_role: task.agent_role.clone().unwrap_or_default(),
        instruction: task.description.clone(),
        file_locks: task.file_locks.iter().cloned().collect(),
        constitution_rules: task.constitution_rules.clone(),
        completion_handshake: task.completion_handshake.clone(),
        dependencies: task.dependencies.iter().cloned().collect(),
    }
}
