//! Guardrail tests pinning the on-disk JSON shapes.
//!
//! These exist so accidental field renames or representation changes show up
//! as test failures instead of silently-corrupted state files.

use wavefront_schemas::{
    CheckpointAfter, ExecutionPlan, ExecutionPlanFile, ExecutorState, PlanStrategy, PlanTask,
    PlanWave, Validate, WatchdogEntry, WatchdogEntryStatus, WatchdogMode, WatchdogRegistry,
    to_canonical_json,
};

fn sample_plan() -> ExecutionPlanFile {
    ExecutionPlanFile {
        execution_plan: ExecutionPlan {
            phase_id: "phase-1".to_string(),
            created_at: "2026-01-01T00:00:00Z".to_string(),
            waves: vec![
                PlanWave {
                    wave_id: 1,
                    strategy: PlanStrategy::ParallelSwarm,
                    rationale: "2 ready task(s) with disjoint file locks".to_string(),
                    tasks: vec![
                        PlanTask {
                            task_id: "TASK-001".to_string(),
                            agent_role: String::new(),
                            instruction: "Add login in `auth.py`".to_string(),
                            file_locks: vec!["auth.py".to_string()],
                            constitution_rules: vec!["RULE-A".to_string()],
                            completion_handshake: "mark the task line complete in tasks.md"
                                .to_string(),
                            dependencies: vec![],
                        },
                        PlanTask {
                            task_id: "TASK-002".to_string(),
                            agent_role: "writer".to_string(),
                            instruction: "Update docs in `README.md`".to_string(),
                            file_locks: vec!["README.md".to_string()],
                            constitution_rules: vec![],
                            completion_handshake: "mark the task line complete in tasks.md"
                                .to_string(),
                            dependencies: vec![],
                        },
                    ],
                    checkpoint_after: CheckpointAfter { enabled: true },
                },
                PlanWave {
                    wave_id: 2,
                    strategy: PlanStrategy::SequentialMerge,
                    rationale: "single task downstream of TASK-001".to_string(),
                    tasks: vec![PlanTask {
                        task_id: "TASK-003".to_string(),
                        agent_role: String::new(),
                        instruction: "Refactor `auth.py` after TASK-001".to_string(),
                        file_locks: vec!["auth.py".to_string()],
                        constitution_rules: vec![],
                        completion_handshake: "mark the task line complete in tasks.md"
                            .to_string(),
                        dependencies: vec!["TASK-001".to_string()],
                    }],
                    checkpoint_after: CheckpointAfter { enabled: true },
                },
            ],
        },
    }
}

#[test]
fn plan_round_trips_through_canonical_json() {
    let plan = sample_plan();
    let rendered = to_canonical_json(&plan).unwrap();
    let reparsed: ExecutionPlanFile = serde_json::from_str(&rendered).unwrap();
    assert_eq!(reparsed, plan);
    assert!(reparsed.validate().is_ok());
}

#[test]
fn canonical_rendering_is_stable() {
    let plan = sample_plan();
    let first = to_canonical_json(&plan).unwrap();
    let second = to_canonical_json(&plan).unwrap();
    assert_eq!(first, second);
}

#[test]
fn plan_wire_format_uses_the_spec_field_names() {
    let rendered = to_canonical_json(&sample_plan()).unwrap();
    for field in [
        "\"execution_plan\"",
        "\"phase_id\"",
        "\"created_at\"",
        "\"waves\"",
        "\"wave_id\"",
        "\"strategy\"",
        "\"rationale\"",
        "\"tasks\"",
        "\"task_id\"",
        "\"agent_role\"",
        "\"instruction\"",
        "\"file_locks\"",
        "\"constitution_rules\"",
        "\"completion_handshake\"",
        "\"dependencies\"",
        "\"checkpoint_after\"",
        "\"enabled\"",
        "\"PARALLEL_SWARM\"",
        "\"SEQUENTIAL_MERGE\"",
    ] {
        assert!(rendered.contains(field), "missing {field} in {rendered}");
    }
}

#[test]
fn executor_state_wire_format() {
    let state = ExecutorState {
        current_wave: 3,
        completed_waves: vec![1, 2],
        phase_id: "phase-1".to_string(),
        timestamp: "2026-01-01T00:00:00Z".to_string(),
    };
    let rendered = to_canonical_json(&state).unwrap();
    let reparsed: ExecutorState = serde_json::from_str(&rendered).unwrap();
    assert_eq!(reparsed, state);
    for field in ["\"current_wave\"", "\"completed_waves\"", "\"phase_id\"", "\"timestamp\""] {
        assert!(rendered.contains(field));
    }
}

#[test]
fn registry_wire_format_nests_entries_under_tasks() {
    let mut registry = WatchdogRegistry::default();
    registry.tasks.insert(
        "TASK-001".to_string(),
        WatchdogEntry {
            task_id: "TASK-001".to_string(),
            mode: WatchdogMode::Subprocess,
            command: "worker --task TASK-001".to_string(),
            status: WatchdogEntryStatus::Running,
            started_at: "2026-01-01T00:00:00Z".to_string(),
            completed_at: None,
            constitution_rules: vec![],
            last_heartbeat_at: None,
            failure_reason: None,
        },
    );
    let rendered = to_canonical_json(&registry).unwrap();
    assert!(rendered.contains("\"tasks\""));
    assert!(rendered.contains("\"TASK-001\""));
    assert!(rendered.contains("\"subprocess\""));
    assert!(rendered.contains("\"running\""));
    // Optional fields stay off the wire until set.
    assert!(!rendered.contains("completed_at"));
    assert!(!rendered.contains("failure_reason"));
}
