//! Orchestration use-case tests: plan shape, determinism, failure modes.

use std::sync::Arc;

use chrono::TimeZone;
use wavefront_core::config::RuntimeConfig;
use wavefront_core::errors::CoreError;
use wavefront_core::orchestrate::orchestrate;
use wavefront_core::store::DurableStore;
use wavefront_core::time::FixedClock;
use wavefront_domain::errors::DomainError;
use wavefront_schemas::PlanStrategy;

fn store_with_tasks(td: &tempfile::TempDir, tasks: &str) -> DurableStore {
    let clock = FixedClock(chrono::Utc.with_ymd_and_hms(2026, 3, 1, 9, 0, 0).unwrap());
    std::fs::write(td.path().join("tasks.md"), tasks).unwrap();
    DurableStore::new(td.path(), RuntimeConfig::default(), Arc::new(clock))
}

const SCENARIO_A: &str = "\
- [ ] TASK-001: Add login in `auth.py`
- [ ] TASK-002: Update docs in `README.md`
- [ ] TASK-003: Refactor `auth.py` after TASK-001
";

#[test]
fn scenario_a_parallel_safe_wave() {
    let td = tempfile::tempdir().unwrap();
    let store = store_with_tasks(&td, SCENARIO_A);

    let outcome = orchestrate(&store, "phase-1").unwrap();
    assert_eq!(outcome.wave_count, 2);
    assert_eq!(outcome.task_count, 3);

    let waves = &outcome.plan.execution_plan.waves;
    assert_eq!(waves[0].strategy, PlanStrategy::ParallelSwarm);
    let wave1_ids: Vec<&str> = waves[0].tasks.iter().map(|t| t.task_id.as_str()).collect();
    assert_eq!(wave1_ids, vec!["TASK-001", "TASK-002"]);

    assert_eq!(waves[1].strategy, PlanStrategy::SequentialMerge);
    let wave2_ids: Vec<&str> = waves[1].tasks.iter().map(|t| t.task_id.as_str()).collect();
    assert_eq!(wave2_ids, vec!["TASK-003"]);
    // The dependency came through both the explicit "after" and the shared
    // file lock; either way it lands once.
    assert_eq!(waves[1].tasks[0].dependencies, vec!["TASK-001"]);

    let plan_path = wavefront_common::paths::execution_plan_path(td.path());
    assert!(plan_path.exists());
    let backup = plan_path.with_file_name("execution_plan.json.backup");
    assert!(backup.exists());
}

#[test]
fn rerunning_on_unchanged_tasks_is_byte_identical() {
    let td = tempfile::tempdir().unwrap();
    let store = store_with_tasks(&td, SCENARIO_A);
    let plan_path = wavefront_common::paths::execution_plan_path(td.path());

    orchestrate(&store, "phase-1").unwrap();
    let first = std::fs::read(&plan_path).unwrap();
    orchestrate(&store, "phase-1").unwrap();
    let second = std::fs::read(&plan_path).unwrap();
    assert_eq!(first, second);
}

#[test]
fn plan_json_is_canonical() {
    let td = tempfile::tempdir().unwrap();
    let store = store_with_tasks(&td, SCENARIO_A);
    orchestrate(&store, "phase-1").unwrap();

    let plan_path = wavefront_common::paths::execution_plan_path(td.path());
    let raw = std::fs::read_to_string(&plan_path).unwrap();
    assert!(raw.ends_with('\n'));
    for line in raw.lines() {
        assert_eq!(line, line.trim_end(), "trailing whitespace in plan output");
    }
    // 2-space indentation, keys sorted at the top level.
    assert!(raw.starts_with("{\n  \"execution_plan\": {\n"));
    let created_at = raw.find("\"created_at\"").unwrap();
    let phase_id = raw.find("\"phase_id\"").unwrap();
    let waves = raw.find("\"waves\"").unwrap();
    assert!(created_at < phase_id && phase_id < waves);
    assert!(raw.contains("\"created_at\": \"2026-03-01T09:00:00Z\""));
}

#[test]
fn empty_task_list_yields_an_empty_plan() {
    let td = tempfile::tempdir().unwrap();
    let store = store_with_tasks(&td, "");
    let outcome = orchestrate(&store, "phase-1").unwrap();
    assert_eq!(outcome.wave_count, 0);
    assert_eq!(outcome.task_count, 0);
}

#[test]
fn fully_completed_task_list_yields_zero_waves() {
    let td = tempfile::tempdir().unwrap();
    let store = store_with_tasks(&td, "- [x] TASK-001: Done\n- [x] TASK-002: Done too\n");
    let outcome = orchestrate(&store, "phase-1").unwrap();
    assert_eq!(outcome.wave_count, 0);
}

#[test]
fn cyclic_dependencies_fail_without_writing_a_plan() {
    let td = tempfile::tempdir().unwrap();
    let store = store_with_tasks(
        &td,
        "- [ ] TASK-001: One after TASK-002\n- [ ] TASK-002: Two after TASK-001\n",
    );

    let err = orchestrate(&store, "phase-1").unwrap_err();
    let CoreError::Domain(DomainError::DependencyCycle { participants, .. }) = err else {
        panic!("expected dependency cycle, got another error");
    };
    assert!(participants.contains(&"TASK-001".to_string()));
    assert!(participants.contains(&"TASK-002".to_string()));

    let plan_path = wavefront_common::paths::execution_plan_path(td.path());
    assert!(!plan_path.exists());
}

#[test]
fn missing_task_list_is_a_not_found_with_guidance() {
    let td = tempfile::tempdir().unwrap();
    let clock = FixedClock(chrono::Utc.with_ymd_and_hms(2026, 3, 1, 9, 0, 0).unwrap());
    let store = DurableStore::new(td.path(), RuntimeConfig::default(), Arc::new(clock));

    let err = orchestrate(&store, "phase-1").unwrap_err();
    assert!(matches!(err, CoreError::NotFound(_)));
    assert!(err.to_string().contains("tasks.md"));
}

#[test]
fn constitution_rules_and_agent_roles_pass_through() {
    let td = tempfile::tempdir().unwrap();
    let store = store_with_tasks(
        &td,
        "\
- [ ] TASK-001: Guarded change in `core.rs`
  **Constitution**: RULE-AUDIT, RULE-TEST
  **Agent**: reviewer
",
    );
    let outcome = orchestrate(&store, "phase-1").unwrap();
    let task = &outcome.plan.execution_plan.waves[0].tasks[0];
    assert_eq!(task.constitution_rules, vec!["RULE-AUDIT", "RULE-TEST"]);
    assert_eq!(task.agent_role, "reviewer");
}
