//! The wave executor.
//!
//! Drives one wave at a time through the atomic state protocol:
//! pre-flight, consume, spawn, await, verify, checkpoint, advance. The
//! commit point is the consume step: once markers flip to consumed, a crash
//! is recoverable because consumed tasks are reconciled against the
//! watchdog registry on resume.

use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use wavefront_domain::tasks::{TaskListParse, TaskStatus, parse_task_list, set_task_marker};
use wavefront_schemas::{
    ExecutionPlanFile, ExecutorState, PlanStrategy, PlanTask, PlanWave, SessionSnapshot,
    WatchdogEntryStatus, WatchdogMode,
};

use crate::activity::{ActivityKind, ActivityLog};
use crate::checkpoint::CheckpointCoordinator;
use crate::config::POLL_INTERVAL;
use crate::errors::{CoreError, CoreResult};
use crate::git::VersionControl;
use crate::issues::{IssueTracker, close_best_effort};
use crate::store::{DurableStore, LockMode};
use crate::time::iso8601;
use crate::watchdog::Watchdog;
use crate::worker::{WorkerLauncher, WorkerRequest};

/// How many attempts transient I/O gets before becoming fatal.
const TRANSIENT_ATTEMPTS: u32 = 5;

/// Retry `f` with exponential backoff while it fails transiently.
pub fn retry_transient<T>(mut f: impl FnMut() -> CoreResult<T>) -> CoreResult<T> {
    let mut delay = Duration::from_millis(50);
    for attempt in 1..=TRANSIENT_ATTEMPTS {
        match f() {
            Err(e) if e.is_retriable() && attempt < TRANSIENT_ATTEMPTS => {
                tracing::warn!("transient failure (attempt {attempt}): {e}; retrying");
                std::thread::sleep(delay);
                delay *= 2;
            }
            other => return other,
        }
    }
    // The loop always returns on its last attempt.
    Err(CoreError::validation("retry loop exhausted"))
}

#[derive(Debug, Clone, PartialEq, Eq)]
/// Result of executing (or re-executing) a wave.
pub enum WaveOutcome {
    /// The wave had already completed and checkpointed; nothing was done.
    AlreadyComplete,
    /// The wave ran to a verified, checkpointed completion.
    Executed {
        /// Checkpoint commit id (empty when the wave had checkpointing off).
        checkpoint_commit: String,
        /// Workers actually launched this run.
        tasks_run: usize,
    },
}

#[derive(Debug, Clone)]
/// Summary of executor progress for the status surface.
pub struct ExecutorStatus {
    /// Phase the current plan belongs to.
    pub phase_id: String,
    /// The wave up next.
    pub current_wave: u32,
    /// Waves already completed.
    pub completed_waves: Vec<u32>,
    /// Waves in the plan.
    pub total_waves: usize,
    /// True when every planned wave has completed.
    pub all_complete: bool,
}

struct TaskRun {
    task_id: String,
    success: bool,
    detail: String,
    output_bytes: u64,
}

/// Drives waves of an execution plan to completion.
pub struct WaveExecutor<'a> {
    store: &'a DurableStore,
    vcs: &'a dyn VersionControl,
    launcher: &'a dyn WorkerLauncher,
    issues: &'a dyn IssueTracker,
    shutdown: Arc<AtomicBool>,
    session_id: String,
}

impl<'a> WaveExecutor<'a> {
    /// Create an executor over `store` with the given collaborators.
    pub fn new(
        store: &'a DurableStore,
        vcs: &'a dyn VersionControl,
        launcher: &'a dyn WorkerLauncher,
        issues: &'a dyn IssueTracker,
    ) -> Self {
        Self {
            store,
            vcs,
            launcher,
            issues,
            shutdown: Arc::new(AtomicBool::new(false)),
            session_id: uuid::Uuid::new_v4().to_string(),
        }
    }

    /// The flag a signal handler sets to request graceful shutdown.
    ///
    /// The executor checks it between steps: any in-flight atomic write
    /// finishes, locks release, and the run exits with `Interrupted`.
    pub fn shutdown_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.shutdown)
    }

    fn tasks_md(&self) -> PathBuf {
        wavefront_common::paths::tasks_md_path(self.store.root())
    }

    fn read_tasks(&self) -> CoreResult<TaskListParse> {
        let contents = self.store.read_to_string(&self.tasks_md())?;
        Ok(parse_task_list(&contents)?)
    }

    fn check_interrupted(&self, plan: &ExecutionPlanFile, wave_id: u32) -> CoreResult<()> {
        if !self.shutdown.load(Ordering::SeqCst) {
            return Ok(());
        }
        ActivityLog::new(self.store).record(
            ActivityKind::Shutdown,
            &format!("interrupted during wave {wave_id}"),
        );
        self.write_snapshot(
            plan,
            wave_id,
            vec![format!("re-run: execute-wave {wave_id} --resume")],
            vec!["interrupted by signal".to_string()],
        );
        Err(CoreError::Interrupted)
    }

    /// Execute wave `wave_id` of the current plan.
    ///
    /// Re-running a wave that already completed is a no-op success. With
    /// `resume`, consumed tasks left behind by a crash are first reconciled
    /// against the watchdog registry.
    pub fn execute_wave(&self, wave_id: u32, resume: bool) -> CoreResult<WaveOutcome> {
        self.store.init_dirs()?;
        let swept = self.store.sweep_tmp_files()?;
        if swept > 0 {
            tracing::info!("swept {swept} orphaned tmp file(s)");
        }

        let plan = self.load_plan()?;
        let mut state = self.load_state(&plan)?;
        if state.is_completed(wave_id) {
            tracing::info!("wave {wave_id} already completed; nothing to do");
            return Ok(WaveOutcome::AlreadyComplete);
        }
        let Some(wave) = plan.wave(wave_id) else {
            let total = plan.execution_plan.waves.len();
            return Err(CoreError::validation(format!(
                "wave {wave_id} is not in the plan ({total} wave(s) planned)"
            )));
        };

        let activity = ActivityLog::new(self.store);
        let watchdog = Watchdog::new(self.store);

        // Step 1: pre-flight. Shared coordinator lock so no checkpoint is
        // mid-commit while dependencies are verified.
        {
            let lock_path = wavefront_common::paths::checkpoint_lock_path(self.store.root());
            let _shared = self.store.acquire_lock(
                &lock_path,
                LockMode::Shared,
                self.store.config().lock_timeout,
            )?;
            self.verify_dependencies(wave)?;
        }

        if resume {
            self.reconcile_consumed(wave, &watchdog, &activity)?;
        }
        self.check_interrupted(&plan, wave_id)?;

        activity.record(
            ActivityKind::WaveStarted,
            &format!("wave {wave_id} ({} task(s))", wave.tasks.len()),
        );

        // Step 2: consume. This is the commit point.
        retry_transient(|| self.consume_tasks(wave, &activity))?;
        self.check_interrupted(&plan, wave_id)?;

        // Steps 3 + 4: spawn and await.
        let runs = self.run_workers(wave, &watchdog)?;
        let tasks_run = runs.len();
        for run in &runs {
            if !run.success {
                return Err(CoreError::WorkerFailed {
                    task_id: run.task_id.clone(),
                    detail: run.detail.clone(),
                });
            }
        }
        self.check_interrupted(&plan, wave_id)?;

        // Step 5: verify on the set, under lock, against the task list.
        retry_transient(|| self.verify_wave(wave))?;
        activity.record(
            ActivityKind::WaveVerified,
            &format!("wave {wave_id}: all {} task(s) complete", wave.tasks.len()),
        );
        for task in &wave.tasks {
            activity.record(ActivityKind::TaskCompleted, &task.task_id);
            close_best_effort(self.issues, &task.task_id);
        }

        // Step 6: checkpoint. A failure here leaves the wave un-advanced.
        let checkpoint_commit = if wave.checkpoint_after.enabled {
            let coordinator = CheckpointCoordinator::new(self.store, self.vcs);
            coordinator
                .wave_checkpoint(&format!(
                    "wave {wave_id} verified ({} task(s))",
                    wave.tasks.len()
                ))?
                .commit
        } else {
            String::new()
        };

        // Step 7: advance.
        state.completed_waves.push(wave_id);
        state.current_wave = wave_id + 1;
        state.timestamp = iso8601(self.store.clock().now_utc());
        self.persist_state(&state)?;
        self.write_snapshot(
            &plan,
            wave_id,
            next_steps_for(&plan, &state),
            Vec::new(),
        );

        Ok(WaveOutcome::Executed {
            checkpoint_commit,
            tasks_run,
        })
    }

    fn load_plan(&self) -> CoreResult<ExecutionPlanFile> {
        let path = wavefront_common::paths::execution_plan_path(self.store.root());
        self.store
            .read_validated_json(&path)
            .map_err(|e| match e {
                CoreError::NotFound(_) => CoreError::not_found(
                    "no execution plan found; run `wavefront orchestrate` first".to_string(),
                ),
                other => other,
            })
    }

    fn state_path(&self) -> PathBuf {
        wavefront_common::paths::executor_state_path(self.store.root())
    }

    fn load_state(&self, plan: &ExecutionPlanFile) -> CoreResult<ExecutorState> {
        let path = self.state_path();
        let state = match self.store.read_validated_json::<ExecutorState>(&path) {
            Ok(state) => state,
            Err(CoreError::NotFound(_)) => {
                return Ok(ExecutorState::fresh(
                    plan.execution_plan.phase_id.clone(),
                    iso8601(self.store.clock().now_utc()),
                ));
            }
            Err(e) => return Err(e),
        };
        if state.phase_id != plan.execution_plan.phase_id {
            tracing::warn!(
                "executor state belongs to phase {}; starting fresh for {}",
                state.phase_id,
                plan.execution_plan.phase_id
            );
            return Ok(ExecutorState::fresh(
                plan.execution_plan.phase_id.clone(),
                iso8601(self.store.clock().now_utc()),
            ));
        }
        Ok(state)
    }

    fn persist_state(&self, state: &ExecutorState) -> CoreResult<()> {
        let path = self.state_path();
        retry_transient(|| {
            self.store.with_lock(&path, LockMode::Exclusive, || {
                self.store.write_validated_json(&path, state)
            })
        })
    }

    fn verify_dependencies(&self, wave: &PlanWave) -> CoreResult<()> {
        let parsed = self.read_tasks()?;
        for task in &wave.tasks {
            for dep in &task.dependencies {
                match parsed.task(dep) {
                    Some(record) if record.status == TaskStatus::Complete => {}
                    _ => {
                        return Err(CoreError::UnmetDependency {
                            task_id: task.task_id.clone(),
                            dependency: dep.clone(),
                        });
                    }
                }
            }
        }
        Ok(())
    }

    /// Reconcile consumed markers against the watchdog registry on resume.
    ///
    /// running entry: keep consumed and await it later. completed entry:
    /// keep consumed; verification decides. failed or missing entry: roll
    /// the marker back to pending so the consume step can re-claim it.
    fn reconcile_consumed(
        &self,
        wave: &PlanWave,
        watchdog: &Watchdog<'_>,
        activity: &ActivityLog<'_>,
    ) -> CoreResult<()> {
        let registry = watchdog.snapshot()?;
        let tasks_md = self.tasks_md();
        self.store.with_lock(&tasks_md, LockMode::Exclusive, || {
            let mut contents = self.store.read_to_string(&tasks_md)?;
            let parsed = parse_task_list(&contents)?;
            let mut rolled_back = Vec::new();
            for task in &wave.tasks {
                let Some(record) = parsed.task(&task.task_id) else {
                    continue;
                };
                if record.status != TaskStatus::Consumed {
                    continue;
                }
                let entry_status = registry.tasks.get(&task.task_id).map(|e| e.status);
                match entry_status {
                    Some(WatchdogEntryStatus::Running)
                    | Some(WatchdogEntryStatus::Completed) => {}
                    Some(WatchdogEntryStatus::Failed) | None => {
                        contents =
                            set_task_marker(&contents, &task.task_id, TaskStatus::Pending)?;
                        rolled_back.push(task.task_id.clone());
                    }
                }
            }
            if !rolled_back.is_empty() {
                self.store.write_atomic(&tasks_md, contents.as_bytes())?;
                activity.record(
                    ActivityKind::Recovered,
                    &format!("rolled back to pending: {}", rolled_back.join(", ")),
                );
            }
            Ok(())
        })
    }

    fn consume_tasks(&self, wave: &PlanWave, activity: &ActivityLog<'_>) -> CoreResult<()> {
        let tasks_md = self.tasks_md();
        self.store.with_lock(&tasks_md, LockMode::Exclusive, || {
            let mut contents = self.store.read_to_string(&tasks_md)?;
            let parsed = parse_task_list(&contents)?;
            let mut flipped = Vec::new();
            for task in &wave.tasks {
                let Some(record) = parsed.task(&task.task_id) else {
                    return Err(CoreError::validation(format!(
                        "{} is in the plan but no longer in tasks.md; re-run orchestrate",
                        task.task_id
                    )));
                };
                if record.status == TaskStatus::Pending {
                    contents = set_task_marker(&contents, &task.task_id, TaskStatus::Consumed)?;
                    flipped.push(task.task_id.clone());
                }
            }
            if !flipped.is_empty() {
                self.store.write_atomic(&tasks_md, contents.as_bytes())?;
            }
            for task_id in &flipped {
                activity.record(ActivityKind::TaskConsumed, task_id);
            }
            Ok(())
        })
    }

    /// Spawn workers for the wave and block until every one is terminal.
    fn run_workers(&self, wave: &PlanWave, watchdog: &Watchdog<'_>) -> CoreResult<Vec<TaskRun>> {
        let parsed = self.read_tasks()?;
        let registry = watchdog.snapshot()?;

        // Decide per task: skip (already complete / handshake pending),
        // await (an earlier run's worker is still registered as running), or
        // spawn fresh.
        let mut to_await: Vec<&PlanTask> = Vec::new();
        let mut to_spawn: Vec<&PlanTask> = Vec::new();
        for task in &wave.tasks {
            let marker = parsed.task(&task.task_id).map(|r| r.status);
            if marker == Some(TaskStatus::Complete) {
                continue;
            }
            match registry.tasks.get(&task.task_id).map(|e| e.status) {
                Some(WatchdogEntryStatus::Running) => to_await.push(task),
                Some(WatchdogEntryStatus::Completed) => {}
                _ => to_spawn.push(task),
            }
        }

        let mut runs: Vec<TaskRun> = Vec::new();

        match wave.strategy {
            PlanStrategy::ParallelSwarm => {
                let results: Vec<CoreResult<TaskRun>> = std::thread::scope(|scope| {
                    let mut handles = Vec::new();
                    for &task in &to_spawn {
                        handles.push(scope.spawn(move || self.supervise(task, watchdog)));
                    }
                    for &task in &to_await {
                        handles.push(scope.spawn(move || self.await_registered(task, watchdog)));
                    }
                    handles
                        .into_iter()
                        .map(|h| {
                            h.join().unwrap_or_else(|_| {
                                Err(CoreError::validation("worker supervision panicked"))
                            })
                        })
                        .collect()
                });
                for result in results {
                    runs.push(result?);
                }
            }
            PlanStrategy::SequentialMerge => {
                let mut since_micro: u32 = 0;
                let mut bytes_since_micro: u64 = 0;
                for &task in &to_await {
                    runs.push(self.await_registered(task, watchdog)?);
                }
                for &task in &to_spawn {
                    if self.shutdown.load(Ordering::SeqCst) {
                        break;
                    }
                    let run = self.supervise(task, watchdog)?;
                    let failed = !run.success;
                    since_micro += 1;
                    bytes_since_micro += run.output_bytes;
                    runs.push(run);
                    if failed {
                        // Strict ordering: later tasks never launch past a
                        // failure.
                        break;
                    }
                    if self.micro_checkpoint_due(since_micro, bytes_since_micro) {
                        self.try_micro_checkpoint(&wave.tasks[0].task_id);
                        since_micro = 0;
                        bytes_since_micro = 0;
                    }
                }
            }
        }

        Ok(runs)
    }

    fn micro_checkpoint_due(&self, tasks_done: u32, bytes_done: u64) -> bool {
        let config = self.store.config();
        let by_count = config
            .micro_checkpoint_task_interval
            .is_some_and(|n| tasks_done >= n);
        let by_bytes = config
            .micro_checkpoint_context_bytes
            .is_some_and(|n| bytes_done >= n);
        by_count || by_bytes
    }

    fn try_micro_checkpoint(&self, context: &str) {
        let coordinator = CheckpointCoordinator::new(self.store, self.vcs);
        match coordinator.micro_checkpoint(&format!("mid-wave progress near {context}")) {
            Ok(_) => {}
            Err(CoreError::CheckpointBusy) => {
                tracing::debug!("micro-checkpoint skipped: coordinator busy");
            }
            Err(e) => tracing::warn!("micro-checkpoint failed: {e}"),
        }
    }

    /// Register and launch a fresh worker, then record its terminal state.
    fn supervise(&self, task: &PlanTask, watchdog: &Watchdog<'_>) -> CoreResult<TaskRun> {
        let command = self.launcher.describe_command(&task.task_id);
        watchdog.register(
            &task.task_id,
            WatchdogMode::Subprocess,
            &command,
            &task.constitution_rules,
        )?;

        let request = WorkerRequest {
            task_id: &task.task_id,
            instruction: &task.instruction,
            agent_role: &task.agent_role,
            constitution_rules: &task.constitution_rules,
            project_root: self.store.root(),
            deadline: self.store.config().worker_deadline,
        };
        let report = self.launcher.launch(&request)?;
        watchdog.complete(
            &task.task_id,
            report.success,
            (!report.success).then_some(report.detail.as_str()),
        )?;

        Ok(TaskRun {
            task_id: task.task_id.clone(),
            success: report.success,
            detail: report.detail,
            output_bytes: report.output_bytes,
        })
    }

    /// Await a worker registered by an earlier run (resume path).
    fn await_registered(&self, task: &PlanTask, watchdog: &Watchdog<'_>) -> CoreResult<TaskRun> {
        let deadline = self.store.config().worker_deadline;
        let started = Instant::now();
        loop {
            if self.shutdown.load(Ordering::SeqCst) {
                return Err(CoreError::Interrupted);
            }
            let registry = watchdog.snapshot()?;
            match registry.tasks.get(&task.task_id).map(|e| e.status) {
                Some(WatchdogEntryStatus::Completed) => {
                    return Ok(TaskRun {
                        task_id: task.task_id.clone(),
                        success: true,
                        detail: "completed by earlier session".to_string(),
                        output_bytes: 0,
                    });
                }
                Some(WatchdogEntryStatus::Failed) => {
                    return Ok(TaskRun {
                        task_id: task.task_id.clone(),
                        success: false,
                        detail: "failed in earlier session".to_string(),
                        output_bytes: 0,
                    });
                }
                Some(WatchdogEntryStatus::Running) => {}
                None => {
                    return Ok(TaskRun {
                        task_id: task.task_id.clone(),
                        success: false,
                        detail: "watchdog entry disappeared".to_string(),
                        output_bytes: 0,
                    });
                }
            }
            if started.elapsed() >= deadline {
                watchdog.complete(
                    &task.task_id,
                    false,
                    Some("timed out awaiting worker from earlier session"),
                )?;
                return Ok(TaskRun {
                    task_id: task.task_id.clone(),
                    success: false,
                    detail: "timed out awaiting worker".to_string(),
                    output_bytes: 0,
                });
            }
            std::thread::sleep(POLL_INTERVAL);
        }
    }

    /// Confirm every task of the wave carries the complete marker.
    fn verify_wave(&self, wave: &PlanWave) -> CoreResult<()> {
        let tasks_md = self.tasks_md();
        self.store.with_lock(&tasks_md, LockMode::Shared, || {
            let parsed = {
                let contents = self.store.read_to_string(&tasks_md)?;
                parse_task_list(&contents)?
            };
            for task in &wave.tasks {
                match parsed.task(&task.task_id).map(|r| r.status) {
                    Some(TaskStatus::Complete) => {}
                    Some(status) => {
                        return Err(CoreError::VerificationFailed {
                            task_id: task.task_id.clone(),
                            detail: format!(
                                "marker is {} but the completion handshake requires complete",
                                status.as_str()
                            ),
                        });
                    }
                    None => {
                        return Err(CoreError::VerificationFailed {
                            task_id: task.task_id.clone(),
                            detail: "task line no longer present in tasks.md".to_string(),
                        });
                    }
                }
            }
            Ok(())
        })
    }

    fn write_snapshot(
        &self,
        plan: &ExecutionPlanFile,
        wave_id: u32,
        next_steps: Vec<String>,
        blockers: Vec<String>,
    ) {
        let completed_task_ids = self
            .read_tasks()
            .map(|parsed| {
                parsed
                    .tasks
                    .iter()
                    .filter(|t| t.status == TaskStatus::Complete)
                    .map(|t| t.id.clone())
                    .collect()
            })
            .unwrap_or_default();
        let snapshot = SessionSnapshot {
            session_id: self.session_id.clone(),
            timestamp: iso8601(self.store.clock().now_utc()),
            phase_id: plan.execution_plan.phase_id.clone(),
            wave_id,
            completed_task_ids,
            next_steps,
            blockers,
        };
        let path = wavefront_common::paths::session_snapshot_path(self.store.root());
        if let Err(e) = self.store.write_validated_json(&path, &snapshot) {
            tracing::warn!("session snapshot write failed: {e}");
        }
    }
}

fn next_steps_for(plan: &ExecutionPlanFile, state: &ExecutorState) -> Vec<String> {
    let total = plan.execution_plan.waves.len() as u32;
    if state.current_wave > total {
        vec!["all waves complete".to_string()]
    } else {
        vec![format!("execute-wave {}", state.current_wave)]
    }
}

/// Summarize executor progress against the current plan.
///
/// Valid without a plan (nothing planned reads as all complete) so the
/// status surface works on an empty or fully-archived project.
pub fn executor_status(store: &DurableStore) -> CoreResult<ExecutorStatus> {
    let plan_path = wavefront_common::paths::execution_plan_path(store.root());
    let plan = match store.read_validated_json::<ExecutionPlanFile>(&plan_path) {
        Ok(plan) => Some(plan),
        Err(CoreError::NotFound(_)) => None,
        Err(e) => return Err(e),
    };
    let Some(plan) = plan else {
        return Ok(ExecutorStatus {
            phase_id: String::new(),
            current_wave: 1,
            completed_waves: Vec::new(),
            total_waves: 0,
            all_complete: true,
        });
    };

    let state_path = wavefront_common::paths::executor_state_path(store.root());
    let state = match store.read_validated_json::<ExecutorState>(&state_path) {
        Ok(state) if state.phase_id == plan.execution_plan.phase_id => state,
        Ok(_) | Err(CoreError::NotFound(_)) => ExecutorState::fresh(
            plan.execution_plan.phase_id.clone(),
            plan.execution_plan.created_at.clone(),
        ),
        Err(e) => return Err(e),
    };

    let total_waves = plan.execution_plan.waves.len();
    let all_complete = state.completed_waves.len() >= total_waves;
    Ok(ExecutorStatus {
        phase_id: plan.execution_plan.phase_id.clone(),
        current_wave: state.current_wave,
        completed_waves: state.completed_waves.clone(),
        total_waves,
        all_complete,
    })
}
