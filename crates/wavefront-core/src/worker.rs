//! Worker launch boundary.
//!
//! A worker is an opaque command whose contract is: it is registered with
//! the watchdog before launch, it mutates its own files plus its task
//! marker, and it exits. The core never depends on an in-process function
//! call model for task execution; [`WorkerLauncher`] keeps the boundary
//! injectable so tests can script worker behavior.

use std::path::Path;
use std::time::Duration;

use crate::errors::{CoreError, CoreResult};
use crate::process::{ProcessRequest, ProcessRunner, SystemProcessRunner};

/// Everything a launcher needs to start one worker.
#[derive(Debug, Clone, Copy)]
pub struct WorkerRequest<'a> {
    /// The task to execute.
    pub task_id: &'a str,
    /// Instruction text, verbatim from the task line.
    pub instruction: &'a str,
    /// Worker profile name (may be empty).
    pub agent_role: &'a str,
    /// Opaque rule tags handed through untouched.
    pub constitution_rules: &'a [String],
    /// Project root the worker operates in.
    pub project_root: &'a Path,
    /// Per-task deadline.
    pub deadline: Duration,
}

/// Terminal report from one worker run.
#[derive(Debug, Clone)]
pub struct WorkerReport {
    /// Whether the worker exited successfully within its deadline.
    pub success: bool,
    /// Exit/timeout detail for the watchdog and the operator.
    pub detail: String,
    /// Bytes of output the worker produced (context-budget accounting).
    pub output_bytes: u64,
}

/// Boundary for handing a task off to a worker.
pub trait WorkerLauncher: Send + Sync {
    /// The command line recorded in the watchdog registry for `task_id`.
    fn describe_command(&self, task_id: &str) -> String;

    /// Launch the worker and block until it reaches a terminal state.
    fn launch(&self, request: &WorkerRequest<'_>) -> CoreResult<WorkerReport>;
}

/// Launcher that spawns an external worker process per task.
///
/// The configured command is invoked as
/// `<program> <args..> <task_id> <instruction>` with the project root as
/// working directory and each constitution rule appended as `--rule <tag>`.
pub struct SubprocessWorkerLauncher<R: ProcessRunner = SystemProcessRunner> {
    program: String,
    base_args: Vec<String>,
    runner: R,
}

impl SubprocessWorkerLauncher<SystemProcessRunner> {
    /// Build a launcher from a whitespace-separated command line.
    pub fn from_command_line(command: &str) -> CoreResult<Self> {
        let mut parts = command.split_whitespace().map(str::to_string);
        let Some(program) = parts.next() else {
            return Err(CoreError::validation(
                "worker command must not be empty".to_string(),
            ));
        };
        Ok(Self {
            program,
            base_args: parts.collect(),
            runner: SystemProcessRunner,
        })
    }
}

impl<R: ProcessRunner> SubprocessWorkerLauncher<R> {
    fn request_for(&self, request: &WorkerRequest<'_>) -> ProcessRequest {
        let mut process = ProcessRequest::new(&self.program)
            .args(self.base_args.iter().cloned())
            .arg(request.task_id)
            .arg(request.instruction)
            .current_dir(request.project_root);
        for rule in request.constitution_rules {
            process = process.arg("--rule").arg(rule);
        }
        if !request.agent_role.is_empty() {
            process = process.arg("--agent").arg(request.agent_role);
        }
        process
    }
}

impl<R: ProcessRunner> WorkerLauncher for SubprocessWorkerLauncher<R> {
    fn describe_command(&self, task_id: &str) -> String {
        let mut parts = vec![self.program.clone()];
        parts.extend(self.base_args.iter().cloned());
        parts.push(task_id.to_string());
        parts.join(" ")
    }

    fn launch(&self, request: &WorkerRequest<'_>) -> CoreResult<WorkerReport> {
        let process = self.request_for(request);
        let output = self
            .runner
            .run_with_timeout(&process, request.deadline)
            .map_err(|e| CoreError::external("spawning worker", e.to_string()))?;

        let output_bytes = (output.stdout.len() + output.stderr.len()) as u64;
        if output.timed_out {
            return Ok(WorkerReport {
                success: false,
                detail: format!("timed out after {}s", request.deadline.as_secs()),
                output_bytes,
            });
        }
        if output.success {
            Ok(WorkerReport {
                success: true,
                detail: "exit 0".to_string(),
                output_bytes,
            })
        } else {
            let stderr = output.stderr.trim();
            Ok(WorkerReport {
                success: false,
                detail: if stderr.is_empty() {
                    format!("exit {}", output.exit_code)
                } else {
                    format!("exit {}: {stderr}", output.exit_code)
                },
                output_bytes,
            })
        }
    }
}
