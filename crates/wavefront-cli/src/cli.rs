//! Argument surface for the `wavefront` binary.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Debug, Parser)]
#[command(
    name = "wavefront",
    version,
    about = "Wave-based task orchestration for long-running agent workflows"
)]
pub struct Cli {
    /// Project root holding tasks.md and the .wavefront/ state directory.
    #[arg(long, global = true, default_value = ".")]
    pub project_root: PathBuf,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Parse tasks.md and write a fresh execution plan.
    Orchestrate {
        /// Phase label recorded in the plan.
        #[arg(long)]
        phase: String,
    },

    /// Execute one wave of the current plan.
    ExecuteWave {
        /// Wave number to execute.
        wave_id: u32,

        /// Reconcile consumed tasks from a crashed run before executing.
        #[arg(long)]
        resume: bool,

        /// Worker command line, e.g. "my-agent --headless". Falls back to
        /// the WAVEFRONT_WORKER environment variable.
        #[arg(long)]
        worker: Option<String>,
    },

    /// Commit a wave checkpoint of the current state.
    Checkpoint {
        /// Commit message.
        message: String,
    },

    /// Commit an opportunistic micro-checkpoint.
    MicroCheckpoint {
        /// Commit message.
        message: String,
    },

    /// Show executor progress and the watchdog view.
    Status,

    /// Watchdog registry operations.
    Watchdog {
        #[command(subcommand)]
        command: WatchdogCommand,
    },
}

#[derive(Debug, Subcommand)]
pub enum WatchdogCommand {
    /// Register a task as running (updates in place when re-registered).
    Register {
        /// Task id, e.g. TASK-001.
        task_id: String,

        /// Worker command line to record.
        #[arg(long)]
        command: String,

        /// Constitution rule tags, repeatable.
        #[arg(long = "rule")]
        rules: Vec<String>,
    },

    /// Record a heartbeat for a running task.
    Heartbeat {
        /// Task id.
        task_id: String,
    },

    /// Record a worker's terminal state.
    Complete {
        /// Task id.
        task_id: String,

        /// Worker exit status.
        #[arg(long, default_value_t = 0)]
        exit_status: i32,
    },

    /// List entries currently believed to be running.
    List,

    /// Fail running entries older than the stale threshold.
    Recover,

    /// Run the single-instance watchdog daemon in the foreground.
    Daemon,
}
