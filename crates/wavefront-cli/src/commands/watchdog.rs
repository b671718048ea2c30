use std::sync::Arc;
use std::sync::atomic::AtomicBool;
use std::time::Duration;

use wavefront_core::CoreResult;
use wavefront_core::watchdog::{Watchdog, run_daemon};
use wavefront_schemas::WatchdogMode;

use super::Runtime;
use crate::cli::WatchdogCommand;

pub(crate) fn run(runtime: &Runtime, command: WatchdogCommand) -> CoreResult<()> {
    runtime.store().init_dirs()?;
    let watchdog = Watchdog::new(runtime.store());
    match command {
        WatchdogCommand::Register {
            task_id,
            command,
            rules,
        } => {
            watchdog.register(&task_id, WatchdogMode::Subprocess, &command, &rules)?;
            println!("Registered {task_id}.");
        }
        WatchdogCommand::Heartbeat { task_id } => {
            watchdog.heartbeat(&task_id)?;
            println!("Heartbeat recorded for {task_id}.");
        }
        WatchdogCommand::Complete {
            task_id,
            exit_status,
        } => {
            let success = exit_status == 0;
            let reason = format!("exit {exit_status}");
            watchdog.complete(&task_id, success, (!success).then_some(reason.as_str()))?;
            println!(
                "{task_id} marked {}.",
                if success { "completed" } else { "failed" }
            );
        }
        WatchdogCommand::List => {
            let running = watchdog.list_running()?;
            if running.is_empty() {
                println!("No running tasks.");
            }
            for entry in running {
                println!("{} since {} ({})", entry.task_id, entry.started_at, entry.command);
            }
        }
        WatchdogCommand::Recover => {
            let recovered = watchdog.recover_stale()?;
            if recovered.is_empty() {
                println!("No stale tasks.");
            } else {
                println!("Failed stale task(s): {}.", recovered.join(", "));
            }
        }
        WatchdogCommand::Daemon => {
            println!("Watchdog daemon running; Ctrl-C to stop.");
            run_daemon(
                runtime.store(),
                Arc::new(AtomicBool::new(false)),
                Duration::from_secs(30),
            )?;
        }
    }
    Ok(())
}
