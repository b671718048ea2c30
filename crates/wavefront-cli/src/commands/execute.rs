use std::sync::Arc;
use std::sync::atomic::AtomicBool;

use wavefront_core::errors::{CoreError, CoreResult};
use wavefront_core::executor::{WaveExecutor, WaveOutcome};
use wavefront_core::git::GitVersionControl;
use wavefront_core::issues::NullIssueTracker;
use wavefront_core::worker::SubprocessWorkerLauncher;

use super::Runtime;

#[cfg(unix)]
static SHUTDOWN_FLAG: std::sync::OnceLock<Arc<AtomicBool>> = std::sync::OnceLock::new();

pub(crate) fn run(
    runtime: &Runtime,
    wave_id: u32,
    resume: bool,
    worker: Option<String>,
) -> CoreResult<()> {
    let worker_command = worker
        .or_else(|| std::env::var("WAVEFRONT_WORKER").ok())
        .ok_or_else(|| {
            CoreError::validation(
                "no worker configured; pass --worker or set WAVEFRONT_WORKER",
            )
        })?;
    let launcher = SubprocessWorkerLauncher::from_command_line(&worker_command)?;
    let vcs = GitVersionControl::new(runtime.root().clone());
    let issues = NullIssueTracker;

    let executor = WaveExecutor::new(runtime.store(), &vcs, &launcher, &issues);
    install_signal_handler(executor.shutdown_flag());

    match executor.execute_wave(wave_id, resume)? {
        WaveOutcome::AlreadyComplete => {
            println!("Wave {wave_id} is already complete; nothing to do.");
        }
        WaveOutcome::Executed {
            checkpoint_commit,
            tasks_run,
        } => {
            if checkpoint_commit.is_empty() {
                println!("Wave {wave_id} verified ({tasks_run} worker(s) run).");
            } else {
                println!(
                    "Wave {wave_id} verified and checkpointed at {checkpoint_commit} ({tasks_run} worker(s) run)."
                );
            }
        }
    }
    Ok(())
}

/// Trap SIGINT/SIGTERM into the executor's graceful-shutdown flag.
#[cfg(unix)]
fn install_signal_handler(flag: Arc<AtomicBool>) {
    use nix::sys::signal::{SigHandler, Signal, signal};

    extern "C" fn on_signal(_sig: i32) {
        if let Some(flag) = SHUTDOWN_FLAG.get() {
            flag.store(true, std::sync::atomic::Ordering::SeqCst);
        }
    }

    let _ = SHUTDOWN_FLAG.set(flag);
    unsafe {
        let _ = signal(Signal::SIGINT, SigHandler::Handler(on_signal));
        let _ = signal(Signal::SIGTERM, SigHandler::Handler(on_signal));
    }
}

#[cfg(not(unix))]
fn install_signal_handler(_flag: Arc<AtomicBool>) {}
