use wavefront_core::CoreResult;
use wavefront_core::errors::CoreError;
use wavefront_core::executor::executor_status;
use wavefront_core::watchdog::Watchdog;
use wavefront_schemas::SessionSnapshot;

use super::Runtime;

pub(crate) fn run(runtime: &Runtime) -> CoreResult<()> {
    let status = executor_status(runtime.store())?;
    if status.total_waves == 0 {
        println!("No waves planned; all waves complete.");
    } else {
        println!(
            "Phase {phase}: wave {current} of {total} up next; completed: {completed}.",
            phase = status.phase_id,
            current = status.current_wave,
            total = status.total_waves,
            completed = if status.completed_waves.is_empty() {
                "none".to_string()
            } else {
                status
                    .completed_waves
                    .iter()
                    .map(u32::to_string)
                    .collect::<Vec<_>>()
                    .join(", ")
            }
        );
        if status.all_complete {
            println!("All waves complete.");
        }
    }

    let running = Watchdog::new(runtime.store()).list_running()?;
    if running.is_empty() {
        println!("Watchdog: no running tasks.");
    } else {
        println!("Watchdog: {} running task(s):", running.len());
        for entry in running {
            println!("  {} since {} ({})", entry.task_id, entry.started_at, entry.command);
        }
    }

    let snapshot_path = wavefront_common::paths::session_snapshot_path(runtime.root());
    match runtime
        .store()
        .read_validated_json::<SessionSnapshot>(&snapshot_path)
    {
        Ok(snapshot) => {
            println!(
                "Last session: wave {wave} at {ts}; next: {next}",
                wave = snapshot.wave_id,
                ts = snapshot.timestamp,
                next = snapshot.next_steps.join("; ")
            );
            if !snapshot.blockers.is_empty() {
                println!("Blockers: {}", snapshot.blockers.join("; "));
            }
        }
        Err(CoreError::NotFound(_)) => {}
        Err(e) => return Err(e),
    }
    Ok(())
}
