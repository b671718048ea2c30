use wavefront_core::CoreResult;
use wavefront_core::orchestrate::orchestrate;

use super::Runtime;

pub(crate) fn run(runtime: &Runtime, phase: &str) -> CoreResult<()> {
    runtime.store().init_dirs()?;
    let outcome = orchestrate(runtime.store(), phase)?;

    if outcome.wave_count == 0 {
        println!("Phase {phase}: no open tasks; wrote an empty plan.");
        return Ok(());
    }

    println!(
        "Phase {phase}: planned {tasks} task(s) into {waves} wave(s).",
        tasks = outcome.task_count,
        waves = outcome.wave_count
    );
    for wave in &outcome.plan.execution_plan.waves {
        let ids: Vec<&str> = wave.tasks.iter().map(|t| t.task_id.as_str()).collect();
        println!(
            "  wave {id} [{strategy:?}]: {ids}",
            id = wave.wave_id,
            strategy = wave.strategy,
            ids = ids.join(", ")
        );
    }
    Ok(())
}
