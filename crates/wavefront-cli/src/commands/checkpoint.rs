use wavefront_core::CoreResult;
use wavefront_core::checkpoint::CheckpointCoordinator;
use wavefront_core::errors::CoreError;
use wavefront_core::git::GitVersionControl;

use super::Runtime;

pub(crate) fn run(runtime: &Runtime, message: &str, micro: bool) -> CoreResult<()> {
    let vcs = GitVersionControl::new(runtime.root().clone());
    let coordinator = CheckpointCoordinator::new(runtime.store(), &vcs);

    if micro {
        match coordinator.micro_checkpoint(message) {
            Ok(outcome) => println!("Micro-checkpoint committed at {}.", outcome.commit),
            Err(CoreError::CheckpointBusy) => {
                // Non-fatal by contract: a wave checkpoint held the lock for
                // the whole wait window.
                println!("Checkpoint coordinator busy; micro-checkpoint skipped.");
            }
            Err(other) => return Err(other),
        }
        return Ok(());
    }

    let outcome = coordinator.wave_checkpoint(message)?;
    println!("Checkpoint committed at {}.", outcome.commit);
    Ok(())
}
