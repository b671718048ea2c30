//! Command handlers.
//!
//! Each handler is a thin adapter: resolve the runtime, call into
//! `wavefront-core`, and print a human-readable account of what happened.
//! All policy lives in the core crate.

mod checkpoint;
mod execute;
mod orchestrate;
mod status;
mod watchdog;

use std::path::PathBuf;
use std::sync::Arc;

use wavefront_core::CoreResult;
use wavefront_core::config::RuntimeConfig;
use wavefront_core::store::DurableStore;
use wavefront_core::time::SystemClock;

use crate::cli::{Cli, Command};

/// Shared per-invocation context.
pub(crate) struct Runtime {
    root: PathBuf,
    store: DurableStore,
}

impl Runtime {
    fn new(root: PathBuf) -> Self {
        let store = DurableStore::new(
            root.clone(),
            RuntimeConfig::from_env(),
            Arc::new(SystemClock),
        );
        Self { root, store }
    }

    pub(crate) fn root(&self) -> &PathBuf {
        &self.root
    }

    pub(crate) fn store(&self) -> &DurableStore {
        &self.store
    }
}

/// Dispatch a parsed invocation.
pub fn run(args: Cli) -> CoreResult<()> {
    let runtime = Runtime::new(args.project_root);
    match args.command {
        Command::Orchestrate { phase } => orchestrate::run(&runtime, &phase),
        Command::ExecuteWave {
            wave_id,
            resume,
            worker,
        } => execute::run(&runtime, wave_id, resume, worker),
        Command::Checkpoint { message } => checkpoint::run(&runtime, &message, false),
        Command::MicroCheckpoint { message } => checkpoint::run(&runtime, &message, true),
        Command::Status => status::run(&runtime),
        Command::Watchdog { command } => watchdog::run(&runtime, command),
    }
}
