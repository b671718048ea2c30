//! `wavefront` — wave-based task orchestration CLI.

mod cli;
mod commands;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use crate::cli::Cli;

fn main() {
    init_tracing();
    let args = Cli::parse();
    match commands::run(args) {
        Ok(()) => {}
        Err(err) => {
            let code = err.exit_code();
            let report = miette::Report::msg(err.to_string());
            eprintln!("{report:?}");
            std::process::exit(code);
        }
    }
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    let _ = tracing_log::LogTracer::init();
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}
