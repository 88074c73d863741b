//! `risu` binary entry point (`original_source/risu.c`'s `main`):
//! parses arguments, sets up logging, and dispatches to the master or
//! apprentice run loop.

mod cli;
mod image;
mod net;
mod run;
mod ucontext;

use clap::Parser;
use std::process::ExitCode;

fn main() -> anyhow::Result<ExitCode> {
    let cli = cli::Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    run::run(&cli)
}
