//! `serscript` command-line entry point.

use std::process::ExitCode;

use clap::Parser;
use serscript_runner::cli::Cli;
use serscript_runner::{execute, init_tracing};

fn main() -> anyhow::Result<ExitCode> {
    let cli = Cli::parse();
    init_tracing(cli.verbose, cli.log_level.as_deref())?;
    execute(cli)
}
