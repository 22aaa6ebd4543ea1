//! Serscript runner library.
//!
//! Wires the engine to a real device link and the terminal. The `serscript`
//! binary is a thin wrapper around [`execute`].

pub mod cli;
pub mod console;
pub mod link;

use std::fs::OpenOptions;
use std::io::{self, BufRead, Write};
use std::path::Path;
use std::process::ExitCode;
use std::sync::atomic::Ordering;
use std::sync::Arc;

use anyhow::{anyhow, Context, Result};
use serscript_engine::{
    fingerprint_marker, Engine, EngineConfig, FileStore, FsFileStore, TerminationReason,
};
use serscript_protocol::{format_for_display_now, Transport};
use tracing::{debug, info, Level};
use tracing_subscriber::EnvFilter;

use crate::cli::{Cli, Commands, RunArgs};
use crate::console::{answer_unless_cancelled, ConsoleSink};
use crate::link::{read_timeout, LinkTarget};

/// Install the global tracing subscriber, logging to stderr.
///
/// `RUST_LOG` wins over both arguments.
pub fn init_tracing(verbose: u8, log_level: Option<&str>) -> Result<()> {
    let level = log_level
        .map(|lvl| lvl.to_ascii_uppercase())
        .map(|lvl| match lvl.as_str() {
            "TRACE" => Level::TRACE,
            "DEBUG" => Level::DEBUG,
            "INFO" => Level::INFO,
            "ERROR" => Level::ERROR,
            _ => Level::WARN,
        })
        .unwrap_or(match verbose {
            0 => Level::WARN,
            1 => Level::INFO,
            2 => Level::DEBUG,
            _ => Level::TRACE,
        });

    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level.as_str()));
    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(io::stderr)
        .try_init()
        .map_err(|e| anyhow!("failed to install tracing subscriber: {}", e))
}

/// Run the parsed command line.
pub fn execute(cli: Cli) -> Result<ExitCode> {
    match cli.command {
        Commands::Run(args) => {
            let reason = run_script(&args, cli.verbose > 0)?;
            println!("{}", reason);
            Ok(if reason.is_success() {
                ExitCode::SUCCESS
            } else {
                ExitCode::FAILURE
            })
        }
        Commands::Sign { script, append } => {
            let marker = sign_script(&script, append)?;
            println!("{}", marker);
            Ok(ExitCode::SUCCESS)
        }
    }
}

/// `serscript run`: open the link and run the script interactively.
pub fn run_script(args: &RunArgs, show_trace: bool) -> Result<TerminationReason> {
    let config = match &args.config {
        Some(path) => EngineConfig::from_yaml_file(path)?,
        None => EngineConfig::default(),
    };

    let target = LinkTarget::from_args(&args.link, args.baud)?;
    let transport = target.open(read_timeout(config.read_timeout_ms))?;

    let stdin = io::stdin();
    run_with_transport(
        config,
        transport,
        &args.script,
        &args.routine,
        stdin.lock(),
        show_trace,
    )
}

/// Load `script` and run `routine` over `transport`, answering prompts from
/// `answers`.
///
/// Ctrl-C cancels the run. While waiting at a prompt it takes effect once the
/// answer line is entered, and that answer is discarded.
pub fn run_with_transport<T, R>(
    config: EngineConfig,
    transport: T,
    script: &Path,
    routine: &str,
    mut answers: R,
    show_trace: bool,
) -> Result<TerminationReason>
where
    T: Transport + 'static,
    R: BufRead,
{
    let mut engine = Engine::builder()
        .config(config)
        .transport(transport)
        .info_sink(ConsoleSink::stdout(show_trace))
        .observer(|command: &str, last_row: &str, _: &[u8]| {
            debug!(
                "Runner: '{}' -> '{}'",
                format_for_display_now(command, |_| None),
                last_row
            );
        })
        .file_store(FsFileStore)
        .build()?;

    engine
        .load_file(script)
        .with_context(|| format!("failed to load {}", script.display()))?;

    let cancel = engine.cancel_handle();
    let interrupt = Arc::clone(&cancel);
    if let Err(e) = ctrlc::set_handler(move || interrupt.store(true, Ordering::SeqCst)) {
        // ctrlc allows a single handler per process
        debug!("Runner: Ctrl-C handler not installed: {}", e);
    }

    info!("Runner: running routine {:?} of {}", routine, script.display());
    let reason =
        engine.run_with_input(routine, |_| answer_unless_cancelled(&cancel, &mut answers))?;
    engine.close();
    Ok(reason)
}

/// `serscript sign`: compute the fingerprint marker of a script, optionally
/// appending it to the file.
pub fn sign_script(path: &Path, append: bool) -> Result<String> {
    let lines = FsFileStore.read_all_lines(path)?;
    let marker = fingerprint_marker(&lines);

    if append {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read {}", path.display()))?;
        let mut file = OpenOptions::new()
            .append(true)
            .open(path)
            .with_context(|| format!("failed to open {}", path.display()))?;
        if !text.is_empty() && !text.ends_with('\n') {
            writeln!(file)?;
        }
        writeln!(file, "{}", marker)?;
        info!("Runner: sealed {}", path.display());
    }

    Ok(marker)
}
