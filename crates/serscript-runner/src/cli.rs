//! Command-line definition.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

/// Default serial baud rate.
pub const DEFAULT_BAUD: u32 = 115_200;

/// Run serscript test scripts against a device.
#[derive(Parser, Debug)]
#[command(name = "serscript", author, version, about, long_about = None)]
pub struct Cli {
    /// Increase output verbosity (-v shows script activity, -vv protocol traffic).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Override log level (e.g. info, debug, trace).
    #[arg(long, global = true)]
    pub log_level: Option<String>,

    /// Subcommand.
    #[command(subcommand)]
    pub command: Commands,
}

/// Runner subcommands.
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Load a script and run one of its routines.
    Run(RunArgs),
    /// Print the fingerprint marker for a script.
    Sign {
        /// Script file to fingerprint.
        script: PathBuf,
        /// Append the marker to the script instead of printing it.
        #[arg(long)]
        append: bool,
    },
}

/// Arguments of `serscript run`.
#[derive(Args, Debug, Clone)]
pub struct RunArgs {
    /// Script file.
    pub script: PathBuf,

    /// Routine to run; the entry routine when omitted.
    #[arg(short, long, default_value = "")]
    pub routine: String,

    /// Engine configuration (YAML).
    #[arg(short, long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Device link.
    #[command(flatten)]
    pub link: LinkArgs,

    /// Serial baud rate.
    #[arg(long, default_value_t = DEFAULT_BAUD)]
    pub baud: u32,
}

/// Device link selection. Exactly one of serial or TCP.
#[derive(Args, Debug, Clone)]
#[group(required = true, multiple = false)]
pub struct LinkArgs {
    /// Serial port path (e.g. /dev/ttyUSB0, COM3).
    #[arg(long, value_name = "PATH")]
    pub serial: Option<String>,

    /// TCP address of a UART bridge (e.g. 127.0.0.1:9000).
    #[arg(long, value_name = "ADDR")]
    pub tcp: Option<String>,
}
