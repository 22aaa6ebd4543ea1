//! Serial Script Engine
//!
//! This crate loads line-oriented test scripts and executes them against a
//! device reachable through a [`serscript_protocol::Transport`].
//!
//! # Script Overview
//!
//! Each line is one command, selected by its first character:
//!
//! | Tag | Action                                                     |
//! |-----|------------------------------------------------------------|
//! | `?` | Open or close the gate for the rest of the routine         |
//! | `$` | Define a variable                                          |
//! | `:` | Start a routine                                            |
//! | `J` | Jump into a routine                                        |
//! | `D` | Send raw bytes as a binary frame                           |
//! | `H` | Send hex as bytes (`Z` is an alias)                        |
//! | `X` | Send a checksum of the last response, or hex               |
//! | `L` | Send every line of a file as hex                           |
//! | `W` | Append the last response to a file                         |
//! | `M` | Show a message                                             |
//! | `U` | Prompt the user and wait for input                         |
//! | `Q` | Stop the script                                            |
//! | `O` | Fingerprint of all preceding lines (checked at load)       |
//! | `#` | Comment                                                    |
//!
//! Any other tag is forwarded to the device as a text line.
//!
//! # Example
//!
//! ```rust,ignore
//! use serscript_engine::{Engine, FsFileStore, RunState};
//! use serscript_protocol::ScriptedTransport;
//!
//! let (transport, _log) = ScriptedTransport::new();
//! let mut engine = Engine::builder()
//!     .transport(transport)
//!     .info_sink(|n: &serscript_engine::Notification| println!("{}", n.message))
//!     .file_store(FsFileStore)
//!     .build()?;
//!
//! engine.load_file("flash.scr")?;
//! match engine.run("")? {
//!     RunState::AwaitingInput { prompt } => { /* ask, then engine.resume(..) */ }
//!     RunState::Terminated(reason) => println!("{}", reason),
//! }
//! ```

mod command;
mod condition;
mod config;
mod engine;
mod error;
mod ports;
mod script;
mod variables;

pub use command::*;
pub use condition::*;
pub use config::*;
pub use engine::*;
pub use error::*;
pub use ports::*;
pub use script::*;
pub use variables::*;
