//! The script execution engine.
//!
//! The engine runs one routine at a time as a cooperative state machine. Jumps
//! push a frame on an explicit call stack instead of recursing, so a `U` prompt
//! can suspend at any depth: [`Engine::run`] returns
//! [`RunState::AwaitingInput`] and the driver continues with
//! [`Engine::resume`] once the user has answered.
//!
//! Per command, in order:
//! 1. `?` re-evaluates the gate of the current routine.
//! 2. With the gate closed every other command is skipped.
//! 3. Open-gated commands are dispatched by kind.
//! 4. The command observer is told about the command.
//! 5. A quit (or any fatal error) unwinds the whole stack.

use std::fmt;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use serscript_protocol::{
    checksum_hex, format_for_display_now, hex_to_bytes, xor_checksum, Frame, LineSession,
    ProtocolError, Transport,
};
use tracing::{debug, info, trace, warn};

use crate::command::{Command, CommandKind};
use crate::condition::Condition;
use crate::config::EngineConfig;
use crate::error::{ScriptError, ScriptResult};
use crate::ports::{CommandObserver, FileStore, InfoSink, Notification, Severity};
use crate::script::RoutineTable;
use crate::variables::VariableStore;

// ============================================================================
// Run States
// ============================================================================

/// Why a run ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TerminationReason {
    /// All commands of the entry routine were executed.
    Completed,
    /// A `Q` command stopped the script.
    Quit,
    /// The run was cancelled from outside (for example Ctrl-C).
    Cancelled,
    /// A run or jump named a routine that does not exist.
    RoutineNotFound(String),
    /// A `?` condition could not be evaluated.
    ConditionError(String),
    /// The shared jump budget ran out.
    CallDepthExceeded,
    /// Any other fatal error (format, variable, transport).
    Failed(String),
}

impl TerminationReason {
    /// Whether the script ended the way it was written to.
    pub fn is_success(&self) -> bool {
        matches!(self, TerminationReason::Completed | TerminationReason::Quit)
    }
}

impl fmt::Display for TerminationReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TerminationReason::Completed => write!(f, "completed"),
            TerminationReason::Quit => write!(f, "quit"),
            TerminationReason::Cancelled => write!(f, "cancelled"),
            TerminationReason::RoutineNotFound(name) => write!(f, "routine not found: {:?}", name),
            TerminationReason::ConditionError(msg) => write!(f, "condition error: {}", msg),
            TerminationReason::CallDepthExceeded => write!(f, "call depth exceeded"),
            TerminationReason::Failed(msg) => write!(f, "failed: {}", msg),
        }
    }
}

/// Where a run stands after [`Engine::run`] or [`Engine::resume`] returns.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunState {
    /// Suspended on a `U` prompt; call [`Engine::resume`] with the answer.
    AwaitingInput {
        /// The prompt as shown to the user.
        prompt: String,
    },
    /// The run is over.
    Terminated(TerminationReason),
}

/// One routine invocation on the call stack.
#[derive(Debug)]
struct CallFrame {
    routine: String,
    position: usize,
    gate_open: bool,
    /// The `J` command that entered this routine; observed when it returns.
    caller: Option<Command>,
}

impl CallFrame {
    fn new(routine: impl Into<String>, caller: Option<Command>) -> Self {
        CallFrame {
            routine: routine.into(),
            position: 0,
            gate_open: true,
            caller,
        }
    }
}

/// Outcome of dispatching a single command.
enum Step {
    Next,
    Gate(bool),
    Enter(String),
    Suspend(String),
    Stop(TerminationReason),
}

// ============================================================================
// Builder
// ============================================================================

/// Builder for [`Engine`]. Transport, info sink and file store are mandatory.
#[derive(Default)]
pub struct EngineBuilder {
    config: EngineConfig,
    transport: Option<Box<dyn Transport>>,
    info: Option<Box<dyn InfoSink>>,
    observer: Option<Box<dyn CommandObserver>>,
    files: Option<Box<dyn FileStore>>,
}

impl EngineBuilder {
    /// Start a builder with the default configuration.
    pub fn new() -> Self {
        EngineBuilder::default()
    }

    /// Use a configuration.
    pub fn config(mut self, config: EngineConfig) -> Self {
        self.config = config;
        self
    }

    /// The device link.
    pub fn transport(mut self, transport: impl Transport + 'static) -> Self {
        self.transport = Some(Box::new(transport));
        self
    }

    /// Receiver of user-visible messages and prompts.
    pub fn info_sink(mut self, info: impl InfoSink + 'static) -> Self {
        self.info = Some(Box::new(info));
        self
    }

    /// Observer called after every command.
    pub fn observer(mut self, observer: impl CommandObserver + 'static) -> Self {
        self.observer = Some(Box::new(observer));
        self
    }

    /// File access for `L`, `W` and script loading.
    pub fn file_store(mut self, files: impl FileStore + 'static) -> Self {
        self.files = Some(Box::new(files));
        self
    }

    /// Build the engine, failing if a mandatory collaborator is missing.
    pub fn build(self) -> ScriptResult<Engine> {
        self.config.validate()?;
        let transport = self
            .transport
            .ok_or_else(|| ScriptError::Config("no transport configured".to_string()))?;
        let info = self
            .info
            .ok_or_else(|| ScriptError::Config("no info sink configured".to_string()))?;
        let files = self
            .files
            .ok_or_else(|| ScriptError::Config("no file store configured".to_string()))?;

        let budget = i64::from(self.config.call_depth_budget);
        Ok(Engine {
            config: self.config,
            session: LineSession::new(transport),
            info,
            observer: self.observer,
            files,
            routines: RoutineTable::default(),
            variables: VariableStore::new(),
            last_row: String::new(),
            last_data: Vec::new(),
            quit: false,
            budget,
            stack: Vec::new(),
            pending: None,
            cancel: Arc::new(AtomicBool::new(false)),
        })
    }
}

// ============================================================================
// Engine
// ============================================================================

/// Loads scripts and executes their routines against a device.
pub struct Engine {
    config: EngineConfig,
    session: LineSession,
    info: Box<dyn InfoSink>,
    observer: Option<Box<dyn CommandObserver>>,
    files: Box<dyn FileStore>,

    routines: RoutineTable,
    variables: VariableStore,

    // Execution state
    last_row: String,
    last_data: Vec<u8>,
    quit: bool,
    budget: i64,
    stack: Vec<CallFrame>,
    /// The `U` command waiting for input, if any.
    pending: Option<Command>,
    cancel: Arc<AtomicBool>,
}

impl Engine {
    /// Start building an engine.
    pub fn builder() -> EngineBuilder {
        EngineBuilder::new()
    }

    // ========================================================================
    // Loading
    // ========================================================================

    /// Load a script from lines, replacing the previous one.
    ///
    /// All state is reset before parsing, so a failed load leaves no routines.
    pub fn load_lines<S: AsRef<str>>(&mut self, lines: &[S]) -> ScriptResult<()> {
        self.ensure_idle()?;
        self.reset();
        self.install(RoutineTable::parse(lines))
    }

    /// Load a script file through the file store, replacing the previous one.
    pub fn load_file(&mut self, path: impl Into<PathBuf>) -> ScriptResult<()> {
        self.ensure_idle()?;
        self.reset();
        let path = path.into();
        let parsed = self
            .files
            .read_all_lines(&path)
            .and_then(|lines| RoutineTable::parse(&lines));
        info!("Engine: loading script {}", path.display());
        self.install(parsed)
    }

    fn install(&mut self, parsed: ScriptResult<RoutineTable>) -> ScriptResult<()> {
        match parsed {
            Ok(routines) => {
                debug!("Engine: loaded {} routines", routines.len());
                self.routines = routines;
                Ok(())
            }
            Err(e) => {
                warn!("Engine: script load failed: {}", e);
                self.notify(Notification::new(format!("load failed: {}", e), Severity::Error));
                Err(e)
            }
        }
    }

    fn reset(&mut self) {
        self.routines = RoutineTable::default();
        self.variables.clear();
        self.last_row.clear();
        self.last_data.clear();
        self.quit = false;
        self.stack.clear();
        self.pending = None;
    }

    fn ensure_idle(&self) -> ScriptResult<()> {
        if self.pending.is_some() {
            return Err(ScriptError::Busy);
        }
        Ok(())
    }

    // ========================================================================
    // Running
    // ========================================================================

    /// Run a routine from its first command.
    pub fn run(&mut self, routine: &str) -> ScriptResult<RunState> {
        self.ensure_idle()?;
        self.quit = false;
        self.cancel.store(false, Ordering::SeqCst);
        self.budget = i64::from(self.config.call_depth_budget);
        self.stack.clear();

        if !self.routines.contains(routine) {
            return Ok(self.terminate(TerminationReason::RoutineNotFound(routine.to_string())));
        }

        info!("Engine[{}]: run started", routine);
        self.stack.push(CallFrame::new(routine, None));
        Ok(self.drive())
    }

    /// Deliver the answer to the outstanding prompt and continue the run.
    pub fn resume(&mut self, input: &str) -> ScriptResult<RunState> {
        let Some(command) = self.pending.take() else {
            warn!("Engine: input {:?} delivered with no prompt outstanding", input);
            return Err(ScriptError::NoPendingInput);
        };

        self.last_row = input.to_string();
        self.last_data.clear();
        self.observe(&command);
        Ok(self.drive())
    }

    /// Run a routine, answering prompts with `answer` until the run ends.
    ///
    /// Returning `None` from `answer` cancels the run.
    pub fn run_with_input<F>(&mut self, routine: &str, mut answer: F) -> ScriptResult<TerminationReason>
    where
        F: FnMut(&str) -> Option<String>,
    {
        let mut state = self.run(routine)?;
        loop {
            match state {
                RunState::Terminated(reason) => return Ok(reason),
                RunState::AwaitingInput { prompt } => match answer(&prompt) {
                    Some(input) => state = self.resume(&input)?,
                    None => {
                        self.pending = None;
                        self.terminate(TerminationReason::Cancelled);
                        return Ok(TerminationReason::Cancelled);
                    }
                },
            }
        }
    }

    /// Execute commands until the run ends or suspends.
    fn drive(&mut self) -> RunState {
        loop {
            if self.cancel.load(Ordering::SeqCst) {
                return self.terminate(TerminationReason::Cancelled);
            }
            if self.quit {
                return self.terminate(TerminationReason::Quit);
            }

            let Some(frame) = self.stack.last_mut() else {
                return self.terminate(TerminationReason::Completed);
            };

            let next = self
                .routines
                .get(&frame.routine)
                .and_then(|commands| commands.get(frame.position))
                .cloned();

            let Some(command) = next else {
                if let Some(finished) = self.stack.pop() {
                    trace!("Engine[{}]: routine returned", finished.routine);
                    if let Some(caller) = finished.caller {
                        self.observe(&caller);
                    }
                }
                continue;
            };

            frame.position += 1;
            let gate_open = frame.gate_open;

            match self.dispatch(&command, gate_open) {
                Ok(Step::Next) => self.observe(&command),
                Ok(Step::Gate(open)) => {
                    if let Some(frame) = self.stack.last_mut() {
                        frame.gate_open = open;
                    }
                    self.observe(&command);
                }
                Ok(Step::Enter(target)) => {
                    debug!("Engine[{}]: entering routine (budget left {})", target, self.budget);
                    self.stack.push(CallFrame::new(target, Some(command)));
                }
                Ok(Step::Suspend(prompt)) => {
                    self.pending = Some(command);
                    return RunState::AwaitingInput { prompt };
                }
                Ok(Step::Stop(reason)) => {
                    self.observe(&command);
                    return self.terminate(reason);
                }
                Err(e) => {
                    let reason = match e {
                        ScriptError::RoutineNotFound(name) => {
                            TerminationReason::RoutineNotFound(name)
                        }
                        ScriptError::CallDepthExceeded { .. } => {
                            TerminationReason::CallDepthExceeded
                        }
                        other => TerminationReason::Failed(format!(
                            "{}: {}",
                            self.display(command.line()),
                            other
                        )),
                    };
                    self.observe(&command);
                    return self.terminate(reason);
                }
            }
        }
    }

    /// End the run, unwinding the whole call stack.
    fn terminate(&mut self, reason: TerminationReason) -> RunState {
        self.stack.clear();
        match &reason {
            TerminationReason::Completed => debug!("Engine: run completed"),
            TerminationReason::Quit => {
                self.quit = true;
                info!("Engine: run quit");
            }
            other => {
                self.quit = true;
                warn!("Engine: run aborted: {}", other);
                let severity = match other {
                    TerminationReason::Cancelled => Severity::Warning,
                    _ => Severity::Error,
                };
                self.notify(Notification::new(other.to_string(), severity));
            }
        }
        RunState::Terminated(reason)
    }

    // ========================================================================
    // Dispatch
    // ========================================================================

    fn dispatch(&mut self, command: &Command, gate_open: bool) -> ScriptResult<Step> {
        if !gate_open && command.kind() != CommandKind::Condition {
            trace!("Engine: gate closed, skipping '{}'", self.display(command.line()));
            return Ok(Step::Next);
        }

        match command.kind() {
            CommandKind::Condition => {
                let outcome = Condition::parse(command.raw())
                    .and_then(|condition| condition.evaluate(&self.variables, &self.last_row));
                match outcome {
                    Ok(open) => {
                        trace!("Engine: condition '{}' -> {}", command.line(), open);
                        Ok(Step::Gate(open))
                    }
                    Err(e) => Ok(Step::Stop(TerminationReason::ConditionError(format!(
                        "{}: {}",
                        self.display(command.line()),
                        e
                    )))),
                }
            }
            CommandKind::Define => {
                let name = self.variables.define(command.raw().trim(), &self.last_row)?;
                trace!("Engine: defined ${}", name);
                let shown = self.display(command.line());
                self.notify(Notification::new(shown, Severity::Trace));
                Ok(Step::Next)
            }
            CommandKind::Jump => {
                self.budget -= 1;
                if self.budget < 0 {
                    return Err(ScriptError::CallDepthExceeded {
                        budget: self.config.call_depth_budget,
                    });
                }
                let target = command.argument();
                if !self.routines.contains(target) {
                    return Err(ScriptError::RoutineNotFound(target.to_string()));
                }
                Ok(Step::Enter(target.to_string()))
            }
            CommandKind::Data => {
                let payload = command.binary_payload().unwrap_or_default().to_vec();
                self.exchange(&Frame::data(payload))?;
                Ok(Step::Next)
            }
            CommandKind::Hex => {
                let line = self.variables.substitute(command.line())?;
                self.send_hex(&line)?;
                Ok(Step::Next)
            }
            CommandKind::LoadFile => {
                self.send_file(command)?;
                Ok(Step::Next)
            }
            CommandKind::Message => {
                let shown = self.display_body(command);
                self.notify(Notification::new(shown, Severity::Info));
                Ok(Step::Next)
            }
            CommandKind::Quit => Ok(Step::Stop(TerminationReason::Quit)),
            CommandKind::UserInput => {
                let prompt = self.display_body(command);
                self.notify(Notification::prompt(prompt.clone()));
                Ok(Step::Suspend(prompt))
            }
            CommandKind::WriteFile => {
                self.write_last_row(command);
                Ok(Step::Next)
            }
            CommandKind::Checksum => {
                let line = self.variables.substitute(command.line())?;
                self.send_crc(&line)?;
                Ok(Step::Next)
            }
            CommandKind::Routine => Ok(Step::Next),
            CommandKind::Transparent(_) => {
                let line = self.variables.substitute(command.line())?;
                self.exchange(&Frame::text(line))?;
                Ok(Step::Next)
            }
        }
    }

    /// Write one frame and read its response into the last row/data.
    fn exchange(&mut self, frame: &Frame) -> ScriptResult<()> {
        let response = self.session.exchange(frame)?;
        debug!("Engine: response '{}'", response.row);
        self.last_row = response.row;
        self.last_data = response.data;
        Ok(())
    }

    /// Send hex text as bytes.
    ///
    /// Spaces are ignored. For `H`, `X` and `Z` lines with an odd length the tag
    /// is dropped. Hex shorter than the inline limit goes out as a binary `D`
    /// frame; longer hex is sent upper-cased as a text line.
    pub fn send_hex(&mut self, command_text: &str) -> ScriptResult<()> {
        let compact: String = command_text.chars().filter(|c| *c != ' ').collect();
        let hex = match compact.chars().next() {
            Some('H' | 'X' | 'Z') if compact.len() % 2 == 1 => &compact[1..],
            _ => compact.as_str(),
        };
        if hex.is_empty() {
            return Err(ProtocolError::EmptyHex(command_text.to_string()).into());
        }

        let bytes = hex_to_bytes(hex)?;
        if hex.len() < self.config.hex_inline_limit {
            self.exchange(&Frame::data(bytes))
        } else {
            debug!("Engine: {} hex chars, sending as text", hex.len());
            self.exchange(&Frame::text(command_text.trim().to_uppercase()))
        }
    }

    /// Send a checksum (bare `X`) or fall back to [`send_hex`](Engine::send_hex).
    ///
    /// The checksum covers the bytes of the last row and the last data.
    pub fn send_crc(&mut self, command_text: &str) -> ScriptResult<()> {
        if command_text.trim().chars().count() != 1 {
            return self.send_hex(command_text);
        }
        let checksum = xor_checksum(self.last_row.as_bytes()) ^ xor_checksum(&self.last_data);
        debug!("Engine: sending checksum {}", checksum_hex(checksum));
        self.exchange(&Frame::checksum(checksum))
    }

    /// `L`: hex-send every non-blank line of a file. A missing file is a warning.
    fn send_file(&mut self, command: &Command) -> ScriptResult<()> {
        let path = PathBuf::from(command.argument());
        if path.as_os_str().is_empty() {
            self.warn_file(format!("{}: no file given", command.line()));
            return Ok(());
        }

        let lines = match self.files.read_all_lines(&path) {
            Ok(lines) => lines,
            Err(e) => {
                self.warn_file(e.to_string());
                return Ok(());
            }
        };

        debug!("Engine: sending {} lines from {}", lines.len(), path.display());
        for line in lines.iter().map(|l| l.trim()).filter(|l| !l.is_empty()) {
            self.send_hex(line)?;
        }
        Ok(())
    }

    /// `W`: append the last row to a file. Failures are warnings.
    fn write_last_row(&mut self, command: &Command) {
        let path = match command.argument() {
            "" => self.config.default_output.clone(),
            given => Some(PathBuf::from(given)),
        };
        let Some(path) = path else {
            self.warn_file(format!("{}: no file given and no default output", command.line()));
            return;
        };

        if let Err(e) = self.files.append_line(&path, &self.last_row) {
            self.warn_file(e.to_string());
        }
    }

    fn warn_file(&mut self, message: String) {
        warn!("Engine: {}", message);
        self.notify(Notification::new(message, Severity::Warning));
    }

    // ========================================================================
    // Notifications
    // ========================================================================

    fn notify(&mut self, notification: Notification) {
        self.info.notify(&notification);
    }

    fn observe(&mut self, command: &Command) {
        if let Some(observer) = self.observer.as_mut() {
            observer.on_command(command.line(), &self.last_row, &self.last_data);
        }
    }

    /// Display form of a line with the current variables.
    pub fn display(&self, line: &str) -> String {
        format_for_display_now(line, |name| self.variables.lookup(name).map(str::to_string))
    }

    /// Display form of a command without its tag.
    fn display_body(&self, command: &Command) -> String {
        let shown = self.display(command.line());
        let body = shown.get(command.tag().len_utf8()..).unwrap_or_default();
        body.strip_prefix(' ').unwrap_or(body).to_string()
    }

    // ========================================================================
    // Accessors
    // ========================================================================

    /// The most recent response row or user input.
    pub fn last_row(&self) -> &str {
        &self.last_row
    }

    /// The most recent binary response payload.
    pub fn last_data(&self) -> &[u8] {
        &self.last_data
    }

    /// The variables of the current script.
    pub fn variables(&self) -> &VariableStore {
        &self.variables
    }

    /// The routines of the current script.
    pub fn routines(&self) -> &RoutineTable {
        &self.routines
    }

    /// The active configuration.
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Whether the last run was stopped by a quit or an error.
    pub fn is_quit(&self) -> bool {
        self.quit
    }

    /// Whether a prompt is waiting for input.
    pub fn is_suspended(&self) -> bool {
        self.pending.is_some()
    }

    /// Jumps left in the current run's budget.
    pub fn budget_remaining(&self) -> i64 {
        self.budget.max(0)
    }

    /// Flag that cancels the current run at the next command boundary.
    pub fn cancel_handle(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.cancel)
    }

    /// Close the device link.
    pub fn close(&mut self) {
        self.session.close();
    }
}

impl fmt::Debug for Engine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Engine")
            .field("config", &self.config)
            .field("routines", &self.routines.len())
            .field("last_row", &self.last_row)
            .field("quit", &self.quit)
            .field("depth", &self.stack.len())
            .field("suspended", &self.pending.is_some())
            .finish_non_exhaustive()
    }
}
