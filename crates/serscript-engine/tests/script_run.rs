//! End-to-end tests: scripts loaded and run against a scripted device.

use std::sync::atomic::Ordering;
use std::sync::Arc;

use parking_lot::Mutex;
use serscript_engine::{
    fingerprint_marker, Engine, EngineConfig, FsFileStore, InfoSink, MemoryFileStore,
    Notification, RunState, ScriptError, Severity, TerminationReason,
};
use serscript_protocol::{ScriptedTransport, TransportLog};

// ============================================================================
// Harness
// ============================================================================

#[derive(Clone, Default)]
struct Recorder {
    notes: Arc<Mutex<Vec<Notification>>>,
}

impl InfoSink for Recorder {
    fn notify(&mut self, notification: &Notification) {
        self.notes.lock().push(notification.clone());
    }
}

impl Recorder {
    fn messages(&self, severity: Severity) -> Vec<String> {
        self.notes
            .lock()
            .iter()
            .filter(|n| n.severity == severity && !n.requires_input)
            .map(|n| n.message.clone())
            .collect()
    }
}

/// A command as the observer saw it, with the last row and data at that time.
#[derive(Debug, Clone, PartialEq)]
struct Seen {
    line: String,
    last_row: String,
    last_data: Vec<u8>,
}

struct Bench {
    engine: Engine,
    log: TransportLog,
    info: Recorder,
    files: MemoryFileStore,
    observed: Arc<Mutex<Vec<Seen>>>,
}

impl Bench {
    fn observed_lines(&self) -> Vec<String> {
        self.observed.lock().iter().map(|s| s.line.clone()).collect()
    }
}

fn bench_with(config: EngineConfig, responses: Vec<Vec<u8>>) -> Bench {
    let (transport, log) = ScriptedTransport::with_responses(responses);
    let info = Recorder::default();
    let files = MemoryFileStore::new();
    let observed = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&observed);

    let engine = Engine::builder()
        .config(config)
        .transport(transport)
        .info_sink(info.clone())
        .observer(move |line: &str, last_row: &str, last_data: &[u8]| {
            sink.lock().push(Seen {
                line: line.to_string(),
                last_row: last_row.to_string(),
                last_data: last_data.to_vec(),
            })
        })
        .file_store(files.clone())
        .build()
        .unwrap();

    Bench {
        engine,
        log,
        info,
        files,
        observed,
    }
}

fn bench(responses: &[&str]) -> Bench {
    let responses = responses.iter().map(|r| r.as_bytes().to_vec()).collect();
    bench_with(EngineConfig::default(), responses)
}

fn run_script(bench: &mut Bench, lines: &[&str], routine: &str) -> RunState {
    bench.engine.load_lines(lines).unwrap();
    bench.engine.run(routine).unwrap()
}

fn terminated(reason: TerminationReason) -> RunState {
    RunState::Terminated(reason)
}

// ============================================================================
// Gating and Messages
// ============================================================================

#[test]
fn test_condition_true_shows_message() {
    let mut b = bench(&[]);
    let state = run_script(&mut b, &["$x=5", "?$x==5", "M hello"], "");

    assert_eq!(state, terminated(TerminationReason::Completed));
    // The definition echo is a trace note, so "hello" is the only info message
    let notes: Vec<(String, Severity)> = b
        .info
        .notes
        .lock()
        .iter()
        .map(|n| (n.message.clone(), n.severity))
        .collect();
    assert_eq!(
        notes,
        vec![
            ("$ x=5".to_string(), Severity::Trace),
            ("hello".to_string(), Severity::Info),
        ]
    );
    assert!(b.log.is_empty(), "nothing should be transmitted");
}

#[test]
fn test_closed_gate_skips_rest_of_routine() {
    let mut b = bench(&[]);
    let state = run_script(&mut b, &["?a==b", "M hidden", "Q"], "");

    assert_eq!(state, terminated(TerminationReason::Completed));
    assert!(b.info.messages(Severity::Info).is_empty());
}

#[test]
fn test_gate_can_reopen() {
    let mut b = bench(&[]);
    run_script(&mut b, &["?a==b", "M hidden", "?", "M shown"], "");
    assert_eq!(b.info.messages(Severity::Info), vec!["shown"]);
}

#[test]
fn test_gate_is_per_routine() {
    let mut b = bench(&[]);
    let lines = ["J sub", "M after", ": sub", "?yes==no", "M never"];
    let state = run_script(&mut b, &lines, "");

    assert_eq!(state, terminated(TerminationReason::Completed));
    assert_eq!(b.info.messages(Severity::Info), vec!["after"]);
}

#[test]
fn test_inequality_condition() {
    let mut b = bench(&[]);
    run_script(&mut b, &["$mode=boot", "?$mode<>app", "M booting"], "");
    assert_eq!(b.info.messages(Severity::Info), vec!["booting"]);
}

#[test]
fn test_condition_against_response() {
    let mut b = bench(&["OK"]);
    run_script(&mut b, &["P ping", "?OK", "M pong"], "");
    assert_eq!(b.info.messages(Severity::Info), vec!["pong"]);

    let mut b = bench(&["ERR"]);
    run_script(&mut b, &["P ping", "?OK", "M pong"], "");
    assert!(b.info.messages(Severity::Info).is_empty());
}

#[test]
fn test_undefined_variable_in_condition() {
    let mut b = bench(&[]);
    let state = run_script(&mut b, &["?$missing==1", "M x"], "");

    assert!(matches!(
        state,
        RunState::Terminated(TerminationReason::ConditionError(_))
    ));
    assert!(b.engine.is_quit());
    assert_eq!(b.info.messages(Severity::Error).len(), 1);
    // The failing condition is still observed, the skipped message is not run
    assert_eq!(b.observed_lines(), vec!["?$missing==1"]);
}

#[test]
fn test_message_substitutes_variables() {
    let mut b = bench(&[]);
    run_script(&mut b, &["$board=rev3", "M testing $board"], "");
    assert_eq!(b.info.messages(Severity::Info), vec!["testing rev3"]);
}

#[test]
fn test_quit_stops_everything() {
    let mut b = bench(&[]);
    let lines = ["J sub", "M after", ": sub", "M a", "Q", "M b"];
    let state = run_script(&mut b, &lines, "");

    assert_eq!(state, terminated(TerminationReason::Quit));
    assert_eq!(b.info.messages(Severity::Info), vec!["a"]);
    assert!(b.engine.is_quit());
}

// ============================================================================
// Transmission
// ============================================================================

#[test]
fn test_hex_line_sends_binary_frame() {
    let mut b = bench(&[]);
    run_script(&mut b, &["H 48656c6c6f"], "");

    assert_eq!(
        b.log.writes(),
        vec![vec![b'D', 5, 0x48, 0x65, 0x6c, 0x6c, 0x6f, b'\n']]
    );
}

#[test]
fn test_data_line_sends_own_payload() {
    let mut b = bench(&[]);
    run_script(&mut b, &["D abc"], "");
    assert_eq!(b.log.writes(), vec![vec![b'D', 3, b'a', b'b', b'c', b'\n']]);
}

#[test]
fn test_transparent_command_with_variables() {
    let mut b = bench(&[]);
    run_script(&mut b, &["$addr=10", "P $addr 1"], "");
    assert_eq!(b.log.writes(), vec![b"P 10 1\n".to_vec()]);
}

#[test]
fn test_transparent_undefined_variable_fails() {
    let mut b = bench(&[]);
    let state = run_script(&mut b, &["P $nope"], "");
    assert!(matches!(state, RunState::Terminated(TerminationReason::Failed(_))));
    assert!(b.log.is_empty());
}

#[test]
fn test_invalid_hex_fails_run() {
    let mut b = bench(&[]);
    let state = run_script(&mut b, &["H 0q", "M after"], "");

    assert!(matches!(state, RunState::Terminated(TerminationReason::Failed(_))));
    assert!(b.info.messages(Severity::Info).is_empty());
    assert!(b.log.is_empty());
}

#[test]
fn test_failed_data_line_is_redacted_in_error() {
    let mut b = bench(&[]);
    let line = format!("D \x07{}", "A".repeat(300));
    let state = run_script(&mut b, &[line.as_str()], "");

    let message = match state {
        RunState::Terminated(TerminationReason::Failed(message)) => message,
        other => panic!("expected a failed run, got {:?}", other),
    };
    assert!(message.contains("[binary]"));
    assert!(!message.contains('\x07'));

    let errors = b.info.messages(Severity::Error);
    assert_eq!(errors.len(), 1);
    assert!(errors[0].contains("[binary]"));
    assert!(!errors[0].contains('\x07'));
    assert!(b.log.is_empty());
}

#[test]
fn test_binary_response_sets_last_data() {
    let responses = vec![vec![b'D', 2, 0xaa, 0xbb]];
    let mut b = bench_with(EngineConfig::default(), responses);
    run_script(&mut b, &["P read"], "");

    assert_eq!(b.engine.last_data(), &[0xaa, 0xbb]);
}

#[test]
fn test_checksum_of_last_response() {
    let mut b = bench(&["AB"]);
    run_script(&mut b, &["P read", "X"], "");

    let writes = b.log.writes();
    assert_eq!(writes[1], vec![b'X', 1, b'A' ^ b'B', b'\n']);
}

#[test]
fn test_response_into_variable() {
    let mut b = bench(&["SN-0042"]);
    run_script(&mut b, &["P serial", "$serial", "M got $serial"], "");
    assert_eq!(b.info.messages(Severity::Info), vec!["got SN-0042"]);
}

#[test]
fn test_transport_failure_aborts() {
    let mut b = bench(&[]);
    b.engine.load_lines(&["P 1", "M after"]).unwrap();
    b.engine.close();

    let state = b.engine.run("").unwrap();
    assert!(matches!(state, RunState::Terminated(TerminationReason::Failed(_))));
    assert!(b.info.messages(Severity::Info).is_empty());
}

// ============================================================================
// Files
// ============================================================================

#[test]
fn test_load_file_sends_each_line() {
    let mut b = bench(&[]);
    b.files.insert("fw.hex", ["0102", "", "  0304  "]);
    run_script(&mut b, &["L fw.hex"], "");

    assert_eq!(
        b.log.writes(),
        vec![vec![b'D', 2, 1, 2, b'\n'], vec![b'D', 2, 3, 4, b'\n']]
    );
}

#[test]
fn test_missing_file_is_a_warning() {
    let mut b = bench(&[]);
    let state = run_script(&mut b, &["L nowhere.hex", "M continued"], "");

    assert_eq!(state, terminated(TerminationReason::Completed));
    assert_eq!(b.info.messages(Severity::Warning).len(), 1);
    assert_eq!(b.info.messages(Severity::Info), vec!["continued"]);
}

#[test]
fn test_write_appends_last_row() {
    let mut b = bench(&["42", "43"]);
    run_script(&mut b, &["P a", "W out.txt", "P b", "W : out.txt"], "");
    assert_eq!(
        b.files.lines("out.txt"),
        Some(vec!["42".to_string(), "43".to_string()])
    );
}

#[test]
fn test_write_uses_default_output() {
    let config = EngineConfig {
        default_output: Some("results.log".into()),
        ..EngineConfig::default()
    };
    let mut b = bench_with(config, vec![b"PASS".to_vec()]);
    run_script(&mut b, &["P test", "W"], "");
    assert_eq!(b.files.lines("results.log"), Some(vec!["PASS".to_string()]));
}

#[test]
fn test_write_without_any_path_warns() {
    let mut b = bench(&[]);
    let state = run_script(&mut b, &["W", "M continued"], "");

    assert_eq!(state, terminated(TerminationReason::Completed));
    assert_eq!(b.info.messages(Severity::Warning).len(), 1);
}

#[test]
fn test_load_script_from_disk() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("hello.scr");
    std::fs::write(&path, "# greeting\nM from disk\n").unwrap();

    let (transport, _) = ScriptedTransport::new();
    let info = Recorder::default();
    let mut engine = Engine::builder()
        .transport(transport)
        .info_sink(info.clone())
        .file_store(FsFileStore)
        .build()
        .unwrap();

    engine.load_file(&path).unwrap();
    assert_eq!(engine.run("").unwrap(), terminated(TerminationReason::Completed));
    assert_eq!(info.messages(Severity::Info), vec!["from disk"]);
}

// ============================================================================
// Routines and Jumps
// ============================================================================

#[test]
fn test_self_jump_exhausts_budget() {
    let mut b = bench(&[]);
    let state = run_script(&mut b, &[": loop", "J : loop"], "loop");

    assert_eq!(state, terminated(TerminationReason::CallDepthExceeded));
    assert_eq!(b.engine.budget_remaining(), 0);
    assert!(b.engine.is_quit());
}

#[test]
fn test_budget_allows_exactly_that_many_jumps() {
    let config = EngineConfig {
        call_depth_budget: 3,
        ..EngineConfig::default()
    };
    let mut b = bench_with(config, Vec::new());
    let state = run_script(&mut b, &[": loop", "M tick", "J loop"], "loop");

    assert_eq!(state, terminated(TerminationReason::CallDepthExceeded));
    // The initial entry plus three jumps
    assert_eq!(b.info.messages(Severity::Info).len(), 4);
}

#[test]
fn test_budget_is_shared_by_sibling_jumps() {
    let config = EngineConfig {
        call_depth_budget: 2,
        ..EngineConfig::default()
    };
    let mut b = bench_with(config, Vec::new());
    let lines = ["J a", "J a", "J a", "M end", ": a", "M in a"];
    let state = run_script(&mut b, &lines, "");

    assert_eq!(state, terminated(TerminationReason::CallDepthExceeded));
    assert_eq!(b.info.messages(Severity::Info), vec!["in a", "in a"]);
}

#[test]
fn test_budget_resets_per_run() {
    let config = EngineConfig {
        call_depth_budget: 1,
        ..EngineConfig::default()
    };
    let mut b = bench_with(config, Vec::new());
    b.engine.load_lines(&["J a", ": a", "M in a"]).unwrap();

    assert_eq!(b.engine.run("").unwrap(), terminated(TerminationReason::Completed));
    assert_eq!(b.engine.run("").unwrap(), terminated(TerminationReason::Completed));
}

#[test]
fn test_jump_to_missing_routine() {
    let mut b = bench(&[]);
    let state = run_script(&mut b, &["J nope", "M after"], "");

    assert_eq!(
        state,
        terminated(TerminationReason::RoutineNotFound("nope".to_string()))
    );
    assert!(b.info.messages(Severity::Info).is_empty());
    assert_eq!(b.info.messages(Severity::Error).len(), 1);
    assert_eq!(b.observed_lines(), vec!["J nope"]);
}

#[test]
fn test_run_missing_routine() {
    let mut b = bench(&[]);
    let state = run_script(&mut b, &["M main"], "other");

    assert_eq!(
        state,
        terminated(TerminationReason::RoutineNotFound("other".to_string()))
    );
    assert_eq!(b.info.messages(Severity::Error).len(), 1);
}

#[test]
fn test_run_named_routine_only() {
    let mut b = bench(&[]);
    run_script(&mut b, &["M main", ": extra", "M extra"], "extra");
    assert_eq!(b.info.messages(Severity::Info), vec!["extra"]);
}

#[test]
fn test_observer_sees_every_command() {
    let mut b = bench(&[]);
    run_script(&mut b, &["M a", "?x==y", "M skipped", "J sub", ": sub", "M in sub"], "");

    // Gate-skipped commands are observed too
    assert_eq!(b.observed_lines(), vec!["M a", "?x==y", "M skipped", "J sub"]);

    // A jump is observed when its routine returns
    let mut b = bench(&[]);
    run_script(&mut b, &["J sub", "M after", ": sub", "M in sub"], "");
    assert_eq!(b.observed_lines(), vec!["M in sub", "J sub", "M after"]);
}

#[test]
fn test_skipped_commands_leave_last_row_unchanged() {
    let responses = vec![b"OK".to_vec(), vec![b'D', 1, 0x5a]];
    let mut b = bench_with(EngineConfig::default(), responses);
    let lines = ["P first", "?FAIL", "P second", "M skipped"];
    let state = run_script(&mut b, &lines, "");

    assert_eq!(state, terminated(TerminationReason::Completed));
    assert_eq!(b.log.writes(), vec![b"P first\n".to_vec()]);

    let seen = b.observed.lock().clone();
    assert_eq!(seen.len(), 4);
    for s in &seen[1..] {
        assert_eq!(s.last_row, "OK", "after {:?}", s.line);
        assert!(s.last_data.is_empty(), "after {:?}", s.line);
    }
    assert_eq!(b.engine.last_row(), "OK");
}

// ============================================================================
// User Input
// ============================================================================

#[test]
fn test_prompt_suspends_and_resumes() {
    let mut b = bench(&[]);
    let state = run_script(&mut b, &["U name?", "$who", "M hi $who"], "");

    assert_eq!(
        state,
        RunState::AwaitingInput {
            prompt: "name?".to_string()
        }
    );
    assert!(b.engine.is_suspended());
    assert!(b.info.notes.lock().iter().any(|n| n.requires_input));

    let state = b.engine.resume("bob").unwrap();
    assert_eq!(state, terminated(TerminationReason::Completed));
    assert_eq!(b.info.messages(Severity::Info), vec!["hi bob"]);
    assert_eq!(b.engine.last_row(), "bob");
}

#[test]
fn test_prompt_inside_jump() {
    let mut b = bench(&[]);
    let lines = ["J ask", "?ok", "M accepted", ": ask", "U continue?"];
    let state = run_script(&mut b, &lines, "");
    assert!(matches!(state, RunState::AwaitingInput { .. }));

    let state = b.engine.resume("ok").unwrap();
    assert_eq!(state, terminated(TerminationReason::Completed));
    assert_eq!(b.info.messages(Severity::Info), vec!["accepted"]);
}

#[test]
fn test_input_without_prompt_is_rejected() {
    let mut b = bench(&[]);
    b.engine.load_lines(&["M a"]).unwrap();
    assert!(matches!(b.engine.resume("early"), Err(ScriptError::NoPendingInput)));

    assert_eq!(b.engine.last_row(), "");

    // The early input is not consumed by a later prompt
    b.engine.load_lines(&["U go?"]).unwrap();
    assert!(matches!(b.engine.run("").unwrap(), RunState::AwaitingInput { .. }));
    assert_eq!(b.engine.last_row(), "");

    let state = b.engine.resume("late").unwrap();
    assert_eq!(state, terminated(TerminationReason::Completed));
    assert_eq!(b.engine.last_row(), "late");
    assert!(b.observed.lock().iter().all(|s| s.last_row != "early"));
}

#[test]
fn test_run_while_suspended_is_busy() {
    let mut b = bench(&[]);
    run_script(&mut b, &["U wait"], "");

    assert!(matches!(b.engine.run(""), Err(ScriptError::Busy)));
    assert!(matches!(b.engine.load_lines(&["M x"]), Err(ScriptError::Busy)));
}

#[test]
fn test_run_with_input_answers_prompts() {
    let mut b = bench(&[]);
    b.engine
        .load_lines(&["U first?", "$a", "U second?", "$b", "M $a then $b"])
        .unwrap();

    let mut answers = vec!["two", "one"];
    let reason = b
        .engine
        .run_with_input("", |_| answers.pop().map(str::to_string))
        .unwrap();

    assert_eq!(reason, TerminationReason::Completed);
    assert_eq!(b.info.messages(Severity::Info), vec!["one then two"]);
}

#[test]
fn test_run_with_input_cancelled_by_caller() {
    let mut b = bench(&[]);
    b.engine.load_lines(&["U anything?", "M never"]).unwrap();

    let reason = b.engine.run_with_input("", |_| None).unwrap();
    assert_eq!(reason, TerminationReason::Cancelled);
    assert!(!b.engine.is_suspended());
}

#[test]
fn test_cancel_handle_stops_run() {
    let mut b = bench(&[]);
    run_script(&mut b, &["U go?", "M after"], "");

    b.engine.cancel_handle().store(true, Ordering::SeqCst);
    let state = b.engine.resume("x").unwrap();
    assert_eq!(state, terminated(TerminationReason::Cancelled));
    assert!(b.info.messages(Severity::Info).is_empty());
}

// ============================================================================
// Loading
// ============================================================================

#[test]
fn test_reload_replaces_everything() {
    let mut b = bench(&["resp"]);
    run_script(&mut b, &["$a=1", "P x", ": r1", "M x"], "");
    assert_eq!(b.engine.last_row(), "resp");

    b.engine.load_lines(&[": r2", "M y"]).unwrap();
    assert!(b.engine.routines().contains("r2"));
    assert!(!b.engine.routines().contains("r1"));
    assert!(b.engine.variables().is_empty());
    assert_eq!(b.engine.last_row(), "");
}

#[test]
fn test_bad_fingerprint_executes_nothing() {
    let mut b = bench(&[]);
    let err = b.engine.load_lines(&["P 1", "O deadbeef"]).unwrap_err();
    assert!(matches!(err, ScriptError::Integrity { line: 2, .. }));
    assert!(b.engine.routines().is_empty());

    let state = b.engine.run("").unwrap();
    assert!(matches!(
        state,
        RunState::Terminated(TerminationReason::RoutineNotFound(_))
    ));
    assert!(b.log.is_empty());
}

#[test]
fn test_sealed_script_runs() {
    let mut lines = vec!["# sealed".to_string(), "P 1".to_string()];
    lines.push(fingerprint_marker(&lines));

    let mut b = bench(&[]);
    b.engine.load_lines(&lines).unwrap();
    assert_eq!(b.engine.run("").unwrap(), terminated(TerminationReason::Completed));
    assert_eq!(b.log.len(), 1);
}

#[test]
fn test_failed_reload_leaves_no_routines() {
    let mut b = bench(&[]);
    b.engine.load_lines(&["M ok"]).unwrap();
    assert!(b.engine.load_lines(&[": a", ": a"]).is_err());
    assert!(b.engine.routines().is_empty());
}
