//! End-to-end deployment tests against an in-memory transport.

use std::collections::{BTreeMap, HashSet};
use std::fs;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use tempfile::tempdir;

use stevedore::deploy::{
    CommandStatus, DeployOptions, Deployer, EventStatus, FileStatus, NoopSink, Phase,
    ProgressEvent, ProgressSink,
};
use stevedore::manifest::Manifest;
use stevedore::transport::{ExecOutput, RemoteEntry, Transport, TransportError};
use stevedore::{project, scanner, IgnoreRules};

#[derive(Default)]
struct MockState {
    files: BTreeMap<String, Vec<u8>>,
    execs: Vec<String>,
    fail_writes: HashSet<String>,
    fail_exec_containing: Option<String>,
    closed: bool,
}

struct MockTransport {
    state: Arc<Mutex<MockState>>,
    exec_supported: bool,
}

impl MockTransport {
    fn new(state: Arc<Mutex<MockState>>) -> Self {
        Self {
            state,
            exec_supported: true,
        }
    }

    fn without_exec(state: Arc<Mutex<MockState>>) -> Self {
        Self {
            state,
            exec_supported: false,
        }
    }
}

impl Transport for MockTransport {
    fn protocol(&self) -> &'static str {
        "mock"
    }

    fn list(&mut self, _remote: &str) -> Result<Vec<RemoteEntry>, TransportError> {
        Ok(Vec::new())
    }

    fn read_file(&mut self, remote: &str) -> Result<Vec<u8>, TransportError> {
        self.state
            .lock()
            .unwrap()
            .files
            .get(remote)
            .cloned()
            .ok_or_else(|| TransportError::Protocol(format!("no such file: {remote}")))
    }

    fn write_file(&mut self, content: &[u8], remote: &str) -> Result<(), TransportError> {
        let mut state = self.state.lock().unwrap();
        if state.fail_writes.contains(remote) {
            return Err(TransportError::Network(format!("lost connection writing {remote}")));
        }
        state.files.insert(remote.to_string(), content.to_vec());
        Ok(())
    }

    fn ensure_dir(&mut self, _remote: &str) -> Result<(), TransportError> {
        Ok(())
    }

    fn remove(&mut self, remote: &str, _recursive: bool) -> Result<(), TransportError> {
        self.state.lock().unwrap().files.remove(remote);
        Ok(())
    }

    fn rename(&mut self, from: &str, to: &str) -> Result<(), TransportError> {
        let mut state = self.state.lock().unwrap();
        if let Some(content) = state.files.remove(from) {
            state.files.insert(to.to_string(), content);
        }
        Ok(())
    }

    fn exec(&mut self, command: &str) -> Result<ExecOutput, TransportError> {
        let mut state = self.state.lock().unwrap();
        state.execs.push(command.to_string());
        let fails = state
            .fail_exec_containing
            .as_deref()
            .is_some_and(|marker| command.contains(marker));
        if fails {
            Ok(ExecOutput {
                exit_code: 1,
                stdout: String::new(),
                stderr: "boom".to_string(),
            })
        } else {
            Ok(ExecOutput {
                exit_code: 0,
                stdout: format!("ran: {command}"),
                stderr: String::new(),
            })
        }
    }

    fn supports_exec(&self) -> bool {
        self.exec_supported
    }

    fn close(&mut self) -> Result<(), TransportError> {
        self.state.lock().unwrap().closed = true;
        Ok(())
    }
}

#[derive(Default)]
struct RecordingSink {
    events: Mutex<Vec<ProgressEvent>>,
}

impl ProgressSink for RecordingSink {
    fn on_event(&self, event: &ProgressEvent) {
        self.events.lock().unwrap().push(event.clone());
    }
}

/// Sink that trips the cancel flag after the first file event.
struct CancelAfterFirst {
    flag: Arc<AtomicBool>,
}

impl ProgressSink for CancelAfterFirst {
    fn on_event(&self, event: &ProgressEvent) {
        if event.phase == Phase::File {
            self.flag.store(true, Ordering::Relaxed);
        }
    }
}

fn write(root: &Path, rel: &str, content: &str) {
    let path = root.join(rel);
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).unwrap();
    }
    fs::write(path, content).unwrap();
}

fn deployer(root: &Path) -> Deployer {
    Deployer::new(DeployOptions {
        project_root: root.to_path_buf(),
        remote_root: "site".to_string(),
        cancel: None,
    })
}

fn connect_to(
    state: &Arc<Mutex<MockState>>,
) -> impl FnOnce() -> Result<Box<dyn Transport>, TransportError> {
    let state = Arc::clone(state);
    move || Ok(Box::new(MockTransport::new(state)) as Box<dyn Transport>)
}

#[test]
fn full_deploy_uploads_runs_commands_and_saves_manifest() {
    let dir = tempdir().unwrap();
    write(dir.path(), "a.txt", "alpha");
    write(dir.path(), "b.txt", "beta");
    write(dir.path(), "c.tmp", "scratch");
    write(dir.path(), ".deployignore", "*.tmp\n");
    write(
        dir.path(),
        ".deploycommands",
        "WORKDIR ./app\nRUN npm install\n",
    );

    let state = Arc::new(Mutex::new(MockState::default()));
    let report = deployer(dir.path()).run(connect_to(&state), &NoopSink);

    assert!(report.success, "report: {report:?}");
    assert_eq!(report.uploaded_count(), 2);
    assert_eq!(report.ignored, vec!["c.tmp"]);

    let state = state.lock().unwrap();
    assert_eq!(
        state.files.keys().collect::<Vec<_>>(),
        vec!["site/a.txt", "site/b.txt"]
    );
    assert_eq!(state.files["site/a.txt"], b"alpha");
    // WORKDIR never executes on its own; it prefixes what follows
    assert_eq!(state.execs, vec!["cd 'app' && npm install"]);
    assert!(state.closed);

    let (manifest, warning) = Manifest::load(dir.path());
    assert!(warning.is_none());
    assert_eq!(manifest.len(), 2);
    assert!(manifest.hash_of("a.txt").is_some());
    assert!(manifest.hash_of("c.tmp").is_none());
}

#[test]
fn second_run_with_no_changes_never_connects() {
    let dir = tempdir().unwrap();
    write(dir.path(), "a.txt", "alpha");

    let state = Arc::new(Mutex::new(MockState::default()));
    let first = deployer(dir.path()).run(connect_to(&state), &NoopSink);
    assert!(first.success);

    let connected = Arc::new(AtomicBool::new(false));
    let probe = Arc::clone(&connected);
    let sink = RecordingSink::default();
    let second = deployer(dir.path()).run(
        move || -> Result<Box<dyn Transport>, TransportError> {
            probe.store(true, Ordering::Relaxed);
            Err(TransportError::Network("should not be called".into()))
        },
        &sink,
    );

    assert!(second.success);
    assert!(!connected.load(Ordering::Relaxed));
    assert!(second.files.is_empty());

    let events = sink.events.lock().unwrap();
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].status, EventStatus::Info);
}

#[test]
fn failed_upload_is_isolated_and_stays_pending() {
    let dir = tempdir().unwrap();
    write(dir.path(), "a.txt", "alpha");
    write(dir.path(), "b.txt", "beta");

    let state = Arc::new(Mutex::new(MockState::default()));
    state
        .lock()
        .unwrap()
        .fail_writes
        .insert("site/b.txt".to_string());

    let report = deployer(dir.path()).run(connect_to(&state), &NoopSink);

    assert!(!report.success);
    assert!(report.fatal.is_none());
    assert_eq!(report.uploaded_count(), 1);
    assert_eq!(report.failed_file_count(), 1);
    let failed = report
        .files
        .iter()
        .find(|f| f.status == FileStatus::Failed)
        .unwrap();
    assert_eq!(failed.path, "b.txt");
    assert!(failed.error.as_deref().unwrap().contains("lost connection"));
    // a network failure is transient; the detail says so
    assert!(failed.error.as_deref().unwrap().contains("will retry"));

    // the manifest only advanced for what landed: b.txt is selected again
    let (rules, _) = IgnoreRules::load(dir.path());
    let (manifest, _) = Manifest::load(dir.path());
    let rescan = scanner::scan(dir.path(), &rules, &manifest).unwrap();
    assert_eq!(rescan.changed, vec!["b.txt"]);
}

#[test]
fn connect_failure_is_fatal_and_writes_no_manifest() {
    let dir = tempdir().unwrap();
    write(dir.path(), "a.txt", "alpha");

    let report = deployer(dir.path()).run(
        || Err(TransportError::Auth("denied".into())),
        &NoopSink,
    );

    assert!(!report.success);
    let fatal = report.fatal.as_deref().unwrap();
    assert!(fatal.contains("connection failed"));
    assert!(fatal.contains("denied"));
    assert!(!project::manifest_path(dir.path()).exists());
}

#[test]
fn first_failing_command_halts_the_rest() {
    let dir = tempdir().unwrap();
    write(dir.path(), "a.txt", "alpha");
    write(
        dir.path(),
        ".deploycommands",
        "RUN step-one\nRUN step-two\nRUN step-three\n",
    );

    let state = Arc::new(Mutex::new(MockState::default()));
    state.lock().unwrap().fail_exec_containing = Some("step-two".to_string());

    let report = deployer(dir.path()).run(connect_to(&state), &NoopSink);

    assert!(!report.success);
    let statuses: Vec<_> = report.commands.iter().map(|c| c.status).collect();
    assert_eq!(
        statuses,
        vec![
            CommandStatus::Succeeded,
            CommandStatus::Failed,
            CommandStatus::NotAttempted,
        ]
    );
    let failed = &report.commands[1];
    assert!(failed.output.as_deref().unwrap().contains("boom"));

    // step-three never reached the remote side
    let state = state.lock().unwrap();
    assert_eq!(state.execs, vec!["step-one", "step-two"]);
}

#[test]
fn exec_incapable_transport_fails_the_command_phase() {
    let dir = tempdir().unwrap();
    write(dir.path(), "a.txt", "alpha");
    write(dir.path(), ".deploycommands", "RUN one\nRUN two\n");

    let state = Arc::new(Mutex::new(MockState::default()));
    let conn = Arc::clone(&state);
    let report = deployer(dir.path()).run(
        move || Ok(Box::new(MockTransport::without_exec(conn)) as Box<dyn Transport>),
        &NoopSink,
    );

    assert!(!report.success);
    assert_eq!(report.uploaded_count(), 1, "files still transfer");
    assert_eq!(report.commands[0].status, CommandStatus::Failed);
    assert!(report.commands[0]
        .output
        .as_deref()
        .unwrap()
        .contains("does not support"));
    assert_eq!(report.commands[1].status, CommandStatus::NotAttempted);
    assert!(state.lock().unwrap().execs.is_empty());
}

#[test]
fn all_file_events_come_before_command_events() {
    let dir = tempdir().unwrap();
    write(dir.path(), "a.txt", "alpha");
    write(dir.path(), "b.txt", "beta");
    write(dir.path(), ".deploycommands", "RUN ls\n");

    let state = Arc::new(Mutex::new(MockState::default()));
    let sink = RecordingSink::default();
    let report = deployer(dir.path()).run(connect_to(&state), &sink);
    assert!(report.success);

    let events = sink.events.lock().unwrap();
    let first_command = events
        .iter()
        .position(|e| e.phase == Phase::Command)
        .unwrap();
    assert!(events[..first_command]
        .iter()
        .all(|e| e.phase == Phase::File));
    assert!(events[first_command..]
        .iter()
        .all(|e| e.phase == Phase::Command));
}

#[test]
fn cancellation_skips_remaining_files_and_all_commands() {
    let dir = tempdir().unwrap();
    write(dir.path(), "a.txt", "alpha");
    write(dir.path(), "b.txt", "beta");
    write(dir.path(), ".deploycommands", "RUN ls\n");

    let flag = Arc::new(AtomicBool::new(false));
    let sink = CancelAfterFirst {
        flag: Arc::clone(&flag),
    };
    let state = Arc::new(Mutex::new(MockState::default()));
    let runner = Deployer::new(DeployOptions {
        project_root: dir.path().to_path_buf(),
        remote_root: "site".to_string(),
        cancel: Some(flag),
    });
    let report = runner.run(connect_to(&state), &sink);

    assert!(report.cancelled);
    assert!(!report.success);
    assert_eq!(report.uploaded_count(), 1);
    assert_eq!(report.files[1].status, FileStatus::Skipped);
    assert!(report
        .commands
        .iter()
        .all(|c| c.status == CommandStatus::Skipped));
    assert!(state.lock().unwrap().execs.is_empty());

    // skipped work stays pending
    let (rules, _) = IgnoreRules::load(dir.path());
    let (manifest, _) = Manifest::load(dir.path());
    let rescan = scanner::scan(dir.path(), &rules, &manifest).unwrap();
    assert_eq!(rescan.changed, vec!["b.txt"]);
}

#[test]
fn negated_pattern_reincludes_a_file() {
    let dir = tempdir().unwrap();
    write(dir.path(), "debug.log", "noise");
    write(dir.path(), "keep.log", "wanted");
    write(dir.path(), ".deployignore", "*.log\n!keep.log\n");

    let state = Arc::new(Mutex::new(MockState::default()));
    let report = deployer(dir.path()).run(connect_to(&state), &NoopSink);

    assert!(report.success);
    let uploaded = report.uploaded_paths();
    assert!(uploaded.contains(&"keep.log".to_string()));
    assert!(!uploaded.contains(&"debug.log".to_string()));
    assert!(report.ignored.contains(&"debug.log".to_string()));
}

#[test]
fn malformed_script_lines_warn_but_do_not_block() {
    let dir = tempdir().unwrap();
    write(dir.path(), "a.txt", "alpha");
    write(dir.path(), ".deploycommands", "FROM ubuntu\nRUN ls\n");

    let state = Arc::new(Mutex::new(MockState::default()));
    let report = deployer(dir.path()).run(connect_to(&state), &NoopSink);

    assert!(report.success);
    assert!(report
        .warnings
        .iter()
        .any(|w| w.contains("FROM ubuntu")));
    assert_eq!(state.lock().unwrap().execs, vec!["ls"]);
}

#[test]
fn no_changes_skips_commands_too() {
    let dir = tempdir().unwrap();
    write(dir.path(), "a.txt", "alpha");
    write(dir.path(), ".deploycommands", "RUN restart\n");

    let state = Arc::new(Mutex::new(MockState::default()));
    let first = deployer(dir.path()).run(connect_to(&state), &NoopSink);
    assert!(first.success);
    assert_eq!(state.lock().unwrap().execs, vec!["restart"]);

    // nothing changed: no session at all, so the script does not re-run
    let report = deployer(dir.path()).run(
        || Err(TransportError::Network("should not be called".into())),
        &NoopSink,
    );

    assert!(report.success);
    assert!(report.files.is_empty());
    assert!(report.commands.is_empty());
    assert_eq!(state.lock().unwrap().execs, vec!["restart"]);
}
