//! Deployment orchestrator
//!
//! Drives one deployment end to end: scan the project tree, transfer
//! every changed file over a single transport session, persist the
//! manifest for what actually landed, then run the post-deploy command
//! script. Per-item failures are recorded in the report and never abort
//! the run; only environmental breakage (unreadable project root,
//! failed connect) is fatal.

mod events;
mod report;

pub use events::{EventStatus, NoopSink, Phase, ProgressEvent, ProgressSink};
pub use report::{CommandOutcome, CommandStatus, DeployReport, FileOutcome, FileStatus};

use std::fs;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::error::EngineError;
use crate::ignore_rules::IgnoreRules;
use crate::manifest::Manifest;
use crate::project;
use crate::scanner;
use crate::script::{CommandScript, OpKind};
use crate::transport::{join_remote, Transport, TransportError};

/// Everything a deployment run needs besides the session itself.
pub struct DeployOptions {
    /// Local project root
    pub project_root: PathBuf,
    /// Remote directory uploads land under
    pub remote_root: String,
    /// Cooperative cancellation flag, checked between items
    pub cancel: Option<Arc<AtomicBool>>,
}

/// One-shot deployment runner.
pub struct Deployer {
    options: DeployOptions,
}

impl Deployer {
    pub fn new(options: DeployOptions) -> Self {
        Self { options }
    }

    /// Run a full deployment.
    ///
    /// `connect` is only invoked if there is something to do; a scan
    /// that finds no changes never opens a session. The returned report
    /// always reflects everything that was attempted.
    pub fn run<C>(&self, connect: C, sink: &dyn ProgressSink) -> DeployReport
    where
        C: FnOnce() -> Result<Box<dyn Transport>, TransportError>,
    {
        let mut report = DeployReport::default();
        let root = &self.options.project_root;

        let (rules, rule_warnings) = IgnoreRules::load(root);
        report.warnings.extend(rule_warnings);

        let (manifest, manifest_warning) = Manifest::load(root);
        if let Some(warning) = manifest_warning {
            report.warnings.push(warning);
        }

        let scan = match scanner::scan(root, &rules, &manifest) {
            Ok(scan) => scan,
            Err(e) => {
                report.fatal = Some(format!("could not scan project: {e}"));
                return report;
            }
        };
        report.ignored = scan.ignored.clone();
        report.warnings.extend(scan.warnings.iter().cloned());

        if scan.changed.is_empty() {
            sink.on_event(&ProgressEvent {
                phase: Phase::File,
                identifier: String::new(),
                status: EventStatus::Info,
                message: "everything up to date, nothing to deploy".to_string(),
                fraction: 1.0,
                output: None,
            });
            report.success = true;
            return report;
        }

        let script = self.load_script(&mut report);

        let mut session = match connect() {
            Ok(session) => session,
            Err(e) => {
                report.fatal = Some(EngineError::Connection(e).to_string());
                return report;
            }
        };

        self.transfer_files(session.as_mut(), &scan.changed, &mut report, sink);

        // Only what actually landed advances the manifest; failed and
        // skipped paths stay marked as pending for the next run.
        let uploaded = report.uploaded_paths();
        let next = manifest.merged(&scan.new_hashes, &uploaded);
        if let Err(e) = next.save(root) {
            report
                .warnings
                .push(format!("could not save manifest: {e}"));
        }

        self.run_commands(session.as_mut(), &script, &mut report, sink);

        if let Err(e) = session.close() {
            log::debug!("session close failed: {e}");
        }

        report.success = report.fatal.is_none()
            && !report.cancelled
            && report.failed_file_count() == 0
            && report.failed_command_count() == 0;
        report
    }

    fn load_script(&self, report: &mut DeployReport) -> CommandScript {
        let path = project::script_path(&self.options.project_root);
        match CommandScript::load(&path) {
            Ok(script) => {
                for warning in &script.warnings {
                    report.warnings.push(format!("{}: {warning}", path.display()));
                }
                script
            }
            Err(e) => {
                report
                    .warnings
                    .push(format!("could not read {}: {e}", path.display()));
                CommandScript::default()
            }
        }
    }

    fn cancelled(&self) -> bool {
        self.options
            .cancel
            .as_ref()
            .map(|flag| flag.load(Ordering::Relaxed))
            .unwrap_or(false)
    }

    fn transfer_files(
        &self,
        session: &mut dyn Transport,
        changed: &[String],
        report: &mut DeployReport,
        sink: &dyn ProgressSink,
    ) {
        let total = changed.len();
        for (idx, path) in changed.iter().enumerate() {
            let fraction = (idx + 1) as f32 / total.max(1) as f32;

            if self.cancelled() {
                report.cancelled = true;
                report.files.push(FileOutcome {
                    path: path.clone(),
                    status: FileStatus::Skipped,
                    error: None,
                });
                sink.on_event(&ProgressEvent {
                    phase: Phase::File,
                    identifier: path.clone(),
                    status: EventStatus::Skipped,
                    message: "cancelled".to_string(),
                    fraction,
                    output: None,
                });
                continue;
            }

            let outcome = self.transfer_one(session, path);
            let (status, error) = match outcome {
                Ok(()) => (FileStatus::Uploaded, None),
                Err(e) => (FileStatus::Failed, Some(e)),
            };
            sink.on_event(&ProgressEvent {
                phase: Phase::File,
                identifier: path.clone(),
                status: match status {
                    FileStatus::Uploaded => EventStatus::Uploaded,
                    _ => EventStatus::Failed,
                },
                message: error.clone().unwrap_or_default(),
                fraction,
                output: None,
            });
            report.files.push(FileOutcome {
                path: path.clone(),
                status,
                error,
            });
        }
    }

    fn transfer_one(&self, session: &mut dyn Transport, path: &str) -> Result<(), String> {
        let local = self.options.project_root.join(path);
        let content = fs::read(&local).map_err(|e| format!("could not read {path}: {e}"))?;
        let remote = join_remote(&self.options.remote_root, path);
        session.write_file(&content, &remote).map_err(|e| {
            if e.is_transient() {
                format!("{e} (will retry on next run)")
            } else {
                e.to_string()
            }
        })
    }

    fn run_commands(
        &self,
        session: &mut dyn Transport,
        script: &CommandScript,
        report: &mut DeployReport,
        sink: &dyn ProgressSink,
    ) {
        if script.is_empty() {
            return;
        }

        let total = script.ops.len();
        let mut cwd: Option<String> = None;
        let mut halted: Option<CommandStatus> =
            report.cancelled.then_some(CommandStatus::Skipped);
        let exec_supported = session.supports_exec();

        for (idx, op) in script.ops.iter().enumerate() {
            let fraction = (idx + 1) as f32 / total as f32;

            if halted.is_none() && self.cancelled() {
                report.cancelled = true;
                halted = Some(CommandStatus::Skipped);
            }

            if let Some(status) = halted {
                if status == CommandStatus::Skipped {
                    sink.on_event(&ProgressEvent {
                        phase: Phase::Command,
                        identifier: op.to_string(),
                        status: EventStatus::Skipped,
                        message: "cancelled".to_string(),
                        fraction,
                        output: None,
                    });
                }
                report.commands.push(CommandOutcome {
                    op: op.clone(),
                    status,
                    output: None,
                });
                continue;
            }

            if !exec_supported {
                let message = TransportError::Unsupported {
                    transport: session.protocol(),
                    operation: "remote command execution",
                }
                .to_string();
                sink.on_event(&ProgressEvent {
                    phase: Phase::Command,
                    identifier: op.to_string(),
                    status: EventStatus::Failed,
                    message: message.clone(),
                    fraction,
                    output: None,
                });
                report.commands.push(CommandOutcome {
                    op: op.clone(),
                    status: CommandStatus::Failed,
                    output: Some(message),
                });
                halted = Some(CommandStatus::NotAttempted);
                continue;
            }

            if op.kind == OpKind::SetWorkdir {
                cwd = Some(resolve_workdir(cwd.as_deref(), &op.command));
                sink.on_event(&ProgressEvent {
                    phase: Phase::Command,
                    identifier: op.to_string(),
                    status: EventStatus::Succeeded,
                    message: String::new(),
                    fraction,
                    output: None,
                });
                report.commands.push(CommandOutcome {
                    op: op.clone(),
                    status: CommandStatus::Succeeded,
                    output: None,
                });
                continue;
            }

            let command = match &cwd {
                Some(dir) => format!("cd {} && {}", quote(dir), op.command),
                None => op.command.clone(),
            };

            let (status, output) = match session.exec(&command) {
                Ok(out) if out.success() => {
                    let text = out.stdout.trim().to_string();
                    (
                        CommandStatus::Succeeded,
                        (!text.is_empty()).then_some(text),
                    )
                }
                Ok(out) => (
                    CommandStatus::Failed,
                    Some(format!(
                        "exit code {}: {}",
                        out.exit_code,
                        out.diagnostic().trim()
                    )),
                ),
                Err(e) => (CommandStatus::Failed, Some(e.to_string())),
            };

            sink.on_event(&ProgressEvent {
                phase: Phase::Command,
                identifier: op.to_string(),
                status: match status {
                    CommandStatus::Succeeded => EventStatus::Succeeded,
                    _ => EventStatus::Failed,
                },
                message: if status == CommandStatus::Failed {
                    output.clone().unwrap_or_default()
                } else {
                    String::new()
                },
                fraction,
                output: output.clone(),
            });
            report.commands.push(CommandOutcome {
                op: op.clone(),
                status,
                output,
            });

            if status == CommandStatus::Failed {
                halted = Some(CommandStatus::NotAttempted);
            }
        }
    }
}

/// Apply a `WORKDIR` target to the tracked directory.
fn resolve_workdir(current: Option<&str>, target: &str) -> String {
    if target.starts_with('/') {
        return target.to_string();
    }
    let target = target.strip_prefix("./").unwrap_or(target);
    match current {
        Some(dir) => format!("{}/{}", dir.trim_end_matches('/'), target),
        None => target.to_string(),
    }
}

fn quote(s: &str) -> String {
    format!("'{}'", s.replace('\'', "'\\''"))
}
