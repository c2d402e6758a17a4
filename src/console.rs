//! Console progress rendering
//!
//! A `ProgressSink` that prints one line per event, plus the end-of-run
//! summary. All human output for the CLI funnels through here; the
//! engine itself never prints.

use crate::deploy::{DeployReport, EventStatus, Phase, ProgressEvent, ProgressSink};

/// Prints deployment progress to stdout.
pub struct ConsoleSink {
    verbose: bool,
}

impl ConsoleSink {
    pub fn new(verbose: bool) -> Self {
        Self { verbose }
    }
}

impl ProgressSink for ConsoleSink {
    fn on_event(&self, event: &ProgressEvent) {
        match event.status {
            EventStatus::Info => {
                println!("{}", event.message);
                return;
            }
            EventStatus::Failed => {
                let label = match event.phase {
                    Phase::File => "upload failed",
                    Phase::Command => "command failed",
                };
                eprintln!("  ✗ {label}: {} ({})", event.identifier, event.message);
                return;
            }
            EventStatus::Skipped => {
                println!("  - skipped: {}", event.identifier);
                return;
            }
            EventStatus::Uploaded => {
                println!("  ↑ {}", event.identifier);
            }
            EventStatus::Succeeded => {
                println!("  ✓ {}", event.identifier);
            }
        }

        if self.verbose {
            if let Some(output) = event.output.as_deref() {
                for line in output.lines() {
                    println!("      {line}");
                }
            }
        }
    }
}

/// Print the end-of-run summary for a deployment.
pub fn print_summary(report: &DeployReport) {
    if let Some(fatal) = &report.fatal {
        eprintln!("deploy aborted: {fatal}");
    }

    for warning in &report.warnings {
        eprintln!("warning: {warning}");
    }

    let uploaded = report.uploaded_count();
    let failed_files = report.failed_file_count();
    let failed_commands = report.failed_command_count();

    let mut parts = vec![format!(
        "{uploaded} file{} uploaded",
        if uploaded == 1 { "" } else { "s" }
    )];
    if !report.ignored.is_empty() {
        parts.push(format!("{} ignored", report.ignored.len()));
    }
    if failed_files > 0 {
        parts.push(format!("{failed_files} failed"));
    }
    if !report.commands.is_empty() {
        let ran = report
            .commands
            .iter()
            .filter(|c| {
                matches!(
                    c.status,
                    crate::deploy::CommandStatus::Succeeded | crate::deploy::CommandStatus::Failed
                )
            })
            .count();
        parts.push(format!("{ran}/{} commands run", report.commands.len()));
    }
    if failed_commands > 0 {
        parts.push(format!("{failed_commands} command(s) failed"));
    }

    println!("{}", parts.join(", "));

    if report.cancelled {
        println!("deployment cancelled; unfinished files stay pending for the next run");
    } else if report.success {
        println!("deploy complete");
    }
}
