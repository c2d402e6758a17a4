//! Deployment report
//!
//! Per-item outcomes gathered across a run. Individual failures live
//! here as data; only environmental breakage (unreadable project root,
//! failed connect) aborts a deployment.

use crate::script::CommandOp;

/// Outcome of one file transfer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileStatus {
    Uploaded,
    /// Not attempted; the run was cancelled first
    Skipped,
    Failed,
}

#[derive(Debug, Clone)]
pub struct FileOutcome {
    pub path: String,
    pub status: FileStatus,
    pub error: Option<String>,
}

/// Outcome of one scripted command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandStatus {
    Succeeded,
    Failed,
    /// An earlier command failed; this one was never run
    NotAttempted,
    /// Not attempted; the run was cancelled first
    Skipped,
}

#[derive(Debug, Clone)]
pub struct CommandOutcome {
    pub op: CommandOp,
    pub status: CommandStatus,
    /// Captured output for commands that actually ran
    pub output: Option<String>,
}

/// Everything that happened during one deployment.
#[derive(Debug, Clone, Default)]
pub struct DeployReport {
    pub files: Vec<FileOutcome>,
    pub commands: Vec<CommandOutcome>,
    /// Paths excluded by ignore rules this run
    pub ignored: Vec<String>,
    /// Non-fatal problems (unreadable files, malformed script lines)
    pub warnings: Vec<String>,
    /// Environmental failure that aborted the run, if any
    pub fatal: Option<String>,
    pub cancelled: bool,
    pub success: bool,
}

impl DeployReport {
    pub fn uploaded_count(&self) -> usize {
        self.files
            .iter()
            .filter(|f| f.status == FileStatus::Uploaded)
            .count()
    }

    pub fn failed_file_count(&self) -> usize {
        self.files
            .iter()
            .filter(|f| f.status == FileStatus::Failed)
            .count()
    }

    pub fn failed_command_count(&self) -> usize {
        self.commands
            .iter()
            .filter(|c| c.status == CommandStatus::Failed)
            .count()
    }

    /// Paths that actually landed on the remote side.
    pub fn uploaded_paths(&self) -> Vec<String> {
        self.files
            .iter()
            .filter(|f| f.status == FileStatus::Uploaded)
            .map(|f| f.path.clone())
            .collect()
    }
}
