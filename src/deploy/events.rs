//! Deployment progress events
//!
//! The orchestrator reports progress through a sink trait so the engine
//! never prints. The CLI plugs in a console renderer; tests plug in a
//! recorder.

use std::fmt;

/// Which stage of the deployment an event belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    /// File transfer stage
    File,
    /// Post-transfer command stage
    Command,
}

/// What happened to the item an event is about.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventStatus {
    /// File landed on the remote side
    Uploaded,
    /// Command exited zero
    Succeeded,
    /// Not attempted because the run was cancelled
    Skipped,
    /// Transfer or command failed
    Failed,
    /// Informational, not tied to an outcome
    Info,
}

impl fmt::Display for EventStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Uploaded => "uploaded",
            Self::Succeeded => "ok",
            Self::Skipped => "skipped",
            Self::Failed => "failed",
            Self::Info => "info",
        };
        f.write_str(s)
    }
}

/// One progress notification.
#[derive(Debug, Clone)]
pub struct ProgressEvent {
    pub phase: Phase,
    /// File path or command text the event is about
    pub identifier: String,
    pub status: EventStatus,
    /// Human detail (error text, counts); empty when the status says it all
    pub message: String,
    /// Overall progress through the current phase, 0.0 to 1.0
    pub fraction: f32,
    /// Captured command output, command phase only
    pub output: Option<String>,
}

/// Receiver for progress events.
///
/// Called synchronously from the deploy loop; implementations should
/// return quickly.
pub trait ProgressSink {
    fn on_event(&self, event: &ProgressEvent);
}

/// Sink that discards everything.
pub struct NoopSink;

impl ProgressSink for NoopSink {
    fn on_event(&self, _event: &ProgressEvent) {}
}
