//! Transport sessions
//!
//! One capability contract, two implementations: `ShellTransport`
//! (remote shell + piped file copies over ssh) and `FtpTransport`
//! (listing/put style over an FTP control connection). The orchestrator
//! drives either through the `Transport` trait and owns the single live
//! session for the whole run.

mod ftp;
mod shell;

pub use ftp::FtpTransport;
pub use shell::ShellTransport;

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use thiserror::Error;

/// Error from a transport operation.
///
/// `Network` is transient: safe to surface and move on to the next item
/// unless it happened during connect. `Auth` and `Protocol` are not.
#[derive(Debug, Error)]
pub enum TransportError {
    /// Authentication rejected; credentials are never retried
    #[error("authentication failed: {0}")]
    Auth(String),

    /// Network-level failure (connect, timeout, dropped connection)
    #[error("network error: {0}")]
    Network(String),

    /// The remote side refused or failed the operation
    #[error("protocol error: {0}")]
    Protocol(String),

    /// Capability not offered by this transport
    #[error("the {transport} transport does not support {operation}")]
    Unsupported {
        transport: &'static str,
        operation: &'static str,
    },

    /// Operation attempted after `close()`; a session is never reused
    #[error("session is closed")]
    SessionClosed,
}

impl TransportError {
    /// Whether retrying the same operation later could succeed.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Network(_))
    }
}

/// Caller-supplied bounds on a session's blocking behavior.
///
/// No transport operation may block past these: `connect_timeout` caps
/// session establishment, `io_timeout` caps each individual remote
/// operation, and a raised `cancel` flag abandons the in-flight
/// operation as soon as the transport can observe it.
#[derive(Debug, Clone)]
pub struct SessionLimits {
    pub connect_timeout: Duration,
    pub io_timeout: Duration,
    pub cancel: Option<Arc<AtomicBool>>,
}

impl SessionLimits {
    pub fn new(connect_timeout: Duration, io_timeout: Duration) -> Self {
        Self {
            connect_timeout,
            io_timeout,
            cancel: None,
        }
    }

    pub fn with_cancel(mut self, flag: Arc<AtomicBool>) -> Self {
        self.cancel = Some(flag);
        self
    }

    pub(crate) fn cancel_requested(&self) -> bool {
        self.cancel
            .as_ref()
            .map(|flag| flag.load(Ordering::Relaxed))
            .unwrap_or(false)
    }
}

/// One entry from a remote directory listing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteEntry {
    pub name: String,
    pub is_dir: bool,
    pub size: u64,
    pub modified: Option<DateTime<Utc>>,
}

/// Captured result of a remote command.
#[derive(Debug, Clone, Default)]
pub struct ExecOutput {
    pub exit_code: i32,
    pub stdout: String,
    pub stderr: String,
}

impl ExecOutput {
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }

    /// Best diagnostic text for a failed command.
    pub fn diagnostic(&self) -> &str {
        if self.stderr.trim().is_empty() {
            &self.stdout
        } else {
            &self.stderr
        }
    }
}

/// How to authenticate a session.
///
/// Opaque to the engine: assembled by the CLI or config loader, never
/// sourced here.
#[derive(Debug, Clone)]
pub enum Auth {
    /// Rely on a running key agent (shell transport)
    Agent,
    /// Private key file, optionally passphrase-protected
    Key {
        path: PathBuf,
        passphrase: Option<String>,
    },
    /// Plain password (ftp transport)
    Password(String),
}

/// Where and who to connect as.
#[derive(Debug, Clone)]
pub struct Credentials {
    pub host: String,
    pub port: Option<u16>,
    pub username: String,
    pub auth: Auth,
}

impl Credentials {
    /// `user@host` form used by the shell transport.
    pub fn target(&self) -> String {
        format!("{}@{}", self.username, self.host)
    }
}

/// Minimal capability contract over one remote endpoint.
///
/// Implementations connect in their constructor; every method here is
/// only valid on a connected session and fails fast with
/// [`TransportError::SessionClosed`] after `close()`.
pub trait Transport {
    /// Short protocol name for logging ("shell", "ftp")
    fn protocol(&self) -> &'static str;

    /// List the immediate children of a remote directory.
    fn list(&mut self, remote: &str) -> Result<Vec<RemoteEntry>, TransportError>;

    /// Read a remote file whole.
    fn read_file(&mut self, remote: &str) -> Result<Vec<u8>, TransportError>;

    /// Write a remote file whole, creating missing parent directories.
    fn write_file(&mut self, content: &[u8], remote: &str) -> Result<(), TransportError>;

    /// Create a remote directory (and parents) if absent.
    fn ensure_dir(&mut self, remote: &str) -> Result<(), TransportError>;

    /// Remove a remote file, or a directory tree when `recursive`.
    fn remove(&mut self, remote: &str, recursive: bool) -> Result<(), TransportError>;

    /// Rename/move a remote path.
    fn rename(&mut self, from: &str, to: &str) -> Result<(), TransportError>;

    /// Execute a remote command and capture its output.
    ///
    /// Transports without this capability return
    /// [`TransportError::Unsupported`] rather than no-opping.
    fn exec(&mut self, command: &str) -> Result<ExecOutput, TransportError>;

    /// Whether `exec` is offered at all.
    fn supports_exec(&self) -> bool {
        true
    }

    /// Close the session. Terminal: the session must not be reused.
    fn close(&mut self) -> Result<(), TransportError>;
}

/// Join a remote base directory and a forward-slash relative path.
pub(crate) fn join_remote(base: &str, rel: &str) -> String {
    if base.is_empty() || base == "." {
        rel.to_string()
    } else {
        format!("{}/{}", base.trim_end_matches('/'), rel)
    }
}

/// Parent directory of a remote path, if it has one.
pub(crate) fn remote_parent(remote: &str) -> Option<&str> {
    match remote.trim_end_matches('/').rsplit_once('/') {
        Some(("", _)) => Some("/"),
        Some((parent, _)) => Some(parent),
        None => None,
    }
}
