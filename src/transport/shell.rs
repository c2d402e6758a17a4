//! Shell transport
//!
//! Drives the system `ssh` binary: file writes are piped through
//! `mkdir -p && cat >`, listings come from `find -printf`, and remote
//! command execution is native. BatchMode keeps ssh from ever prompting,
//! so a bad key or missing agent fails immediately instead of hanging,
//! and credentials are never retried.
//!
//! Every ssh child is supervised rather than waited on blindly: the
//! session's `io_timeout` and cancel flag bound how long any single
//! remote operation may stay in flight, and an overdue or cancelled
//! child is killed and reaped.

use std::io::{Read, Write};
use std::path::PathBuf;
use std::process::{Child, Command, Output, Stdio};
use std::thread;
use std::time::{Duration, Instant};

use chrono::DateTime;

use super::{
    remote_parent, Auth, Credentials, ExecOutput, RemoteEntry, SessionLimits, Transport,
    TransportError,
};

const POLL_INTERVAL: Duration = Duration::from_millis(25);

/// Transport over an interactive remote shell (`ssh`).
#[derive(Debug)]
pub struct ShellTransport {
    target: String,
    port: Option<u16>,
    key_path: Option<PathBuf>,
    limits: SessionLimits,
    closed: bool,
}

impl ShellTransport {
    /// Open a session by probing the remote with a no-op command.
    ///
    /// Password auth cannot be fed to a BatchMode ssh subprocess; callers
    /// must supply a key or an agent.
    pub fn connect(
        credentials: &Credentials,
        limits: SessionLimits,
    ) -> Result<Self, TransportError> {
        let key_path = match &credentials.auth {
            Auth::Agent => None,
            Auth::Key { path, .. } => Some(path.clone()),
            Auth::Password(_) => {
                return Err(TransportError::Auth(
                    "the shell transport needs an ssh key or agent; \
                     password login is only available on the ftp transport"
                        .to_string(),
                ))
            }
        };

        let transport = Self {
            target: credentials.target(),
            port: credentials.port,
            key_path,
            limits,
            closed: false,
        };

        let output = transport.run("true")?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            if stderr.contains("Permission denied") || stderr.contains("Authentication") {
                return Err(TransportError::Auth(stderr.trim().to_string()));
            }
            return Err(TransportError::Network(stderr.trim().to_string()));
        }

        Ok(transport)
    }

    /// Quote a string for the remote shell.
    fn shell_quote(s: &str) -> String {
        format!("'{}'", s.replace('\'', "'\\''"))
    }

    fn base_cmd(&self) -> Command {
        let mut cmd = Command::new("ssh");
        cmd.arg("-o")
            .arg("BatchMode=yes")
            .arg("-o")
            .arg(format!(
                "ConnectTimeout={}",
                self.limits.connect_timeout.as_secs().max(1)
            ));
        if let Some(port) = self.port {
            cmd.arg("-p").arg(port.to_string());
        }
        if let Some(key) = &self.key_path {
            cmd.arg("-i").arg(key);
        }
        cmd.arg(&self.target);
        cmd
    }

    /// Run a remote shell snippet and capture its output.
    fn run(&self, script: &str) -> Result<Output, TransportError> {
        let child = self
            .base_cmd()
            .arg(script)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| TransportError::Network(format!("failed to spawn ssh: {e}")))?;
        supervise(child, self.limits.io_timeout, &self.limits)
    }

    /// Run a snippet that must succeed; non-zero exit becomes an error.
    fn run_checked(&self, script: &str) -> Result<Output, TransportError> {
        let output = self.run(script)?;
        if output.status.success() {
            return Ok(output);
        }
        let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
        // ssh reserves 255 for its own (connection-level) failures
        if output.status.code() == Some(255) {
            Err(TransportError::Network(stderr))
        } else {
            Err(TransportError::Protocol(stderr))
        }
    }

    fn ensure_open(&self) -> Result<(), TransportError> {
        if self.closed {
            Err(TransportError::SessionClosed)
        } else {
            Ok(())
        }
    }
}

impl Transport for ShellTransport {
    fn protocol(&self) -> &'static str {
        "shell"
    }

    fn list(&mut self, remote: &str) -> Result<Vec<RemoteEntry>, TransportError> {
        self.ensure_open()?;
        let script = format!(
            "find {} -mindepth 1 -maxdepth 1 -printf '%y\\t%s\\t%T@\\t%f\\n'",
            Self::shell_quote(remote)
        );
        let output = self.run_checked(&script)?;
        let stdout = String::from_utf8_lossy(&output.stdout);
        Ok(stdout.lines().filter_map(parse_find_line).collect())
    }

    fn read_file(&mut self, remote: &str) -> Result<Vec<u8>, TransportError> {
        self.ensure_open()?;
        let script = format!("cat {}", Self::shell_quote(remote));
        let output = self.run_checked(&script)?;
        Ok(output.stdout)
    }

    fn write_file(&mut self, content: &[u8], remote: &str) -> Result<(), TransportError> {
        self.ensure_open()?;
        let script = match remote_parent(remote) {
            Some(parent) => format!(
                "mkdir -p {} && cat > {}",
                Self::shell_quote(parent),
                Self::shell_quote(remote)
            ),
            None => format!("cat > {}", Self::shell_quote(remote)),
        };

        let mut child = self
            .base_cmd()
            .arg(&script)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| TransportError::Network(format!("failed to spawn ssh: {e}")))?;

        if let Some(mut stdin) = child.stdin.take() {
            if let Err(e) = stdin.write_all(content) {
                // reap the child or it lingers as a zombie
                let _ = child.kill();
                let _ = child.wait();
                return Err(TransportError::Network(format!("pipe to ssh broke: {e}")));
            }
            // stdin drops here so the remote `cat` sees EOF
        }

        let output = supervise(child, self.limits.io_timeout, &self.limits)?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
            if output.status.code() == Some(255) {
                return Err(TransportError::Network(stderr));
            }
            return Err(TransportError::Protocol(format!(
                "failed to write {remote}: {stderr}"
            )));
        }
        Ok(())
    }

    fn ensure_dir(&mut self, remote: &str) -> Result<(), TransportError> {
        self.ensure_open()?;
        let script = format!("mkdir -p {}", Self::shell_quote(remote));
        self.run_checked(&script).map(|_| ())
    }

    fn remove(&mut self, remote: &str, recursive: bool) -> Result<(), TransportError> {
        self.ensure_open()?;
        let flags = if recursive { "-rf" } else { "-f" };
        let script = format!("rm {flags} {}", Self::shell_quote(remote));
        self.run_checked(&script).map(|_| ())
    }

    fn rename(&mut self, from: &str, to: &str) -> Result<(), TransportError> {
        self.ensure_open()?;
        let script = format!(
            "mv {} {}",
            Self::shell_quote(from),
            Self::shell_quote(to)
        );
        self.run_checked(&script).map(|_| ())
    }

    fn exec(&mut self, command: &str) -> Result<ExecOutput, TransportError> {
        self.ensure_open()?;
        let output = self.run(command)?;
        // 255 without any remote output means ssh itself failed
        if output.status.code() == Some(255) && output.stdout.is_empty() {
            return Err(TransportError::Network(
                String::from_utf8_lossy(&output.stderr).trim().to_string(),
            ));
        }
        Ok(ExecOutput {
            exit_code: output.status.code().unwrap_or(-1),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        })
    }

    fn close(&mut self) -> Result<(), TransportError> {
        // ssh is one subprocess per operation; nothing to tear down
        self.closed = true;
        Ok(())
    }
}

/// Wait for a child within the operation deadline, honoring the cancel
/// flag. An overdue or cancelled child is killed and reaped; its partial
/// output is discarded.
///
/// Stdout and stderr are drained on background threads so a chatty
/// child cannot fill a pipe and stall against an unread buffer.
fn supervise(
    mut child: Child,
    io_timeout: Duration,
    limits: &SessionLimits,
) -> Result<Output, TransportError> {
    let stdout_reader = child.stdout.take().map(drain_on_thread);
    let stderr_reader = child.stderr.take().map(drain_on_thread);

    let deadline = Instant::now() + io_timeout;
    let status = loop {
        match child.try_wait() {
            Ok(Some(status)) => break status,
            Ok(None) => {}
            Err(e) => {
                let _ = child.kill();
                let _ = child.wait();
                return Err(TransportError::Network(format!("could not poll ssh: {e}")));
            }
        }
        if limits.cancel_requested() {
            let _ = child.kill();
            let _ = child.wait();
            return Err(TransportError::Network(
                "operation abandoned: cancelled".to_string(),
            ));
        }
        if Instant::now() >= deadline {
            let _ = child.kill();
            let _ = child.wait();
            return Err(TransportError::Network(format!(
                "remote operation timed out after {}s",
                io_timeout.as_secs()
            )));
        }
        thread::sleep(POLL_INTERVAL);
    };

    Ok(Output {
        status,
        stdout: join_drained(stdout_reader),
        stderr: join_drained(stderr_reader),
    })
}

fn drain_on_thread<R: Read + Send + 'static>(mut pipe: R) -> thread::JoinHandle<Vec<u8>> {
    thread::spawn(move || {
        let mut buf = Vec::new();
        let _ = pipe.read_to_end(&mut buf);
        buf
    })
}

fn join_drained(handle: Option<thread::JoinHandle<Vec<u8>>>) -> Vec<u8> {
    handle.and_then(|h| h.join().ok()).unwrap_or_default()
}

/// Parse one `%y\t%s\t%T@\t%f` line from `find`.
fn parse_find_line(line: &str) -> Option<RemoteEntry> {
    let mut parts = line.splitn(4, '\t');
    let kind = parts.next()?;
    let size = parts.next()?.parse::<u64>().ok()?;
    let epoch = parts.next()?;
    let name = parts.next()?;

    let secs = epoch.split('.').next()?.parse::<i64>().ok()?;
    Some(RemoteEntry {
        name: name.to_string(),
        is_dir: kind == "d",
        size,
        modified: DateTime::from_timestamp(secs, 0),
    })
}
