//! FTP transport
//!
//! Listing/put style session over an FTP control connection. Uploads go
//! through `STOR` after walking `MKD` over any missing parent segments.
//! There is no remote shell here: `exec` reports itself unsupported
//! instead of pretending.

use std::io::Cursor;
use std::net::ToSocketAddrs;

use chrono::{DateTime, Utc};
use suppaftp::list::File as ListEntry;
use suppaftp::types::FileType;
use suppaftp::{FtpError, FtpStream, Status};

use super::{
    join_remote, remote_parent, Auth, Credentials, ExecOutput, RemoteEntry, SessionLimits,
    Transport, TransportError,
};

const DEFAULT_PORT: u16 = 21;

/// Transport over an FTP control connection.
pub struct FtpTransport {
    stream: FtpStream,
    closed: bool,
}

impl std::fmt::Debug for FtpTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FtpTransport")
            .field("closed", &self.closed)
            .finish_non_exhaustive()
    }
}

impl FtpTransport {
    /// Connect and log in. Requires password auth.
    ///
    /// The session's read timeout is set to `limits.io_timeout`, so a
    /// stalled data connection surfaces as a `Network` error instead of
    /// blocking forever.
    pub fn connect(
        credentials: &Credentials,
        limits: &SessionLimits,
    ) -> Result<Self, TransportError> {
        let password = match &credentials.auth {
            Auth::Password(secret) => secret,
            Auth::Agent | Auth::Key { .. } => {
                return Err(TransportError::Auth(
                    "the ftp transport needs a password; \
                     key/agent login is only available on the shell transport"
                        .to_string(),
                ))
            }
        };

        let port = credentials.port.unwrap_or(DEFAULT_PORT);
        let addr = (credentials.host.as_str(), port)
            .to_socket_addrs()
            .map_err(|e| TransportError::Network(format!("cannot resolve host: {e}")))?
            .next()
            .ok_or_else(|| {
                TransportError::Network(format!("no address for {}", credentials.host))
            })?;

        let mut stream =
            FtpStream::connect_timeout(addr, limits.connect_timeout).map_err(map_ftp_error)?;
        stream
            .get_ref()
            .set_read_timeout(Some(limits.io_timeout))
            .map_err(|e| TransportError::Network(e.to_string()))?;

        stream
            .login(&credentials.username, password)
            .map_err(|e| match &e {
                FtpError::UnexpectedResponse(resp) if resp.status == Status::NotLoggedIn => {
                    TransportError::Auth(e.to_string())
                }
                _ => map_ftp_error(e),
            })?;

        // everything we move is bytes; never let ASCII mode mangle files
        stream
            .transfer_type(FileType::Binary)
            .map_err(map_ftp_error)?;

        Ok(Self {
            stream,
            closed: false,
        })
    }

    fn ensure_open(&self) -> Result<(), TransportError> {
        if self.closed {
            Err(TransportError::SessionClosed)
        } else {
            Ok(())
        }
    }

    /// Create every missing segment of a directory path.
    ///
    /// `MKD` on an existing directory answers 550; that is fine here, a
    /// real permission problem resurfaces on the upload itself.
    fn make_dirs(&mut self, remote: &str) -> Result<(), TransportError> {
        let absolute = remote.starts_with('/');
        let mut current = if absolute {
            String::from("/")
        } else {
            String::new()
        };
        for segment in remote.split('/').filter(|s| !s.is_empty() && *s != ".") {
            if !current.is_empty() && current != "/" {
                current.push('/');
            }
            current.push_str(segment);
            let _ = self.stream.mkdir(&current);
        }
        Ok(())
    }
}

impl Transport for FtpTransport {
    fn protocol(&self) -> &'static str {
        "ftp"
    }

    fn list(&mut self, remote: &str) -> Result<Vec<RemoteEntry>, TransportError> {
        self.ensure_open()?;
        let lines = self.stream.list(Some(remote)).map_err(map_ftp_error)?;
        let mut entries = Vec::with_capacity(lines.len());
        for line in &lines {
            match ListEntry::try_from(line.as_str()) {
                Ok(file) => entries.push(RemoteEntry {
                    name: file.name().to_string(),
                    is_dir: file.is_directory(),
                    size: file.size() as u64,
                    modified: Some(DateTime::<Utc>::from(file.modified())),
                }),
                Err(e) => log::warn!("skipping unparseable LIST line '{line}': {e}"),
            }
        }
        Ok(entries)
    }

    fn read_file(&mut self, remote: &str) -> Result<Vec<u8>, TransportError> {
        self.ensure_open()?;
        self.stream
            .retr_as_buffer(remote)
            .map(Cursor::into_inner)
            .map_err(map_ftp_error)
    }

    fn write_file(&mut self, content: &[u8], remote: &str) -> Result<(), TransportError> {
        self.ensure_open()?;
        if let Some(parent) = remote_parent(remote) {
            self.make_dirs(parent)?;
        }
        self.stream
            .put_file(remote, &mut Cursor::new(content))
            .map(|_| ())
            .map_err(map_ftp_error)
    }

    fn ensure_dir(&mut self, remote: &str) -> Result<(), TransportError> {
        self.ensure_open()?;
        self.make_dirs(remote)
    }

    fn remove(&mut self, remote: &str, recursive: bool) -> Result<(), TransportError> {
        self.ensure_open()?;
        if !recursive {
            return self.stream.rm(remote).map_err(map_ftp_error);
        }
        for entry in self.list(remote)? {
            let child = join_remote(remote, &entry.name);
            if entry.is_dir {
                self.remove(&child, true)?;
            } else {
                self.stream.rm(&child).map_err(map_ftp_error)?;
            }
        }
        self.stream.rmdir(remote).map_err(map_ftp_error)
    }

    fn rename(&mut self, from: &str, to: &str) -> Result<(), TransportError> {
        self.ensure_open()?;
        self.stream.rename(from, to).map_err(map_ftp_error)
    }

    fn exec(&mut self, _command: &str) -> Result<ExecOutput, TransportError> {
        self.ensure_open()?;
        Err(TransportError::Unsupported {
            transport: "ftp",
            operation: "remote command execution",
        })
    }

    fn supports_exec(&self) -> bool {
        false
    }

    fn close(&mut self) -> Result<(), TransportError> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;
        self.stream.quit().map_err(map_ftp_error)
    }
}

fn map_ftp_error(e: FtpError) -> TransportError {
    match e {
        FtpError::ConnectionError(io) => TransportError::Network(io.to_string()),
        other => TransportError::Protocol(other.to_string()),
    }
}
