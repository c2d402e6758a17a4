//! Command script interpreter
//!
//! Parses the line-oriented `.deploycommands` grammar into an ordered
//! sequence of typed operations. One statement per line; blank lines and
//! `#` comments are skipped. Anything else that is not a recognized
//! statement is recorded as a warning for that line and parsing
//! continues.
//!
//! Grammar:
//! - `RUN <shell text>`: execute `<shell text>` verbatim
//! - `WORKDIR <path>`: change directory for subsequent operations
//! - `COPY <src> <dest>`: recursive copy (`cp -r`)
//! - `MOVE <src> <dest>`: rename/move (`mv`)

use std::fmt;
use std::io;
use std::path::Path;

/// Kind of a parsed operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpKind {
    Run,
    SetWorkdir,
    Copy,
    Move,
}

/// One operation from the script, in source order.
///
/// For `Run`, `Copy` and `Move`, `command` is the resolved shell text to
/// execute. For `SetWorkdir` it is the target directory; the orchestrator
/// applies it to subsequent operations rather than executing it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandOp {
    pub kind: OpKind,
    pub command: String,
    /// Originating line number (1-based), for diagnostics
    pub line: usize,
}

impl fmt::Display for CommandOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.kind {
            OpKind::SetWorkdir => write!(f, "cd {}", self.command),
            _ => write!(f, "{}", self.command),
        }
    }
}

/// A line that was not a valid statement.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScriptWarning {
    pub line: usize,
    pub text: String,
}

impl fmt::Display for ScriptWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "line {}: unrecognized statement '{}'", self.line, self.text)
    }
}

/// Parsed script: ordered ops plus the skipped-line list.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandScript {
    pub ops: Vec<CommandOp>,
    pub warnings: Vec<ScriptWarning>,
}

impl CommandScript {
    /// Parse script text. Never fails; malformed lines become warnings.
    pub fn parse(text: &str) -> Self {
        let mut script = Self::default();

        for (idx, raw_line) in text.lines().enumerate() {
            let line = idx + 1;
            let trimmed = raw_line.trim();
            if trimmed.is_empty() || trimmed.starts_with('#') {
                continue;
            }

            if let Some(rest) = trimmed.strip_prefix("RUN ") {
                script.push_op(OpKind::Run, rest.to_string(), line);
            } else if let Some(rest) = trimmed.strip_prefix("WORKDIR ") {
                script.push_op(OpKind::SetWorkdir, rest.trim().to_string(), line);
            } else if let Some(rest) = trimmed.strip_prefix("COPY ") {
                match two_args(rest) {
                    Some((src, dest)) => {
                        script.push_op(OpKind::Copy, format!("cp -r {src} {dest}"), line);
                    }
                    None => script.warn(line, trimmed),
                }
            } else if let Some(rest) = trimmed.strip_prefix("MOVE ") {
                match two_args(rest) {
                    Some((src, dest)) => {
                        script.push_op(OpKind::Move, format!("mv {src} {dest}"), line);
                    }
                    None => script.warn(line, trimmed),
                }
            } else {
                script.warn(line, trimmed);
            }
        }

        script
    }

    /// Load and parse a script file. A missing file is an empty script.
    pub fn load(path: &Path) -> io::Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let text = std::fs::read_to_string(path)?;
        Ok(Self::parse(&text))
    }

    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }

    fn push_op(&mut self, kind: OpKind, command: String, line: usize) {
        self.ops.push(CommandOp {
            kind,
            command,
            line,
        });
    }

    fn warn(&mut self, line: usize, text: &str) {
        self.warnings.push(ScriptWarning {
            line,
            text: text.to_string(),
        });
    }
}

fn two_args(rest: &str) -> Option<(&str, &str)> {
    let mut parts = rest.split_whitespace();
    let src = parts.next()?;
    let dest = parts.next()?;
    if parts.next().is_some() {
        return None;
    }
    Some((src, dest))
}

const TEMPLATE: &str = "\
# Post-deploy commands, one per line, executed in order on the remote
# host after files have transferred. The first failing command stops
# the rest.
#
#   RUN <shell text>    run a command
#   WORKDIR <path>      change directory for the following commands
#   COPY <src> <dest>   recursive copy on the remote host
#   MOVE <src> <dest>   move/rename on the remote host

# WORKDIR ./app
# RUN npm install
# RUN npm run build
# COPY ./dist/ ./public_html/
";

/// Write the documented `.deploycommands` template if absent.
///
/// Returns true if the file was created.
pub fn write_template(path: &Path) -> io::Result<bool> {
    if path.exists() {
        return Ok(false);
    }
    std::fs::write(path, TEMPLATE)?;
    Ok(true)
}
