//! Stevedore - incremental deployment engine
//!
//! Uploads only what changed: every file in the project tree is hashed
//! and compared against the manifest from the previous run, then the
//! changed set is transferred over a shell (ssh) or FTP session and a
//! post-deploy command script runs on the remote host.

pub mod config;
pub mod console;
pub mod deploy;
pub mod error;
pub mod hash;
pub mod ignore_rules;
pub mod manifest;
pub mod project;
pub mod scanner;
pub mod script;
pub mod transport;

// Re-exports for convenience
pub use config::{Protocol, ProjectConfig};
pub use deploy::{DeployOptions, DeployReport, Deployer, NoopSink, ProgressSink};
pub use error::{EngineError, EngineResult};
pub use hash::ContentHash;
pub use ignore_rules::IgnoreRules;
pub use manifest::Manifest;
pub use scanner::{scan, ScanReport};
pub use script::{CommandOp, CommandScript, OpKind};
pub use transport::{
    Auth, Credentials, FtpTransport, SessionLimits, ShellTransport, Transport, TransportError,
};
