use std::path::PathBuf;

use clap::{Parser, Subcommand};

use stevedore::Protocol;

/// Stevedore - incremental deployment over ssh or FTP
#[derive(Parser, Debug)]
#[command(name = "stevedore")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Verbosity level (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Upload changed files and run the post-deploy commands
    Deploy {
        /// Project root to deploy
        #[arg(short, long, default_value = ".")]
        project: PathBuf,

        /// Transport to use (shell or ftp); overrides the project config
        #[arg(long)]
        protocol: Option<Protocol>,

        /// Remote host
        #[arg(long)]
        host: Option<String>,

        /// Remote port (defaults: ssh 22, ftp 21)
        #[arg(long)]
        port: Option<u16>,

        /// Remote username
        #[arg(short, long)]
        username: Option<String>,

        /// Private key for the shell transport
        #[arg(short, long)]
        key: Option<PathBuf>,

        /// Password for the ftp transport
        #[arg(long, env = "STEVEDORE_PASSWORD", hide_env_values = true)]
        password: Option<String>,

        /// Remote directory uploads land under
        #[arg(short, long)]
        remote_path: Option<String>,

        /// Connect timeout in seconds
        #[arg(long, default_value_t = 30)]
        timeout: u64,

        /// Upper bound in seconds for any single remote operation
        #[arg(long, default_value_t = 600)]
        op_timeout: u64,
    },

    /// Create the project config and template ignore/command files
    Init {
        /// Project root to initialize
        #[arg(short, long, default_value = ".")]
        project: PathBuf,

        /// Transport to use (shell or ftp)
        #[arg(long, default_value_t = Protocol::Shell)]
        protocol: Protocol,

        /// Remote host
        #[arg(long)]
        host: String,

        /// Remote port
        #[arg(long)]
        port: Option<u16>,

        /// Remote username
        #[arg(short, long)]
        username: String,

        /// Private key for the shell transport
        #[arg(short, long)]
        key: Option<PathBuf>,

        /// Remote directory uploads land under
        #[arg(short, long, default_value = ".")]
        remote_path: String,
    },

    /// Show what the next deploy would transfer, without connecting
    Status {
        /// Project root to inspect
        #[arg(short, long, default_value = ".")]
        project: PathBuf,
    },

    /// Test paths against the effective ignore rules
    CheckIgnore {
        /// Project root whose rules to use
        #[arg(short, long, default_value = ".")]
        project: PathBuf,

        /// Paths to test, relative to the project root
        #[arg(required = true)]
        paths: Vec<String>,
    },
}
