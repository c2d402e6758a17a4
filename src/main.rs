//! Stevedore CLI - incremental deployment over ssh or FTP
//!
//! Usage: stevedore <COMMAND>
//!
//! Commands:
//!   deploy        Upload changed files and run the post-deploy commands
//!   init          Create the project config and template files
//!   status        Show what the next deploy would transfer
//!   check-ignore  Test paths against the effective ignore rules

mod cli;

use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use clap::Parser;

use stevedore::console::{print_summary, ConsoleSink};
use stevedore::deploy::{DeployOptions, Deployer};
use stevedore::ignore_rules::IgnoreRules;
use stevedore::manifest::Manifest;
use stevedore::transport::{
    Auth, Credentials, FtpTransport, SessionLimits, ShellTransport, Transport, TransportError,
};
use stevedore::{project, scanner, script, ProjectConfig, Protocol};

use cli::{Cli, Commands};

fn main() -> ExitCode {
    let cli = Cli::parse();

    let level = match cli.verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level)).init();

    let result = match cli.command {
        Commands::Deploy {
            project,
            protocol,
            host,
            port,
            username,
            key,
            password,
            remote_path,
            timeout,
            op_timeout,
        } => run_deploy(DeployArgs {
            project,
            protocol,
            host,
            port,
            username,
            key,
            password,
            remote_path,
            timeout,
            op_timeout,
            verbose: cli.verbose > 0,
        }),
        Commands::Init {
            project,
            protocol,
            host,
            port,
            username,
            key,
            remote_path,
        } => run_init(&project, protocol, host, port, username, key, remote_path).map(|()| true),
        Commands::Status { project } => run_status(&project).map(|()| true),
        Commands::CheckIgnore { project, paths } => {
            run_check_ignore(&project, &paths).map(|()| true)
        }
    };

    match result {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::FAILURE,
        Err(e) => {
            eprintln!("error: {e:#}");
            ExitCode::FAILURE
        }
    }
}

struct DeployArgs {
    project: PathBuf,
    protocol: Option<Protocol>,
    host: Option<String>,
    port: Option<u16>,
    username: Option<String>,
    key: Option<PathBuf>,
    password: Option<String>,
    remote_path: Option<String>,
    timeout: u64,
    op_timeout: u64,
    verbose: bool,
}

fn run_deploy(args: DeployArgs) -> Result<bool> {
    let stored = ProjectConfig::load(&args.project)?;

    // Flags override the stored config field by field.
    let base = stored.unwrap_or_default();
    let protocol = args.protocol.unwrap_or(base.protocol);
    let host = args
        .host
        .or_else(|| (!base.host.is_empty()).then(|| base.host.clone()));
    let username = args
        .username
        .or_else(|| (!base.username.is_empty()).then(|| base.username.clone()));
    let port = args.port.or(base.port);
    let key = args.key.or(base.key_path);
    let remote_root = args.remote_path.unwrap_or(base.remote_path);

    let Some(host) = host else {
        bail!("no host configured; run 'stevedore init' or pass --host");
    };
    let Some(username) = username else {
        bail!("no username configured; run 'stevedore init' or pass --username");
    };

    let auth = match (args.password, key) {
        (Some(password), _) => Auth::Password(password),
        (None, Some(path)) => Auth::Key {
            path,
            passphrase: None,
        },
        (None, None) => Auth::Agent,
    };
    let credentials = Credentials {
        host,
        port,
        username,
        auth,
    };

    let cancel = Arc::new(AtomicBool::new(false));
    let handler_flag = Arc::clone(&cancel);
    ctrlc::set_handler(move || {
        handler_flag.store(true, Ordering::Relaxed);
        eprintln!("\ninterrupt received, abandoning in-flight work...");
    })
    .context("could not install interrupt handler")?;

    // the same flag both abandons the in-flight transport operation and
    // marks the not-yet-attempted items Skipped
    let limits = SessionLimits::new(
        Duration::from_secs(args.timeout),
        Duration::from_secs(args.op_timeout),
    )
    .with_cancel(Arc::clone(&cancel));

    let connect = move || -> Result<Box<dyn Transport>, TransportError> {
        match protocol {
            Protocol::Shell => ShellTransport::connect(&credentials, limits)
                .map(|t| Box::new(t) as Box<dyn Transport>),
            Protocol::Ftp => FtpTransport::connect(&credentials, &limits)
                .map(|t| Box::new(t) as Box<dyn Transport>),
        }
    };

    let deployer = Deployer::new(DeployOptions {
        project_root: args.project,
        remote_root,
        cancel: Some(cancel),
    });
    let sink = ConsoleSink::new(args.verbose);
    let report = deployer.run(connect, &sink);
    print_summary(&report);

    Ok(report.success)
}

fn run_init(
    root: &Path,
    protocol: Protocol,
    host: String,
    port: Option<u16>,
    username: String,
    key: Option<PathBuf>,
    remote_path: String,
) -> Result<()> {
    let config = ProjectConfig {
        protocol,
        host,
        port,
        username,
        key_path: key,
        remote_path,
    };
    config.save(root)?;
    println!(
        "wrote {}",
        project::config_path(root).display()
    );

    if IgnoreRules::write_default_file(root)? {
        println!("wrote {}", project::ignore_path(root).display());
    }
    if script::write_template(&project::script_path(root))? {
        println!("wrote {}", project::script_path(root).display());
    }

    println!(
        "initialized for {}://{}@{}",
        config.protocol, config.username, config.host
    );
    Ok(())
}

fn run_status(root: &Path) -> Result<()> {
    let (rules, warnings) = IgnoreRules::load(root);
    let (manifest, manifest_warning) = Manifest::load(root);
    let scan = scanner::scan(root, &rules, &manifest)
        .with_context(|| format!("could not scan {}", root.display()))?;

    for warning in warnings.iter().chain(manifest_warning.iter()) {
        eprintln!("warning: {warning}");
    }
    for warning in &scan.warnings {
        eprintln!("warning: {warning}");
    }

    if manifest.is_empty() {
        println!("no previous deploy recorded");
    } else {
        println!(
            "last deploy: {} ({} files tracked)",
            manifest.synced_at.format("%Y-%m-%d %H:%M:%S UTC"),
            manifest.len()
        );
    }

    if scan.changed.is_empty() {
        println!("everything up to date");
    } else {
        println!("would transfer {} file(s):", scan.changed.len());
        for path in &scan.changed {
            println!("  {path}");
        }
    }
    if !scan.ignored.is_empty() {
        println!("{} path(s) ignored", scan.ignored.len());
    }
    Ok(())
}

fn run_check_ignore(root: &Path, paths: &[String]) -> Result<()> {
    let (rules, warnings) = IgnoreRules::load(root);
    for warning in &warnings {
        eprintln!("warning: {warning}");
    }

    for raw in paths {
        let rel = Path::new(raw.trim_end_matches('/'));
        let is_dir = raw.ends_with('/') || root.join(rel).is_dir();
        if rules.is_ignored(rel, is_dir) {
            println!("ignored: {raw}");
        } else {
            println!("kept:    {raw}");
        }
    }
    Ok(())
}
