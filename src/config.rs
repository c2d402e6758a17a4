//! Per-project deploy configuration
//!
//! Stored as `.stevedore/config.json` by `init` and merged with CLI
//! flags at deploy time (flags win). Holds connection shape only;
//! secrets are never written here. Passwords come from the
//! `STEVEDORE_PASSWORD` environment variable or a flag at run time.

use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{EngineError, EngineResult};
use crate::project;

/// Which transport a project deploys over.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Protocol {
    /// ssh-backed remote shell, supports post-deploy commands
    #[default]
    Shell,
    /// FTP control connection, transfer only
    Ftp,
}

impl fmt::Display for Protocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Shell => f.write_str("shell"),
            Self::Ftp => f.write_str("ftp"),
        }
    }
}

impl FromStr for Protocol {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "shell" | "ssh" => Ok(Self::Shell),
            "ftp" => Ok(Self::Ftp),
            other => Err(format!("unknown protocol '{other}' (expected shell or ftp)")),
        }
    }
}

/// Connection settings persisted for a project.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ProjectConfig {
    #[serde(default)]
    pub protocol: Protocol,

    pub host: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub port: Option<u16>,

    pub username: String,

    /// Private key for the shell transport
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key_path: Option<PathBuf>,

    /// Remote directory uploads land under
    #[serde(default = "default_remote_path")]
    pub remote_path: String,
}

fn default_remote_path() -> String {
    ".".to_string()
}

impl ProjectConfig {
    /// Load the config for a project, if one has been initialized.
    pub fn load(project_root: &Path) -> EngineResult<Option<Self>> {
        let path = project::config_path(project_root);
        if !path.exists() {
            return Ok(None);
        }
        let text = fs::read_to_string(&path)?;
        let config: Self = serde_json::from_str(&text).map_err(|e| EngineError::Configuration(
            format!("invalid config at {}: {e}", path.display()),
        ))?;
        Ok(Some(config))
    }

    /// Persist to `.stevedore/config.json`, creating the state dir.
    pub fn save(&self, project_root: &Path) -> EngineResult<()> {
        project::ensure_state_dir(project_root)?;
        let path = project::config_path(project_root);
        let text = serde_json::to_string_pretty(self)?;
        fs::write(&path, text)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn protocol_parses_both_names() {
        assert_eq!("shell".parse::<Protocol>().unwrap(), Protocol::Shell);
        assert_eq!("ssh".parse::<Protocol>().unwrap(), Protocol::Shell);
        assert_eq!("FTP".parse::<Protocol>().unwrap(), Protocol::Ftp);
        assert!("gopher".parse::<Protocol>().is_err());
    }

    #[test]
    fn round_trips_through_state_dir() {
        let dir = tempdir().unwrap();
        let config = ProjectConfig {
            protocol: Protocol::Ftp,
            host: "deploy.example.com".into(),
            port: Some(2121),
            username: "site".into(),
            key_path: None,
            remote_path: "public_html".into(),
        };
        config.save(dir.path()).unwrap();

        let loaded = ProjectConfig::load(dir.path()).unwrap().unwrap();
        assert_eq!(loaded.protocol, Protocol::Ftp);
        assert_eq!(loaded.host, "deploy.example.com");
        assert_eq!(loaded.port, Some(2121));
        assert_eq!(loaded.remote_path, "public_html");
    }

    #[test]
    fn load_without_init_is_none() {
        let dir = tempdir().unwrap();
        assert!(ProjectConfig::load(dir.path()).unwrap().is_none());
    }

    #[test]
    fn config_never_contains_secrets() {
        let config = ProjectConfig {
            host: "h".into(),
            username: "u".into(),
            remote_path: ".".into(),
            ..Default::default()
        };
        let json = serde_json::to_string(&config).unwrap();
        assert!(!json.contains("password"));
        assert!(!json.contains("passphrase"));
    }

    #[test]
    fn invalid_json_is_a_configuration_error() {
        let dir = tempdir().unwrap();
        project::ensure_state_dir(dir.path()).unwrap();
        fs::write(project::config_path(dir.path()), "{ not json").unwrap();
        assert!(matches!(
            ProjectConfig::load(dir.path()),
            Err(EngineError::Configuration(_))
        ));
    }
}
