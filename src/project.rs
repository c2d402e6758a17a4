//! Project layout constants and path helpers
//!
//! Everything stevedore persists for a project lives under `.stevedore/`
//! at the project root; the user-facing ignore and command files sit next
//! to it at the top level.

use std::io;
use std::path::{Path, PathBuf};

/// Directory holding the manifest and deploy config for a project
pub const STATE_DIR: &str = ".stevedore";

/// User-supplied ignore patterns, gitignore syntax
pub const IGNORE_FILE: &str = ".deployignore";

/// Post-deploy command script
pub const SCRIPT_FILE: &str = ".deploycommands";

/// Path to the state directory for a project
pub fn state_dir(project_root: &Path) -> PathBuf {
    project_root.join(STATE_DIR)
}

/// Path to the persisted manifest
pub fn manifest_path(project_root: &Path) -> PathBuf {
    state_dir(project_root).join("manifest.json")
}

/// Path to the per-project deploy config
pub fn config_path(project_root: &Path) -> PathBuf {
    state_dir(project_root).join("config.json")
}

/// Path to the user ignore file
pub fn ignore_path(project_root: &Path) -> PathBuf {
    project_root.join(IGNORE_FILE)
}

/// Path to the command script
pub fn script_path(project_root: &Path) -> PathBuf {
    project_root.join(SCRIPT_FILE)
}

/// Create the state directory if it does not exist
pub fn ensure_state_dir(project_root: &Path) -> io::Result<()> {
    std::fs::create_dir_all(state_dir(project_root))
}
