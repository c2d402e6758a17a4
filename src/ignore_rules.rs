//! Ignore rules
//!
//! Decides which project paths are excluded from hashing and transfer.
//! Built-in patterns always come first, so `.deployignore` entries can
//! both add exclusions and re-include a built-in exclusion with `!`.
//! Gitignore semantics throughout: last matching pattern wins.

use ignore::gitignore::{Gitignore, GitignoreBuilder};
use std::path::Path;

use crate::project;

/// Patterns that apply to every project, before any user pattern.
/// Version control metadata, our own state directory, OS droppings.
pub const BUILTIN_PATTERNS: &[&str] = &[
    ".git/",
    ".svn/",
    ".hg/",
    ".stevedore/",
    ".DS_Store",
    "Thumbs.db",
];

const DEFAULT_IGNORE_FILE: &str = "\
# stevedore ignore patterns (gitignore syntax)
#
# Built-in exclusions already cover version control directories,
# .stevedore/ and OS artifact files. Patterns here are applied after
# the built-ins; prefix with '!' to re-include an excluded path.

# Dependency and build output
# node_modules/
# dist/
# target/

# Secrets and logs
# .env
# *.log
";

/// Compiled ignore rule set for one run.
///
/// Loaded once before scanning and immutable afterwards, so the ignore
/// decision for a path is the same during hashing and during transfer.
#[derive(Debug)]
pub struct IgnoreRules {
    matcher: Gitignore,
    user_pattern_count: usize,
}

impl IgnoreRules {
    /// Rules containing only the built-in patterns.
    pub fn builtin(project_root: &Path) -> Self {
        let mut builder = GitignoreBuilder::new(project_root);
        for pattern in BUILTIN_PATTERNS {
            builder
                .add_line(None, pattern)
                .expect("built-in ignore patterns are valid");
        }
        let matcher = builder
            .build()
            .expect("built-in ignore patterns always build");
        Self {
            matcher,
            user_pattern_count: 0,
        }
    }

    /// Load built-in patterns plus `.deployignore` from the project root.
    ///
    /// A missing ignore file is normal. An unreadable file or an invalid
    /// pattern is non-fatal: the offending input is skipped and a warning
    /// is returned alongside the rules that did compile.
    pub fn load(project_root: &Path) -> (Self, Vec<String>) {
        let ignore_file = project::ignore_path(project_root);
        if !ignore_file.exists() {
            return (Self::builtin(project_root), Vec::new());
        }
        match std::fs::read_to_string(&ignore_file) {
            Ok(content) => Self::from_patterns(project_root, &content),
            Err(e) => {
                let warning = format!(
                    "could not read {}: {e}; using built-in patterns only",
                    ignore_file.display()
                );
                (Self::builtin(project_root), vec![warning])
            }
        }
    }

    /// Compile built-in patterns followed by the given user pattern lines.
    pub fn from_patterns(project_root: &Path, content: &str) -> (Self, Vec<String>) {
        let mut builder = GitignoreBuilder::new(project_root);
        let mut warnings = Vec::new();
        let mut user_pattern_count = 0;

        for pattern in BUILTIN_PATTERNS {
            builder
                .add_line(None, pattern)
                .expect("built-in ignore patterns are valid");
        }

        for (line_num, line) in content.lines().enumerate() {
            let trimmed = line.trim();
            if trimmed.is_empty() || trimmed.starts_with('#') {
                continue;
            }
            match builder.add_line(None, line) {
                Ok(_) => user_pattern_count += 1,
                Err(e) => warnings.push(format!(
                    "invalid ignore pattern at line {}: '{}' - {e}",
                    line_num + 1,
                    line
                )),
            }
        }

        match builder.build() {
            Ok(matcher) => (
                Self {
                    matcher,
                    user_pattern_count,
                },
                warnings,
            ),
            Err(e) => {
                warnings.push(format!(
                    "failed to build ignore matcher: {e}; using built-in patterns only"
                ));
                (Self::builtin(project_root), warnings)
            }
        }
    }

    /// Check whether a project-relative path is excluded.
    ///
    /// `rel_path` must be forward-slash normalized and relative to the
    /// project root. `is_dir` must be true for directories.
    pub fn is_ignored(&self, rel_path: &Path, is_dir: bool) -> bool {
        self.matcher
            .matched_path_or_any_parents(rel_path, is_dir)
            .is_ignore()
    }

    /// Number of user patterns that compiled.
    pub fn user_pattern_count(&self) -> usize {
        self.user_pattern_count
    }

    /// Write the documented default `.deployignore` if absent.
    ///
    /// Returns true if the file was created.
    pub fn write_default_file(project_root: &Path) -> std::io::Result<bool> {
        let path = project::ignore_path(project_root);
        if path.exists() {
            return Ok(false);
        }
        std::fs::write(&path, DEFAULT_IGNORE_FILE)?;
        Ok(true)
    }
}
