//! Change detector
//!
//! Walks the local project tree, hashes every non-ignored file and
//! compares against the prior manifest. The walk visits directory
//! entries in sorted order so the changed set comes out in a stable,
//! deterministic order for the transfer loop.

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use crate::error::EngineResult;
use crate::hash::ContentHash;
use crate::ignore_rules::IgnoreRules;
use crate::manifest::Manifest;
use crate::project;

/// Result of one scan of the project tree.
#[derive(Debug, Default, Clone)]
pub struct ScanReport {
    /// Paths that must transfer: new, or hash differs from the manifest.
    /// Stable walk order.
    pub changed: Vec<String>,
    /// Paths excluded by ignore rules (never hashed)
    pub ignored: Vec<String>,
    /// Fresh hash for every non-ignored file seen this scan
    pub new_hashes: BTreeMap<String, String>,
    /// Per-file problems that did not abort the scan
    pub warnings: Vec<String>,
}

/// Scan the project tree and classify every path.
///
/// Symlinks and the `.stevedore/` state directory are skipped
/// unconditionally. Ignored paths are recorded and never hashed.
/// A file that disappears between enumeration and hashing, or fails to
/// read, produces a warning and is left out of the changed set.
pub fn scan(
    project_root: &Path,
    rules: &IgnoreRules,
    prior: &Manifest,
) -> EngineResult<ScanReport> {
    let mut report = ScanReport::default();
    walk(project_root, project_root, rules, prior, &mut report)?;
    Ok(report)
}

fn walk(
    root: &Path,
    dir: &Path,
    rules: &IgnoreRules,
    prior: &Manifest,
    report: &mut ScanReport,
) -> EngineResult<()> {
    let mut entries: Vec<_> = match fs::read_dir(dir) {
        Ok(iter) => iter.filter_map(Result::ok).collect(),
        Err(e) => {
            if dir == root {
                return Err(e.into());
            }
            report
                .warnings
                .push(format!("could not read directory {}: {e}", dir.display()));
            return Ok(());
        }
    };
    entries.sort_by_key(|e| e.file_name());

    for entry in entries {
        let file_type = match entry.file_type() {
            Ok(ft) => ft,
            Err(e) => {
                report.warnings.push(format!(
                    "could not stat {}: {e}",
                    entry.path().display()
                ));
                continue;
            }
        };
        if file_type.is_symlink() {
            continue;
        }

        let path = entry.path();
        let rel = match path.strip_prefix(root) {
            Ok(rel) => rel.to_path_buf(),
            Err(_) => continue,
        };
        let rel_str = normalize(&rel);

        // Tool-internal paths are never part of the project surface.
        if rel_str == project::STATE_DIR
            || rel_str == project::IGNORE_FILE
            || rel_str == project::SCRIPT_FILE
        {
            continue;
        }

        if file_type.is_dir() {
            if rules.is_ignored(&rel, true) {
                report.ignored.push(rel_str);
                continue;
            }
            walk(root, &path, rules, prior, report)?;
            continue;
        }

        if rules.is_ignored(&rel, false) {
            report.ignored.push(rel_str);
            continue;
        }

        match ContentHash::from_file(&path) {
            Ok(hash) => {
                let hash = hash.to_string();
                let changed = prior.hash_of(&rel_str) != Some(hash.as_str());
                report.new_hashes.insert(rel_str.clone(), hash);
                if changed {
                    report.changed.push(rel_str);
                }
            }
            Err(e) => {
                report
                    .warnings
                    .push(format!("could not hash {rel_str}: {e}"));
            }
        }
    }

    Ok(())
}

/// Forward-slash normalize a relative path.
fn normalize(rel: &Path) -> String {
    rel.components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/")
}
