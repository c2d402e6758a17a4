//! Persisted deployment manifest
//!
//! Maps project-relative paths (forward-slash normalized) to the content
//! hash last confirmed transferred. Stored as pretty JSON at
//! `.stevedore/manifest.json` and written with the `.tmp` + rename
//! pattern so a crash mid-write never leaves a truncated manifest.
//!
//! The merge rule is the integrity guarantee of the whole tool: a path's
//! hash is replaced if and only if that path was uploaded in this run.

use std::collections::BTreeMap;
use std::path::Path;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{EngineError, EngineResult};
use crate::project;

/// On-disk and in-memory manifest.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Manifest {
    /// When the manifest was last persisted after a deploy
    pub synced_at: DateTime<Utc>,
    /// Relative path -> `sha256:<hex>` content hash
    pub files: BTreeMap<String, String>,
}

/// Older versions of the tracker stored a bare path->hash map.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum ManifestCompat {
    Structured(StructuredCompat),
    Legacy(BTreeMap<String, String>),
}

#[derive(Debug, Deserialize)]
struct StructuredCompat {
    synced_at: Option<DateTime<Utc>>,
    files: BTreeMap<String, String>,
}

impl Default for Manifest {
    fn default() -> Self {
        Self::new()
    }
}

impl Manifest {
    /// Empty manifest stamped now.
    pub fn new() -> Self {
        Self {
            synced_at: Utc::now(),
            files: BTreeMap::new(),
        }
    }

    /// Load the manifest for a project.
    ///
    /// A missing file yields an empty manifest; a corrupt one is treated
    /// the same way (everything re-uploads, which is safe) and reported
    /// through the returned warning.
    pub fn load(project_root: &Path) -> (Self, Option<String>) {
        let path = project::manifest_path(project_root);
        if !path.exists() {
            return (Self::new(), None);
        }
        let content = match std::fs::read_to_string(&path) {
            Ok(c) => c,
            Err(e) => {
                return (
                    Self::new(),
                    Some(format!(
                        "could not read {}: {e}; treating every file as changed",
                        path.display()
                    )),
                )
            }
        };
        match serde_json::from_str::<ManifestCompat>(&content) {
            Ok(ManifestCompat::Structured(m)) => (
                Self {
                    synced_at: m.synced_at.unwrap_or_else(Utc::now),
                    files: m.files,
                },
                None,
            ),
            Ok(ManifestCompat::Legacy(files)) => (
                Self {
                    synced_at: Utc::now(),
                    files,
                },
                None,
            ),
            Err(e) => (
                Self::new(),
                Some(format!(
                    "manifest {} is corrupt ({e}); treating every file as changed",
                    path.display()
                )),
            ),
        }
    }

    /// Persist the manifest atomically under the project's state dir.
    pub fn save(&self, project_root: &Path) -> EngineResult<()> {
        let path = project::manifest_path(project_root);
        project::ensure_state_dir(project_root)?;

        let json = serde_json::to_string_pretty(self)?;
        let tmp = path.with_extension("json.tmp");
        std::fs::write(&tmp, &json).map_err(|e| EngineError::Manifest {
            path: tmp.clone(),
            message: e.to_string(),
        })?;
        std::fs::rename(&tmp, &path).map_err(|e| EngineError::Manifest {
            path,
            message: e.to_string(),
        })?;
        Ok(())
    }

    /// Hash recorded for a path, if any.
    pub fn hash_of(&self, rel_path: &str) -> Option<&str> {
        self.files.get(rel_path).map(String::as_str)
    }

    /// Build the post-run manifest: prior entries plus the fresh hash of
    /// every path that actually uploaded. Failed and skipped paths keep
    /// their prior entry (or stay absent).
    pub fn merged(&self, new_hashes: &BTreeMap<String, String>, uploaded: &[String]) -> Manifest {
        let mut files = self.files.clone();
        for path in uploaded {
            if let Some(hash) = new_hashes.get(path) {
                files.insert(path.clone(), hash.clone());
            }
        }
        Manifest {
            synced_at: Utc::now(),
            files,
        }
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }
}
