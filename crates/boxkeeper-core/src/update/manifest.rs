//! Artifact-embedded update manifest.

use super::error::UpdateError;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Manifest file name at the top of an update package.
pub const MANIFEST_FILE: &str = "update-manifest.json";

pub const DEFAULT_PRE_SCRIPT: &str = "pre-update.sh";
pub const DEFAULT_POST_SCRIPT: &str = "post-update.sh";

/// Paths never overwritten unless the manifest says otherwise.
pub const DEFAULT_PRESERVE: &[&str] = &["config.json", "logs/", "backups/", "temp/"];

/// Controls which files an install touches and which scripts it runs.
///
/// Keys are snake_case on the wire; camelCase aliases are accepted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct UpdateManifest {
    /// Relative paths to copy. Empty means everything not preserved.
    #[serde(alias = "filesToUpdate")]
    pub files_to_update: Vec<String>,

    /// Path prefixes that are never copied.
    #[serde(alias = "filesToPreserve")]
    pub files_to_preserve: Vec<String>,

    #[serde(alias = "requiresNpmInstall")]
    pub requires_npm_install: bool,

    #[serde(alias = "preScript")]
    pub pre_script: String,

    #[serde(alias = "postScript")]
    pub post_script: String,
}

impl Default for UpdateManifest {
    fn default() -> Self {
        Self {
            files_to_update: Vec::new(),
            files_to_preserve: DEFAULT_PRESERVE.iter().map(|p| (*p).to_string()).collect(),
            requires_npm_install: false,
            pre_script: DEFAULT_PRE_SCRIPT.to_string(),
            post_script: DEFAULT_POST_SCRIPT.to_string(),
        }
    }
}

impl UpdateManifest {
    /// Load `update-manifest.json` from an extracted package, or the default
    /// manifest if there is none.
    ///
    /// # Errors
    /// `MANIFEST_INVALID` if the file exists but is unreadable or malformed.
    pub fn load(package_root: &Path) -> Result<Self, UpdateError> {
        let path = package_root.join(MANIFEST_FILE);
        let raw = match std::fs::read_to_string(&path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Self::default()),
            Err(e) => {
                return Err(UpdateError::manifest_invalid(format!(
                    "Failed to read {MANIFEST_FILE}: {e}"
                )))
            }
        };

        serde_json::from_str(&raw)
            .map_err(|e| UpdateError::manifest_invalid(format!("Invalid {MANIFEST_FILE}: {e}")))
    }

    /// Top-level package files consumed by the installer itself.
    #[must_use]
    pub fn meta_files(&self) -> [&str; 3] {
        [MANIFEST_FILE, &self.pre_script, &self.post_script]
    }

    /// Whether `rel` (a `/`-separated path relative to the package root)
    /// falls under one of the preserved prefixes. Matching is per path
    /// component: `logs/` covers `logs/update.log` but not `logsheet.txt`.
    #[must_use]
    pub fn is_preserved(&self, rel: &str) -> bool {
        self.files_to_preserve.iter().any(|prefix| {
            let prefix = prefix.trim_start_matches("./").trim_end_matches('/');
            !prefix.is_empty()
                && (rel == prefix
                    || rel
                        .strip_prefix(prefix)
                        .is_some_and(|rest| rest.starts_with('/')))
        })
    }
}
