use std::io;
use std::path::{Path, PathBuf};

/// On-disk layout of an installation.
///
/// ```text
/// <root>/
///   backups/backup-<timestamp>.zip
///   temp/                staging, removed after every run
///     extracted/
///     rollback/
///   logs/update.log
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstallPaths {
    pub root: PathBuf,
    pub backups: PathBuf,
    pub staging: PathBuf,
    pub extracted: PathBuf,
    pub rollback: PathBuf,
    pub log_file: PathBuf,
    pub version_file: PathBuf,
    pub setup_script: PathBuf,
}

impl InstallPaths {
    #[must_use]
    pub fn new(root: &Path, version_file: &Path, setup_script: &Path) -> Self {
        let staging = root.join("temp");
        Self {
            root: root.to_path_buf(),
            backups: root.join("backups"),
            extracted: staging.join("extracted"),
            rollback: staging.join("rollback"),
            staging,
            log_file: root.join("logs").join("update.log"),
            version_file: root.join(version_file),
            setup_script: root.join(setup_script),
        }
    }

    /// Create the directories every install run expects to exist.
    ///
    /// # Errors
    /// Returns an error if a directory cannot be created.
    pub fn ensure_dirs(&self) -> io::Result<()> {
        std::fs::create_dir_all(&self.backups)?;
        if let Some(logs) = self.log_file.parent() {
            std::fs::create_dir_all(logs)?;
        }
        Ok(())
    }
}
