//! Pre-install snapshots and rollback restore.

use super::artifact::extract_zip;
use super::error::UpdateError;
use boxkeeper_util::fs::{copy_dir_all, remove_dir_if_exists};
use chrono::{DateTime, Utc};
use std::fs::{self, File};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use walkdir::WalkDir;
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipWriter};

const BACKUP_PREFIX: &str = "backup-";
const BACKUP_EXT: &str = ".zip";

/// Archive file name for a backup taken at `at`.
///
/// `backup-2024-05-01T10-00-00-000Z.zip`: the ISO timestamp with `:` and `.`
/// replaced, so names sort chronologically.
#[must_use]
pub fn backup_file_name(at: DateTime<Utc>) -> String {
    format!(
        "{BACKUP_PREFIX}{}{BACKUP_EXT}",
        at.format("%Y-%m-%dT%H-%M-%S-%3fZ")
    )
}

fn archive_stem(path: &Path) -> &str {
    path.file_name()
        .and_then(|n| n.to_str())
        .map_or("", |n| n.trim_end_matches(BACKUP_EXT))
}

/// Creates and restores backups of an installation root.
#[derive(Debug, Clone)]
pub struct BackupManager {
    root: PathBuf,
    backups_dir: PathBuf,
}

impl BackupManager {
    #[must_use]
    pub fn new(root: &Path, backups_dir: &Path) -> Self {
        Self {
            root: root.to_path_buf(),
            backups_dir: backups_dir.to_path_buf(),
        }
    }

    /// Archive the allow-listed `paths` (relative to the root; a trailing `/`
    /// marks a directory) into a new timestamped zip. Missing paths are skipped.
    ///
    /// # Errors
    /// `BACKUP_FAILED` on any read or write error. A partial archive is removed.
    pub fn create_backup(&self, paths: &[String]) -> Result<PathBuf, UpdateError> {
        fs::create_dir_all(&self.backups_dir).map_err(|e| {
            UpdateError::backup_failed(format!(
                "Failed to create {}: {e}",
                self.backups_dir.display()
            ))
        })?;

        let archive = self.next_archive_path(Utc::now());
        if let Err(e) = self.write_archive(&archive, paths) {
            let _ = fs::remove_file(&archive);
            return Err(UpdateError::backup_failed(format!(
                "Failed to write {}: {e}",
                archive.display()
            )));
        }
        Ok(archive)
    }

    fn next_archive_path(&self, at: DateTime<Utc>) -> PathBuf {
        let base = backup_file_name(at);
        let mut candidate = self.backups_dir.join(&base);
        let stem = base.trim_end_matches(BACKUP_EXT);
        let mut n = 1;
        while candidate.exists() {
            candidate = self.backups_dir.join(format!("{stem}-{n}{BACKUP_EXT}"));
            n += 1;
        }
        candidate
    }

    fn write_archive(&self, archive: &Path, paths: &[String]) -> io::Result<()> {
        let mut zip = ZipWriter::new(File::create(archive)?);
        let options = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);

        for rel in paths {
            let rel = rel.trim_end_matches('/');
            let source = self.root.join(rel);
            if !source.exists() {
                continue;
            }

            for entry in WalkDir::new(&source).follow_links(false) {
                let entry = entry.map_err(io::Error::other)?;
                if !entry.file_type().is_file() {
                    continue;
                }
                let name = entry
                    .path()
                    .strip_prefix(&self.root)
                    .map_err(io::Error::other)?
                    .components()
                    .map(|c| c.as_os_str().to_string_lossy())
                    .collect::<Vec<_>>()
                    .join("/");

                zip.start_file(name, options).map_err(io::Error::other)?;
                let mut file = File::open(entry.path())?;
                io::copy(&mut file, &mut zip)?;
            }
        }

        zip.finish().map_err(io::Error::other)?.flush()
    }

    /// Extract `archive` into `staging`, copy everything over the root, then
    /// remove `staging`. A full overwrite; files absent from the backup are
    /// left in place.
    ///
    /// Returns the number of files restored.
    ///
    /// # Errors
    /// `BACKUP_MISSING` if the archive does not exist, `ROLLBACK_FAILED` on
    /// extraction or copy errors.
    pub fn restore(&self, archive: &Path, staging: &Path) -> Result<u64, UpdateError> {
        if !archive.is_file() {
            return Err(UpdateError::backup_missing());
        }

        remove_dir_if_exists(staging).map_err(|e| {
            UpdateError::rollback_failed(format!("Failed to clear {}: {e}", staging.display()))
        })?;
        fs::create_dir_all(staging).map_err(|e| {
            UpdateError::rollback_failed(format!("Failed to create {}: {e}", staging.display()))
        })?;

        extract_zip(archive, staging).map_err(|e| {
            UpdateError::rollback_failed(format!(
                "Failed to extract {}: {}",
                archive.display(),
                e.message()
            ))
        })?;

        let restored = copy_dir_all(staging, &self.root).map_err(|e| {
            UpdateError::rollback_failed(format!("Failed to restore files: {e}"))
        })?;

        let _ = remove_dir_if_exists(staging);
        Ok(restored)
    }

    /// All backup archives, oldest first.
    ///
    /// # Errors
    /// Returns an error if the backups directory exists but cannot be read.
    pub fn list(&self) -> io::Result<Vec<PathBuf>> {
        let entries = match fs::read_dir(&self.backups_dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e),
        };

        let mut archives: Vec<PathBuf> = entries
            .filter_map(Result::ok)
            .map(|e| e.path())
            .filter(|p| {
                p.file_name()
                    .and_then(|n| n.to_str())
                    .is_some_and(|n| n.starts_with(BACKUP_PREFIX) && n.ends_with(BACKUP_EXT))
            })
            .collect();
        // Compare stems so `...000Z-1.zip` sorts after `...000Z.zip`
        archives.sort_by(|a, b| archive_stem(a).cmp(archive_stem(b)));
        Ok(archives)
    }

    /// The most recent backup archive, if any.
    #[must_use]
    pub fn latest(&self) -> Option<PathBuf> {
        self.list().ok()?.pop()
    }
}
