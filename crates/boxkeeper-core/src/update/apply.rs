//! Copying an extracted package over the installation.

use super::error::UpdateError;
use super::manifest::UpdateManifest;
use boxkeeper_util::fs::copy_path;
use std::fs;
use std::path::{Component, Path};
use walkdir::{DirEntry, WalkDir};

/// What [`apply_files`] copied and skipped.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ApplyReport {
    /// Paths copied, relative to the package root.
    pub updated: Vec<String>,
    /// Listed paths absent from the package.
    pub missing: Vec<String>,
}

/// Copy files from the extracted `package` into `target` per `manifest`.
///
/// With `files_to_update` set, only those paths are copied. Otherwise every
/// file is copied except preserved prefixes and the manifest/script files.
/// Existing files are overwritten and parent directories are created.
///
/// # Errors
/// `APPLY_FAILED` on an unsafe listed path or any copy error.
pub fn apply_files(
    package: &Path,
    target: &Path,
    manifest: &UpdateManifest,
) -> Result<ApplyReport, UpdateError> {
    if manifest.files_to_update.is_empty() {
        apply_all(package, target, manifest)
    } else {
        apply_listed(package, target, &manifest.files_to_update)
    }
}

fn apply_listed(
    package: &Path,
    target: &Path,
    files: &[String],
) -> Result<ApplyReport, UpdateError> {
    let mut report = ApplyReport::default();

    for file in files {
        let rel = Path::new(file.trim_end_matches('/'));
        if rel
            .components()
            .any(|c| !matches!(c, Component::Normal(_) | Component::CurDir))
        {
            return Err(UpdateError::apply_failed(format!(
                "Refusing to update path outside the installation: {file}"
            )));
        }

        let source = package.join(rel);
        if !source.exists() {
            report.missing.push(file.clone());
            continue;
        }

        copy_path(&source, &target.join(rel))
            .map_err(|e| UpdateError::apply_failed(format!("Failed to update {file}: {e}")))?;
        report.updated.push(file.clone());
    }

    Ok(report)
}

fn relative(entry: &DirEntry, package: &Path) -> String {
    entry
        .path()
        .strip_prefix(package)
        .unwrap_or(entry.path())
        .components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/")
}

fn apply_all(
    package: &Path,
    target: &Path,
    manifest: &UpdateManifest,
) -> Result<ApplyReport, UpdateError> {
    let meta = manifest.meta_files();
    let mut report = ApplyReport::default();

    let walker = WalkDir::new(package)
        .min_depth(1)
        .follow_links(false)
        .into_iter()
        .filter_entry(|entry| {
            let rel = relative(entry, package);
            let is_meta = entry.depth() == 1 && meta.contains(&rel.as_str());
            !is_meta && !manifest.is_preserved(&rel)
        });

    for entry in walker {
        let entry =
            entry.map_err(|e| UpdateError::apply_failed(format!("Failed to walk package: {e}")))?;
        if !entry.file_type().is_file() {
            continue;
        }

        let rel = relative(&entry, package);
        let dest = target.join(entry.path().strip_prefix(package).unwrap_or(entry.path()));
        if let Some(parent) = dest.parent() {
            fs::create_dir_all(parent).map_err(|e| {
                UpdateError::apply_failed(format!("Failed to create {}: {e}", parent.display()))
            })?;
        }
        fs::copy(entry.path(), &dest)
            .map_err(|e| UpdateError::apply_failed(format!("Failed to update {rel}: {e}")))?;
        report.updated.push(rel);
    }

    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn package() -> tempfile::TempDir {
        let dir = tempdir().unwrap();
        let p = dir.path();
        fs::create_dir_all(p.join("server/routes")).unwrap();
        fs::write(p.join("server/app.js"), "new app").unwrap();
        fs::write(p.join("server/routes/updates.js"), "new routes").unwrap();
        fs::write(p.join("config.json"), "remote config").unwrap();
        fs::create_dir_all(p.join("logs")).unwrap();
        fs::write(p.join("logs/update.log"), "remote log").unwrap();
        fs::write(p.join("post-update.sh"), "exit 0").unwrap();
        fs::write(p.join("update-manifest.json"), "{}").unwrap();
        dir
    }

    fn install() -> tempfile::TempDir {
        let dir = tempdir().unwrap();
        fs::create_dir_all(dir.path().join("server")).unwrap();
        fs::write(dir.path().join("server/app.js"), "old app").unwrap();
        fs::write(dir.path().join("config.json"), "local config").unwrap();
        dir
    }

    #[test]
    fn test_default_manifest_never_overwrites_config() {
        let pkg = package();
        let root = install();

        let report = apply_files(pkg.path(), root.path(), &UpdateManifest::default()).unwrap();

        assert_eq!(
            fs::read_to_string(root.path().join("config.json")).unwrap(),
            "local config"
        );
        assert_eq!(
            fs::read_to_string(root.path().join("server/app.js")).unwrap(),
            "new app"
        );
        assert!(root.path().join("server/routes/updates.js").exists());
        assert!(!root.path().join("logs").exists());
        assert!(!root.path().join("post-update.sh").exists());
        assert!(!root.path().join("update-manifest.json").exists());
        assert_eq!(report.updated.len(), 2);
    }

    #[test]
    fn test_listed_files_only() {
        let pkg = package();
        let root = install();
        let manifest = UpdateManifest {
            files_to_update: vec!["server/routes/".to_string(), "missing.js".to_string()],
            ..UpdateManifest::default()
        };

        let report = apply_files(pkg.path(), root.path(), &manifest).unwrap();

        assert_eq!(report.updated, vec!["server/routes/".to_string()]);
        assert_eq!(report.missing, vec!["missing.js".to_string()]);
        assert!(root.path().join("server/routes/updates.js").exists());
        assert_eq!(
            fs::read_to_string(root.path().join("server/app.js")).unwrap(),
            "old app"
        );
    }

    #[test]
    fn test_listed_traversal_rejected() {
        let pkg = package();
        let root = install();
        let manifest = UpdateManifest {
            files_to_update: vec!["../outside.txt".to_string()],
            ..UpdateManifest::default()
        };

        let err = apply_files(pkg.path(), root.path(), &manifest).unwrap_err();
        assert_eq!(err.code(), crate::update::codes::APPLY_FAILED);
    }
}
