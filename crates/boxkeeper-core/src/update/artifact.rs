//! Release asset selection, download and extraction.

use super::error::UpdateError;
use super::registry::{AssetInfo, ReleaseInfo};
use super::DOWNLOAD_TIMEOUT;
use flate2::read::GzDecoder;
use reqwest::Client;
use std::fs::{self, File};
use std::io;
use std::path::{Component, Path, PathBuf};
use tar::Archive;
use tokio::io::AsyncWriteExt;
use zip::ZipArchive;

/// Asset name keywords that mark an update package.
pub const ASSET_KEYWORDS: &[&str] = &["files", "update"];

/// Archive formats the extractor understands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArchiveFormat {
    Zip,
    TarGz,
}

impl ArchiveFormat {
    /// Detect the format from a file name's extension.
    #[must_use]
    pub fn from_name(name: &str) -> Option<Self> {
        let lower = name.to_ascii_lowercase();
        if lower.ends_with(".zip") {
            Some(Self::Zip)
        } else if lower.ends_with(".tar.gz") || lower.ends_with(".tgz") {
            Some(Self::TarGz)
        } else {
            None
        }
    }
}

/// Pick the update package among a release's assets.
///
/// Archives the extractor understands come first, keyword matches first
/// among them. A keyword match without an archive extension is only taken
/// when no archive is published.
///
/// # Errors
/// `ASSET_NOT_FOUND` if nothing matches.
pub fn select_asset(release: &ReleaseInfo) -> Result<&AssetInfo, UpdateError> {
    release
        .assets
        .iter()
        .filter_map(|asset| asset_rank(&asset.name).map(|rank| (rank, asset)))
        .min_by_key(|(rank, _)| *rank)
        .map(|(_, asset)| asset)
        .ok_or_else(|| UpdateError::asset_not_found(&release.version))
}

/// Lower is better; `None` means the asset is not an update package.
fn asset_rank(name: &str) -> Option<u8> {
    let lower = name.to_ascii_lowercase();
    let keyword = ASSET_KEYWORDS.iter().any(|k| lower.contains(k));
    match (ArchiveFormat::from_name(&lower).is_some(), keyword) {
        (true, true) => Some(0),
        (true, false) => Some(1),
        (false, true) => Some(2),
        (false, false) => None,
    }
}

/// Stream `asset` to `dest`, calling `on_progress(downloaded, total)` after
/// every chunk. `total` is the response's content length when known.
///
/// Returns the number of bytes written.
///
/// # Errors
/// `NETWORK_ERROR` on connect failures and timeouts, `DOWNLOAD_FAILED` for
/// non-2xx responses, body errors and local write failures.
pub async fn download<F>(
    client: &Client,
    asset: &AssetInfo,
    dest: &Path,
    mut on_progress: F,
) -> Result<u64, UpdateError>
where
    F: FnMut(u64, Option<u64>),
{
    let url = asset.download_url.as_str();
    let mut response = client
        .get(url)
        .timeout(DOWNLOAD_TIMEOUT)
        .send()
        .await
        .map_err(|e| UpdateError::from_download(&e, url))?;

    if !response.status().is_success() {
        return Err(UpdateError::download_failed(format!(
            "Download failed with status {} for '{url}'",
            response.status()
        )));
    }

    let total = response
        .content_length()
        .or((asset.size_bytes > 0).then_some(asset.size_bytes));

    if let Some(parent) = dest.parent() {
        tokio::fs::create_dir_all(parent).await.map_err(|e| {
            UpdateError::download_failed(format!("Failed to create {}: {e}", parent.display()))
        })?;
    }
    let mut file = tokio::fs::File::create(dest).await.map_err(|e| {
        UpdateError::download_failed(format!("Failed to create {}: {e}", dest.display()))
    })?;

    let mut downloaded = 0u64;
    while let Some(chunk) = response
        .chunk()
        .await
        .map_err(|e| UpdateError::from_download(&e, url))?
    {
        file.write_all(&chunk).await.map_err(|e| {
            UpdateError::download_failed(format!("Failed to write {}: {e}", dest.display()))
        })?;
        downloaded += chunk.len() as u64;
        on_progress(downloaded, total);
    }

    file.flush()
        .await
        .map_err(|e| UpdateError::download_failed(format!("Failed to flush download: {e}")))?;

    Ok(downloaded)
}

/// Extract `archive` into `dest`, choosing the strategy by file extension.
///
/// # Errors
/// `UNSUPPORTED_FORMAT` for unknown extensions, `EXTRACTION_FAILED` for
/// corrupt archives or entries escaping `dest`.
pub fn extract(archive: &Path, dest: &Path) -> Result<(), UpdateError> {
    let name = archive
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();

    let format = ArchiveFormat::from_name(&name).ok_or_else(|| {
        UpdateError::unsupported_format(format!("Unsupported archive format: {name}"))
    })?;

    fs::create_dir_all(dest)
        .map_err(|e| UpdateError::extraction_failed(format!("Failed to create {}: {e}", dest.display())))?;

    match format {
        ArchiveFormat::Zip => extract_zip(archive, dest),
        ArchiveFormat::TarGz => extract_tar_gz(archive, dest),
    }
}

/// Files whose presence marks the top of a package tree.
const ROOT_MARKERS: &[&str] = &["package.json", "update-manifest.json"];

/// The directory holding the package contents inside an extraction.
///
/// Archives built from a folder wrap everything in one top-level directory.
/// The wrapper is skipped only when it is the sole entry and holds a root
/// marker, so an archive shipping just `server/` is left alone.
#[must_use]
pub fn content_root(extracted: &Path) -> PathBuf {
    let Ok(entries) = fs::read_dir(extracted) else {
        return extracted.to_path_buf();
    };
    let entries: Vec<_> = entries
        .filter_map(Result::ok)
        .filter(|e| !e.file_name().to_string_lossy().starts_with('.'))
        .collect();

    match entries.as_slice() {
        [only]
            if only.file_type().is_ok_and(|t| t.is_dir())
                && ROOT_MARKERS.iter().any(|m| only.path().join(m).is_file()) =>
        {
            only.path()
        }
        _ => extracted.to_path_buf(),
    }
}

/// Map an archive entry path onto `dest`, rejecting anything that could
/// land outside it.
fn safe_join(dest: &Path, entry: &Path) -> Result<PathBuf, UpdateError> {
    let shown = entry.display();
    let mut out = dest.to_path_buf();

    for component in entry.components() {
        match component {
            Component::Normal(part) => out.push(part),
            Component::CurDir => {}
            Component::ParentDir => {
                return Err(UpdateError::extraction_failed(format!(
                    "Archive contains path traversal: {shown}"
                )))
            }
            Component::RootDir | Component::Prefix(_) => {
                return Err(UpdateError::extraction_failed(format!(
                    "Archive contains absolute path: {shown}"
                )))
            }
        }
    }

    if !out.starts_with(dest) {
        return Err(UpdateError::extraction_failed(format!(
            "Archive entry escapes destination: {shown}"
        )));
    }
    Ok(out)
}

#[cfg(unix)]
fn set_mode(path: &Path, mode: u32) {
    use std::os::unix::fs::PermissionsExt;
    let _ = fs::set_permissions(path, fs::Permissions::from_mode(mode));
}

pub(crate) fn extract_zip(archive: &Path, dest: &Path) -> Result<(), UpdateError> {
    let file = File::open(archive).map_err(|e| {
        UpdateError::extraction_failed(format!("Failed to open {}: {e}", archive.display()))
    })?;
    let mut zip = ZipArchive::new(file).map_err(|e| {
        UpdateError::extraction_failed(format!("Failed to open ZIP {}: {e}", archive.display()))
    })?;

    for i in 0..zip.len() {
        let mut entry = zip.by_index(i).map_err(|e| {
            UpdateError::extraction_failed(format!("Failed to read ZIP entry {i}: {e}"))
        })?;

        let Some(name) = entry.enclosed_name().map(|p| p.to_path_buf()) else {
            return Err(UpdateError::extraction_failed(format!(
                "Unsafe ZIP entry name: {}",
                entry.name()
            )));
        };
        let target = safe_join(dest, &name)?;

        if entry.is_dir() {
            fs::create_dir_all(&target)?;
            continue;
        }

        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent)?;
        }
        let mut out = File::create(&target)?;
        io::copy(&mut entry, &mut out).map_err(|e| {
            UpdateError::extraction_failed(format!("Failed to extract {}: {e}", name.display()))
        })?;

        #[cfg(unix)]
        {
            if let Some(mode) = entry.unix_mode() {
                set_mode(&target, mode);
            }
        }
    }

    Ok(())
}

fn extract_tar_gz(archive: &Path, dest: &Path) -> Result<(), UpdateError> {
    let file = File::open(archive).map_err(|e| {
        UpdateError::extraction_failed(format!("Failed to open {}: {e}", archive.display()))
    })?;
    let mut tar = Archive::new(GzDecoder::new(file));

    let entries = tar
        .entries()
        .map_err(|e| UpdateError::extraction_failed(format!("Failed to read tarball entries: {e}")))?;

    for entry in entries {
        let mut entry = entry
            .map_err(|e| UpdateError::extraction_failed(format!("Failed to read tarball entry: {e}")))?;
        let path = entry
            .path()
            .map_err(|e| UpdateError::extraction_failed(format!("Failed to read entry path: {e}")))?
            .into_owned();
        let target = safe_join(dest, &path)?;
        let kind = entry.header().entry_type();

        if kind.is_dir() {
            fs::create_dir_all(&target)?;
        } else if kind.is_file() {
            if let Some(parent) = target.parent() {
                fs::create_dir_all(parent)?;
            }
            let mut out = File::create(&target)?;
            io::copy(&mut entry, &mut out).map_err(|e| {
                UpdateError::extraction_failed(format!(
                    "Failed to extract {}: {e}",
                    path.display()
                ))
            })?;

            #[cfg(unix)]
            {
                if let Ok(mode) = entry.header().mode() {
                    set_mode(&target, mode);
                }
            }
        }
        // Symlinks and special entries are skipped
    }

    Ok(())
}
