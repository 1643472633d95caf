use std::fs::{self, File};
use std::io::{self, Write};
use std::path::Path;
use walkdir::WalkDir;

/// Atomically replace a file's contents by writing a sibling temp file and renaming it.
///
/// Readers see either the previous contents or the new contents, never a
/// partially written file.
///
/// # Errors
/// Returns an error if the temp file cannot be written or the rename fails.
pub fn atomic_write(path: &Path, bytes: &[u8]) -> io::Result<()> {
    let parent = path.parent().unwrap_or(Path::new("."));
    let name = path.file_name().and_then(|n| n.to_str()).unwrap_or("file");
    let temp_path = parent.join(format!(".{name}.tmp.{}", std::process::id()));

    {
        let mut file = File::create(&temp_path)?;
        file.write_all(bytes)?;
        file.sync_all()?;
    }

    if let Err(e) = fs::rename(&temp_path, path) {
        // Windows refuses to rename over an existing file
        if cfg!(windows) {
            fs::copy(&temp_path, path)?;
            let _ = fs::remove_file(&temp_path);
            return Ok(());
        }
        let _ = fs::remove_file(&temp_path);
        return Err(e);
    }

    Ok(())
}

/// Recursively copy `src` into `dst`, overwriting existing files and creating
/// missing directories. Symlinks are skipped.
///
/// Returns the number of regular files copied.
///
/// # Errors
/// Returns an error if any directory cannot be walked or any file cannot be copied.
pub fn copy_dir_all(src: &Path, dst: &Path) -> io::Result<u64> {
    fs::create_dir_all(dst)?;
    let mut copied = 0;

    for entry in WalkDir::new(src).min_depth(1).follow_links(false) {
        let entry = entry.map_err(io::Error::other)?;
        let rel = entry
            .path()
            .strip_prefix(src)
            .map_err(io::Error::other)?;
        let target = dst.join(rel);
        let ty = entry.file_type();

        if ty.is_dir() {
            fs::create_dir_all(&target)?;
        } else if ty.is_file() {
            if let Some(parent) = target.parent() {
                fs::create_dir_all(parent)?;
            }
            fs::copy(entry.path(), &target)?;
            copied += 1;
        }
    }

    Ok(copied)
}

/// Copy a file or a directory tree from `src` to `dst`.
///
/// Files overwrite their destination; parent directories are created as needed.
///
/// # Errors
/// Returns an error if `src` cannot be inspected or the copy fails.
pub fn copy_path(src: &Path, dst: &Path) -> io::Result<u64> {
    if fs::metadata(src)?.is_dir() {
        return copy_dir_all(src, dst);
    }

    if let Some(parent) = dst.parent() {
        fs::create_dir_all(parent)?;
    }
    fs::copy(src, dst)?;
    Ok(1)
}

/// Remove a directory tree, treating a missing directory as success.
///
/// Returns `true` if something was removed.
///
/// # Errors
/// Returns an error for anything other than `NotFound`.
pub fn remove_dir_if_exists(dir: &Path) -> io::Result<bool> {
    match fs::remove_dir_all(dir) {
        Ok(()) => Ok(true),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
        Err(e) => Err(e),
    }
}

/// Check that `dir` accepts writes by creating and deleting a marker file.
#[must_use]
pub fn is_dir_writable(dir: &Path, marker: &str) -> bool {
    if fs::create_dir_all(dir).is_err() {
        return false;
    }

    let probe = dir.join(marker);
    let ok = fs::write(&probe, b"ok").is_ok();
    let removed = fs::remove_file(&probe).is_ok();
    ok && removed
}
